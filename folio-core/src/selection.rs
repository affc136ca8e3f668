use std::sync::Arc;

use crate::content::PageContent;
use crate::geometry::Rect;

/// A position in a page's flattened character sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CharRef {
    pub page_index: usize,
    pub char_index: usize,
}

impl CharRef {
    pub fn new(page_index: usize, char_index: usize) -> Self {
        Self {
            page_index,
            char_index,
        }
    }
}

/// A directional selection: `anchor` is where the drag started, `focus`
/// where the pointer currently is. The anchor may come after the focus;
/// normalized order is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSpan {
    pub anchor: CharRef,
    pub focus: CharRef,
}

impl SelectionSpan {
    pub fn caret(at: CharRef) -> Self {
        Self {
            anchor: at,
            focus: at,
        }
    }

    /// Endpoints in forward document order.
    pub fn normalized(&self) -> (CharRef, CharRef) {
        if self.anchor <= self.focus {
            (self.anchor, self.focus)
        } else {
            (self.focus, self.anchor)
        }
    }

    /// Pages the span touches, with the inclusive character range selected
    /// on each. Interior pages select fully.
    pub fn page_ranges(
        &self,
        mut char_count: impl FnMut(usize) -> usize,
    ) -> Vec<(usize, usize, usize)> {
        let (first, last) = self.normalized();
        let mut ranges = Vec::new();
        for page in first.page_index..=last.page_index {
            let count = char_count(page);
            if count == 0 {
                continue;
            }
            let start = if page == first.page_index {
                first.char_index.min(count - 1)
            } else {
                0
            };
            let end = if page == last.page_index {
                last.char_index.min(count - 1)
            } else {
                count - 1
            };
            ranges.push((page, start, end));
        }
        ranges
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    Idle,
    Anchoring,
    Dragging,
    Committed,
}

/// State machine for character-level text selection.
///
/// `Idle -> Anchoring (pointer-down on text) -> Dragging -> Committed`;
/// `clear` returns to `Idle` from anywhere. A pointer-down that misses
/// every text run yields the no-selection sentinel (`span() == None`).
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    phase: SelectionPhase,
    span: Option<SelectionSpan>,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self {
            phase: SelectionPhase::Idle,
            span: None,
        }
    }

    pub fn phase(&self) -> SelectionPhase {
        self.phase
    }

    pub fn span(&self) -> Option<SelectionSpan> {
        self.span
    }

    pub fn has_selection(&self) -> bool {
        self.span.is_some()
    }

    pub fn pointer_down(&mut self, hit: Option<CharRef>) {
        match hit {
            Some(at) => {
                self.span = Some(SelectionSpan::caret(at));
                self.phase = SelectionPhase::Anchoring;
            }
            None => {
                self.span = None;
                self.phase = SelectionPhase::Idle;
            }
        }
    }

    pub fn pointer_move(&mut self, hit: Option<CharRef>) {
        if !matches!(
            self.phase,
            SelectionPhase::Anchoring | SelectionPhase::Dragging
        ) {
            return;
        }
        if let (Some(span), Some(focus)) = (self.span.as_mut(), hit) {
            span.focus = focus;
            self.phase = SelectionPhase::Dragging;
        }
    }

    /// Ends the gesture. Returns true when a selection exists.
    pub fn pointer_up(&mut self) -> bool {
        match self.phase {
            SelectionPhase::Anchoring | SelectionPhase::Dragging => {
                if self.span.is_some() {
                    self.phase = SelectionPhase::Committed;
                    true
                } else {
                    self.phase = SelectionPhase::Idle;
                    false
                }
            }
            _ => self.span.is_some(),
        }
    }

    pub fn clear(&mut self) {
        self.span = None;
        self.phase = SelectionPhase::Idle;
    }
}

impl Default for SelectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// One highlight rectangle per visual line of the span, grouped by page.
pub fn selection_rects(
    span: &SelectionSpan,
    mut content_for: impl FnMut(usize) -> Option<Arc<PageContent>>,
) -> Vec<(usize, Vec<Rect>)> {
    let ranges = {
        let content_for = &mut content_for;
        span.page_ranges(|page| content_for(page).map(|c| c.chars().len()).unwrap_or(0))
    };
    let mut out = Vec::new();
    for (page, start, end) in ranges {
        if let Some(content) = content_for(page) {
            let rects = content.chars().line_rects(start, end);
            if !rects.is_empty() {
                out.push((page, rects));
            }
        }
    }
    out
}

/// The span's text in forward document order, with a line break inserted
/// at every line (and page) transition. Drag direction does not matter.
pub fn selection_text(
    span: &SelectionSpan,
    mut content_for: impl FnMut(usize) -> Option<Arc<PageContent>>,
) -> String {
    let ranges = {
        let content_for = &mut content_for;
        span.page_ranges(|page| content_for(page).map(|c| c.chars().len()).unwrap_or(0))
    };
    let mut text = String::new();
    let mut last_line: Option<usize> = None;
    for (page, start, end) in ranges {
        let Some(content) = content_for(page) else {
            continue;
        };
        for cell in content
            .chars()
            .cells()
            .iter()
            .skip(start)
            .take(end.saturating_sub(start) + 1)
        {
            match last_line {
                Some(line) if line != cell.line => text.push('\n'),
                _ => {}
            }
            text.push(cell.ch);
            last_line = Some(cell.line);
        }
        // Page transitions always break the line.
        last_line = None;
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
    }
    if text.ends_with('\n') {
        text.pop();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TextRun;
    use crate::geometry::PageSize;

    fn page_with_lines(lines: &[&str]) -> Arc<PageContent> {
        let runs = lines
            .iter()
            .enumerate()
            .map(|(row, text)| {
                let y = row as f32 * 30.0;
                let rects = text
                    .chars()
                    .enumerate()
                    .map(|(col, _)| Rect::new(col as f32 * 10.0, y, 10.0, 20.0))
                    .collect();
                TextRun::new(*text, rects, 0)
            })
            .collect();
        Arc::new(PageContent::new(
            PageSize::new(200.0, 300.0),
            runs,
            Vec::new(),
            Vec::new(),
        ))
    }

    #[test]
    fn pointer_down_off_text_yields_sentinel() {
        let mut engine = SelectionEngine::new();
        engine.pointer_down(None);
        assert!(!engine.pointer_up());
        assert_eq!(engine.span(), None);
        assert_eq!(engine.phase(), SelectionPhase::Idle);
    }

    #[test]
    fn drag_tracks_focus_and_commits() {
        let mut engine = SelectionEngine::new();
        engine.pointer_down(Some(CharRef::new(0, 1)));
        assert_eq!(engine.phase(), SelectionPhase::Anchoring);
        engine.pointer_move(Some(CharRef::new(0, 5)));
        assert_eq!(engine.phase(), SelectionPhase::Dragging);
        assert!(engine.pointer_up());
        assert_eq!(engine.phase(), SelectionPhase::Committed);
        let span = engine.span().unwrap();
        assert_eq!(span.anchor, CharRef::new(0, 1));
        assert_eq!(span.focus, CharRef::new(0, 5));
    }

    #[test]
    fn backward_drag_normalizes_to_forward_order() {
        let span = SelectionSpan {
            anchor: CharRef::new(0, 7),
            focus: CharRef::new(0, 2),
        };
        let (first, last) = span.normalized();
        assert_eq!(first, CharRef::new(0, 2));
        assert_eq!(last, CharRef::new(0, 7));
    }

    #[test]
    fn text_is_direction_independent() {
        let page = page_with_lines(&["hello", "world"]);
        let forward = SelectionSpan {
            anchor: CharRef::new(0, 2),
            focus: CharRef::new(0, 7),
        };
        let backward = SelectionSpan {
            anchor: CharRef::new(0, 7),
            focus: CharRef::new(0, 2),
        };
        let lookup = |_: usize| Some(Arc::clone(&page));
        assert_eq!(selection_text(&forward, lookup), "llo\nwor");
        assert_eq!(selection_text(&backward, lookup), "llo\nwor");
    }

    #[test]
    fn rects_cover_one_rect_per_line() {
        let page = page_with_lines(&["hello", "world"]);
        let span = SelectionSpan {
            anchor: CharRef::new(0, 3),
            focus: CharRef::new(0, 6),
        };
        let rects = selection_rects(&span, |_| Some(Arc::clone(&page)));
        assert_eq!(rects.len(), 1);
        let (page_index, line_rects) = &rects[0];
        assert_eq!(*page_index, 0);
        assert_eq!(line_rects.len(), 2);
        // First line: chars 3..=4 of "hello".
        assert_eq!(line_rects[0], Rect::new(30.0, 0.0, 20.0, 20.0));
        // Second line: chars 0..=1 of "world".
        assert_eq!(line_rects[1], Rect::new(0.0, 30.0, 20.0, 20.0));
    }

    #[test]
    fn clear_returns_to_idle() {
        let mut engine = SelectionEngine::new();
        engine.pointer_down(Some(CharRef::new(0, 0)));
        engine.pointer_up();
        engine.clear();
        assert_eq!(engine.phase(), SelectionPhase::Idle);
        assert!(!engine.has_selection());
    }

    #[test]
    fn moves_without_anchor_are_no_ops() {
        let mut engine = SelectionEngine::new();
        engine.pointer_move(Some(CharRef::new(0, 3)));
        assert!(engine.span().is_none());
        assert_eq!(engine.phase(), SelectionPhase::Idle);
    }
}
