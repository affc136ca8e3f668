use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::debug;

use crate::geometry::{DocPoint, PageSize, Rect};
use crate::render::Color;
use crate::shapes::{ShapeKind, ShapeStyle};
use crate::{AnnotationId, DocumentBackend};

/// A run of text on a page: the string plus one glyph bounding box per
/// `char`, in document space. Immutable once produced; invalidated by
/// content edits, never by zoom.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub glyph_rects: Vec<Rect>,
    pub page_index: usize,
}

impl TextRun {
    pub fn new(text: impl Into<String>, glyph_rects: Vec<Rect>, page_index: usize) -> Self {
        Self {
            text: text.into(),
            glyph_rects,
            page_index,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.glyph_rects
            .iter()
            .fold(Rect::default(), |acc, r| acc.union(*r))
    }
}

/// Placement of an embedded image; the core carries geometry only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlaceholder {
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    Highlight,
    Underline,
    Strikethrough,
    Squiggly,
}

/// Backend-agnostic annotation geometry, shared between annotations read
/// from a document and creation requests sent back to it.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationBody {
    Markup {
        kind: MarkupKind,
        rects: Vec<Rect>,
        color: Color,
    },
    Note {
        at: DocPoint,
        text: String,
        color: Color,
    },
    Ink {
        points: Vec<DocPoint>,
        color: Color,
        width: f32,
    },
    Shape {
        kind: ShapeKind,
        start: DocPoint,
        end: DocPoint,
        style: ShapeStyle,
    },
}

/// An annotation already present on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationShape {
    pub id: AnnotationId,
    pub body: AnnotationBody,
}

/// A request to create an annotation, routed to the backend on commit.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRequest {
    pub page_index: usize,
    pub body: AnnotationBody,
}

/// One character of a page's flattened text, with its glyph rect, the run
/// it came from, and the visual line it sits on.
#[derive(Debug, Clone, PartialEq)]
pub struct CharCell {
    pub ch: char,
    pub rect: Rect,
    pub run_index: usize,
    pub line: usize,
}

/// Per-page character table derived once from the text runs. Backs
/// hit-testing, selection geometry, and search rect mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageChars {
    cells: Vec<CharCell>,
    run_bounds: Vec<Rect>,
}

impl PageChars {
    pub fn from_runs(runs: &[TextRun]) -> Self {
        let mut cells = Vec::new();
        let mut run_bounds = Vec::with_capacity(runs.len());
        let mut line = 0usize;
        let mut line_center: Option<f32> = None;

        for (run_index, run) in runs.iter().enumerate() {
            run_bounds.push(run.bounds());
            for (ch, rect) in run.text.chars().zip(run.glyph_rects.iter()) {
                let center_y = rect.center().y;
                match line_center {
                    Some(current) if (center_y - current).abs() > rect.h.max(1.0) * 0.5 => {
                        line += 1;
                        line_center = Some(center_y);
                    }
                    Some(_) => {}
                    None => line_center = Some(center_y),
                }
                cells.push(CharCell {
                    ch,
                    rect: *rect,
                    run_index,
                    line,
                });
            }
        }

        Self { cells, run_bounds }
    }

    pub fn cells(&self) -> &[CharCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Option<&CharCell> {
        self.cells.get(index)
    }

    /// Whether the point lies inside any text run's bounding box.
    pub fn on_text(&self, p: DocPoint) -> bool {
        self.run_bounds.iter().any(|b| b.contains(p))
    }

    /// Index of the character whose glyph-rect center is closest to the
    /// point. Ties resolve to the lowest character index.
    pub fn nearest_char(&self, p: DocPoint) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (index, cell) in self.cells.iter().enumerate() {
            let d = cell.rect.center().distance(p);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((index, d)),
            }
        }
        best.map(|(index, _)| index)
    }

    /// One rectangle per visual line covering the glyph rects of the
    /// inclusive character range.
    pub fn line_rects(&self, start: usize, end: usize) -> Vec<Rect> {
        let mut rects: Vec<Rect> = Vec::new();
        let mut current_line: Option<usize> = None;
        for cell in self
            .cells
            .iter()
            .skip(start)
            .take(end.saturating_sub(start).saturating_add(1))
        {
            match (current_line, rects.last_mut()) {
                (Some(line), Some(last)) if line == cell.line => {
                    *last = last.union(cell.rect);
                }
                _ => {
                    rects.push(cell.rect);
                    current_line = Some(cell.line);
                }
            }
        }
        rects
    }
}

/// Backend-agnostic snapshot of one page's drawable content.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub size: PageSize,
    pub text_runs: Vec<TextRun>,
    pub annotations: Vec<AnnotationShape>,
    pub images: Vec<ImagePlaceholder>,
    chars: PageChars,
}

impl PageContent {
    pub fn new(
        size: PageSize,
        text_runs: Vec<TextRun>,
        annotations: Vec<AnnotationShape>,
        images: Vec<ImagePlaceholder>,
    ) -> Self {
        let chars = PageChars::from_runs(&text_runs);
        Self {
            size,
            text_runs,
            annotations,
            images,
            chars,
        }
    }

    pub fn chars(&self) -> &PageChars {
        &self.chars
    }
}

/// Performs the backend capability calls that make up one page snapshot.
pub fn fetch_page_content(backend: &dyn DocumentBackend, page_index: usize) -> Result<PageContent> {
    let size = backend.page_size(page_index)?;
    let text_runs = backend.text_runs(page_index)?;
    let annotations = backend.annotations(page_index)?;
    let images = backend.images(page_index)?;
    Ok(PageContent::new(size, text_runs, annotations, images))
}

const CACHE_CAPACITY: usize = 16;

/// Per-page content cache with pending-fetch bookkeeping.
///
/// `get` is the bounded synchronous lookup the event path is allowed; a
/// miss records the page as wanted and the host completes the fetch via
/// `supply` (or `fail`). While any fetch is pending the orchestrator
/// freezes gesture input.
pub struct ContentStore {
    cache: Mutex<HashMap<usize, Arc<PageContent>>>,
    pending: Mutex<BTreeSet<usize>>,
    requests: Mutex<VecDeque<usize>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            pending: Mutex::new(BTreeSet::new()),
            requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn get(&self, page_index: usize) -> Option<Arc<PageContent>> {
        self.cache.lock().get(&page_index).cloned()
    }

    /// Records a fetch request for the page. Returns true when the page
    /// was not already pending.
    pub fn request(&self, page_index: usize) -> bool {
        let mut pending = self.pending.lock();
        if pending.insert(page_index) {
            self.requests.lock().push_back(page_index);
            true
        } else {
            false
        }
    }

    /// Next requested page the host has not yet been handed.
    pub fn take_request(&self) -> Option<usize> {
        self.requests.lock().pop_front()
    }

    pub fn is_pending(&self, page_index: usize) -> bool {
        self.pending.lock().contains(&page_index)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Installs fetched content and clears the pending mark.
    pub fn supply(&self, page_index: usize, content: PageContent, reference_page: usize) {
        self.pending.lock().remove(&page_index);
        self.requests.lock().retain(|&p| p != page_index);
        let mut cache = self.cache.lock();
        cache.insert(page_index, Arc::new(content));
        if cache.len() > CACHE_CAPACITY {
            let mut keys: Vec<usize> = cache.keys().copied().collect();
            keys.sort_by_key(|k| k.abs_diff(reference_page));
            for stale in keys.into_iter().skip(CACHE_CAPACITY) {
                cache.remove(&stale);
            }
        }
    }

    /// Clears the pending mark after a failed fetch; cached content, if
    /// any, stays visible.
    pub fn fail(&self, page_index: usize) {
        self.pending.lock().remove(&page_index);
        self.requests.lock().retain(|&p| p != page_index);
        debug!(page = page_index, "page content fetch abandoned");
    }

    /// Evicts a page after the backend signalled a content mutation.
    pub fn invalidate(&self, page_index: usize) {
        self.cache.lock().remove(&page_index);
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
        self.pending.lock().clear();
        self.requests.lock().clear();
    }

    /// Synchronous get-or-fetch for programmatic full-document scans
    /// (search); the event path never calls this.
    pub fn get_or_fetch(
        &self,
        backend: &dyn DocumentBackend,
        page_index: usize,
        reference_page: usize,
    ) -> Result<Arc<PageContent>> {
        if let Some(content) = self.get(page_index) {
            return Ok(content);
        }
        let content = fetch_page_content(backend, page_index)?;
        self.supply(page_index, content, reference_page);
        Ok(self.get(page_index).expect("content was just supplied"))
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PageSize;

    fn run_on_one_line(text: &str, y: f32, page: usize) -> TextRun {
        let rects = text
            .chars()
            .enumerate()
            .map(|(i, _)| Rect::new(i as f32 * 10.0, y, 10.0, 20.0))
            .collect();
        TextRun::new(text, rects, page)
    }

    fn content_with_runs(runs: Vec<TextRun>) -> PageContent {
        PageContent::new(PageSize::new(200.0, 300.0), runs, Vec::new(), Vec::new())
    }

    #[test]
    fn chars_assign_lines_by_vertical_position() {
        let content = content_with_runs(vec![
            run_on_one_line("ab", 0.0, 0),
            run_on_one_line("cd", 30.0, 0),
        ]);
        let chars = content.chars();
        assert_eq!(chars.len(), 4);
        assert_eq!(chars.cell(0).unwrap().line, 0);
        assert_eq!(chars.cell(1).unwrap().line, 0);
        assert_eq!(chars.cell(2).unwrap().line, 1);
        assert_eq!(chars.cell(3).unwrap().line, 1);
    }

    #[test]
    fn nearest_char_prefers_closest_center() {
        let content = content_with_runs(vec![run_on_one_line("AB", 0.0, 0)]);
        let chars = content.chars();
        assert_eq!(chars.nearest_char(DocPoint::new(14.0, 10.0)), Some(1));
        assert_eq!(chars.nearest_char(DocPoint::new(3.0, 10.0)), Some(0));
    }

    #[test]
    fn line_rects_union_per_line() {
        let content = content_with_runs(vec![
            run_on_one_line("abc", 0.0, 0),
            run_on_one_line("de", 30.0, 0),
        ]);
        let rects = content.chars().line_rects(1, 4);
        assert_eq!(rects.len(), 2);
        // Line 0 covers chars 1..=2 of "abc".
        assert_eq!(rects[0], Rect::new(10.0, 0.0, 20.0, 20.0));
        // Line 1 covers char 0 of "de".
        assert_eq!(rects[1], Rect::new(0.0, 30.0, 10.0, 20.0));
    }

    #[test]
    fn store_request_supply_cycle() {
        let store = ContentStore::new();
        assert!(store.get(3).is_none());
        assert!(store.request(3));
        assert!(!store.request(3), "duplicate request is coalesced");
        assert!(store.has_pending());
        assert_eq!(store.take_request(), Some(3));
        assert_eq!(store.take_request(), None);

        store.supply(3, content_with_runs(Vec::new()), 3);
        assert!(!store.has_pending());
        assert!(store.get(3).is_some());
    }

    #[test]
    fn store_fail_clears_pending_and_keeps_cache() {
        let store = ContentStore::new();
        store.supply(0, content_with_runs(Vec::new()), 0);
        store.request(0);
        store.fail(0);
        assert!(!store.has_pending());
        assert!(store.get(0).is_some());
    }

    #[test]
    fn store_evicts_pages_farthest_from_reference() {
        let store = ContentStore::new();
        for page in 0..CACHE_CAPACITY + 4 {
            store.supply(page, content_with_runs(Vec::new()), 0);
        }
        assert!(store.get(0).is_some());
        assert!(store.get(CACHE_CAPACITY + 3).is_none());
    }

    #[test]
    fn invalidate_evicts_single_page() {
        let store = ContentStore::new();
        store.supply(1, content_with_runs(Vec::new()), 1);
        store.invalidate(1);
        assert!(store.get(1).is_none());
    }
}
