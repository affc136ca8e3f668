use std::sync::Arc;

use tracing::debug;

use crate::content::PageContent;
use crate::geometry::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
}

/// One query match: where it is and the highlight rects covering it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub page_index: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub rects: Vec<Rect>,
    pub match_index: usize,
}

/// Document-wide text search with a cyclic result cursor.
#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    query: String,
    matches: Vec<SearchMatch>,
    current: Option<usize>,
}

fn fold_case(ch: char, case_sensitive: bool) -> char {
    if case_sensitive {
        ch
    } else {
        ch.to_lowercase().next().unwrap_or(ch)
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&SearchMatch> {
        self.current.and_then(|i| self.matches.get(i))
    }

    /// Scans the supplied pages (in ascending page order) and rebuilds the
    /// match list. An empty query yields zero matches, not an error.
    /// Returns the match count; the cursor lands on the first match.
    pub fn run(
        &mut self,
        query: &str,
        options: SearchOptions,
        pages: impl Iterator<Item = (usize, Arc<PageContent>)>,
    ) -> usize {
        self.query = query.to_owned();
        self.matches.clear();
        self.current = None;

        let needle: Vec<char> = query
            .chars()
            .map(|ch| fold_case(ch, options.case_sensitive))
            .collect();
        if needle.is_empty() {
            return 0;
        }

        for (page_index, content) in pages {
            let chars = content.chars();
            let cells = chars.cells();
            let haystack: Vec<char> = cells
                .iter()
                .map(|c| fold_case(c.ch, options.case_sensitive))
                .collect();
            if haystack.len() < needle.len() {
                continue;
            }

            for start in 0..=haystack.len() - needle.len() {
                if haystack[start..start + needle.len()] != needle[..] {
                    continue;
                }
                let end = start + needle.len() - 1;
                if options.whole_word {
                    let before_ok = start == 0 || !is_word_char(cells[start - 1].ch);
                    let after_ok =
                        end + 1 >= cells.len() || !is_word_char(cells[end + 1].ch);
                    if !before_ok || !after_ok {
                        continue;
                    }
                }
                let match_index = self.matches.len();
                self.matches.push(SearchMatch {
                    page_index,
                    char_start: start,
                    char_end: end,
                    rects: chars.line_rects(start, end),
                    match_index,
                });
            }
        }

        if !self.matches.is_empty() {
            self.current = Some(0);
        }
        debug!(query, matches = self.matches.len(), "search completed");
        self.matches.len()
    }

    /// Advances the cursor, wrapping past the last match. A single match
    /// stays selected under repeated calls.
    pub fn next(&mut self) -> Option<&SearchMatch> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        let next = match self.current {
            Some(i) => (i + 1) % len,
            None => 0,
        };
        self.current = Some(next);
        self.matches.get(next)
    }

    /// Moves the cursor backwards, wrapping before the first match.
    pub fn prev(&mut self) -> Option<&SearchMatch> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        let prev = match self.current {
            Some(i) => (i + len - 1) % len,
            None => len - 1,
        };
        self.current = Some(prev);
        self.matches.get(prev)
    }

    /// All highlight rects on one page, for the render pass.
    pub fn page_rects(&self, page_index: usize) -> Vec<Rect> {
        self.matches
            .iter()
            .filter(|m| m.page_index == page_index)
            .flat_map(|m| m.rects.iter().copied())
            .collect()
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.matches.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TextRun;
    use crate::geometry::PageSize;

    fn page(text: &str) -> Arc<PageContent> {
        let rects = text
            .chars()
            .enumerate()
            .map(|(i, _)| Rect::new(i as f32 * 10.0, 0.0, 10.0, 20.0))
            .collect();
        Arc::new(PageContent::new(
            PageSize::new(1000.0, 100.0),
            vec![TextRun::new(text, rects, 0)],
            Vec::new(),
            Vec::new(),
        ))
    }

    fn run_query(engine: &mut SearchEngine, query: &str, options: SearchOptions) -> usize {
        let pages = vec![(0, page("the cat sat on the mat")), (1, page("the end"))];
        engine.run(query, options, pages.into_iter())
    }

    #[test]
    fn matches_are_ordered_by_page_and_position() {
        let mut engine = SearchEngine::new();
        let count = run_query(&mut engine, "the", SearchOptions::default());
        assert_eq!(count, 3);
        assert_eq!(engine.matches()[0].page_index, 0);
        assert_eq!(engine.matches()[0].char_start, 0);
        assert_eq!(engine.matches()[1].page_index, 0);
        assert_eq!(engine.matches()[2].page_index, 1);
        assert_eq!(engine.current_index(), Some(0));
    }

    #[test]
    fn cyclic_navigation_wraps_both_directions() {
        let mut engine = SearchEngine::new();
        let count = run_query(&mut engine, "the", SearchOptions::default());
        assert_eq!(count, 3);

        let start = engine.current_index();
        for _ in 0..count {
            engine.next();
        }
        assert_eq!(engine.current_index(), start);

        engine.prev();
        assert_eq!(engine.current_index(), Some(count - 1));
    }

    #[test]
    fn single_match_stays_selected() {
        let mut engine = SearchEngine::new();
        assert_eq!(run_query(&mut engine, "cat", SearchOptions::default()), 1);
        engine.next();
        engine.next();
        assert_eq!(engine.current_index(), Some(0));
    }

    #[test]
    fn case_sensitivity_is_honored() {
        let mut engine = SearchEngine::new();
        assert_eq!(run_query(&mut engine, "THE", SearchOptions::default()), 3);
        let options = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        assert_eq!(run_query(&mut engine, "THE", options), 0);
    }

    #[test]
    fn whole_word_excludes_substrings() {
        let mut engine = SearchEngine::new();
        // "the" appears inside no other word here, but "at" does.
        assert_eq!(run_query(&mut engine, "at", SearchOptions::default()), 3);
        let options = SearchOptions {
            whole_word: true,
            ..SearchOptions::default()
        };
        assert_eq!(run_query(&mut engine, "at", options), 0);
    }

    #[test]
    fn empty_query_yields_no_matches() {
        let mut engine = SearchEngine::new();
        assert_eq!(run_query(&mut engine, "", SearchOptions::default()), 0);
        assert_eq!(engine.current_index(), None);
        assert!(engine.next().is_none());
        assert!(engine.prev().is_none());
    }

    #[test]
    fn match_rects_cover_the_matched_glyphs() {
        let mut engine = SearchEngine::new();
        run_query(&mut engine, "cat", SearchOptions::default());
        let rects = &engine.matches()[0].rects;
        assert_eq!(rects.len(), 1);
        // "cat" starts at char 4 of "the cat sat on the mat".
        assert_eq!(rects[0], Rect::new(40.0, 0.0, 30.0, 20.0));
    }

    #[test]
    fn clear_resets_cursor_and_matches() {
        let mut engine = SearchEngine::new();
        run_query(&mut engine, "the", SearchOptions::default());
        engine.clear();
        assert!(engine.is_empty());
        assert_eq!(engine.current_index(), None);
    }
}
