use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::ViewerConfig;
use crate::content::{
    fetch_page_content, AnnotationBody, AnnotationRequest, ContentStore, MarkupKind, PageContent,
};
use crate::geometry::{DocPoint, PageLayout, PageSize, Rect, ViewMode, ViewPoint, ViewRect, ViewState};
use crate::ink::{InkEngine, InkStyle};
use crate::render::{Color, DrawPrimitive, PageOverlay, Renderer};
use crate::search::{SearchEngine, SearchMatch, SearchOptions};
use crate::selection::{
    selection_rects, selection_text, CharRef, SelectionEngine, SelectionPhase,
};
use crate::shapes::{ShapeEngine, ShapeKind, ShapeStyle};
use crate::store::PersistedViewState;
use crate::{
    AnnotationId, DocumentBackend, DocumentProvider, OutlineItem, ViewerError, ViewerResult,
};

/// Whether an input event was acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Consumed,
    Ignored,
}

impl EventOutcome {
    pub fn is_consumed(self) -> bool {
        matches!(self, EventOutcome::Consumed)
    }
}

/// Categories a host can subscribe to without polling. Each mutating
/// operation pushes exactly the categories it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotification {
    PageChanged(usize),
    SelectionChanged,
    SearchChanged,
    RedrawNeeded,
    ContentRequested(usize),
}

/// Hand-off to the host's contextual menu: where the committed selection
/// sits on screen and what it says.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupRequest {
    pub bounds: ViewRect,
    pub text: String,
}

pub type PopupBuilder = Box<dyn FnMut(&PopupRequest)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTool {
    Selection,
    Ink,
    Shape,
}

/// The orchestrator: single owner of the view state, the content store and
/// the interaction engines. Routes input to exactly one active engine,
/// applies commits against the backend, and raises change notifications.
pub struct Viewer {
    backend: Arc<dyn DocumentBackend>,
    config: ViewerConfig,
    renderer: Renderer,
    view: ViewState,
    page_sizes: Vec<PageSize>,
    content: ContentStore,
    selection: SelectionEngine,
    ink: InkEngine,
    shapes: ShapeEngine,
    search: SearchEngine,
    notifications: Vec<ChangeNotification>,
    popup_builder: Option<PopupBuilder>,
    gesture_page: Option<usize>,
}

impl Viewer {
    pub fn new(backend: Arc<dyn DocumentBackend>, config: ViewerConfig) -> ViewerResult<Self> {
        let page_count = backend.info().page_count;
        let mut page_sizes = Vec::with_capacity(page_count);
        for page in 0..page_count {
            page_sizes.push(backend.page_size(page).map_err(ViewerError::Backend)?);
        }
        let renderer = Renderer::new(config.palette);
        Ok(Self {
            backend,
            config,
            renderer,
            view: ViewState::default(),
            page_sizes,
            content: ContentStore::new(),
            selection: SelectionEngine::new(),
            ink: InkEngine::new(),
            shapes: ShapeEngine::new(),
            search: SearchEngine::new(),
            notifications: Vec::new(),
            popup_builder: None,
            gesture_page: None,
        })
    }

    /// Opens a document through a provider and wraps it in a viewer.
    #[instrument(skip(provider, config))]
    pub async fn open_with<P: DocumentProvider>(
        provider: &P,
        path: std::path::PathBuf,
        config: ViewerConfig,
    ) -> ViewerResult<Self> {
        let backend = provider.open(&path).await.map_err(ViewerError::Backend)?;
        Self::new(backend, config)
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn document_info(&self) -> &crate::DocumentInfo {
        self.backend.info()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    pub fn layout(&self) -> PageLayout {
        PageLayout::new(&self.page_sizes, &self.view, self.config.page_gap)
    }

    pub fn active_tool(&self) -> ActiveTool {
        if self.ink.is_enabled() {
            ActiveTool::Ink
        } else if self.shapes.is_enabled() {
            ActiveTool::Shape
        } else {
            ActiveTool::Selection
        }
    }

    pub fn set_popup_builder(&mut self, builder: impl FnMut(&PopupRequest) + 'static) {
        self.popup_builder = Some(Box::new(builder));
    }

    fn notify(&mut self, notification: ChangeNotification) {
        if self.notifications.last() != Some(&notification) {
            self.notifications.push(notification);
        }
    }

    /// Drains the notifications raised since the last call.
    pub fn take_notifications(&mut self) -> Vec<ChangeNotification> {
        std::mem::take(&mut self.notifications)
    }

    // Navigation

    pub fn goto(&mut self, page: usize) -> ViewerResult<()> {
        if page >= self.page_count() {
            return Err(ViewerError::InvalidPageIndex {
                page,
                page_count: self.page_count(),
            });
        }
        self.navigate_to(page);
        Ok(())
    }

    fn navigate_to(&mut self, page: usize) {
        let page = page.min(self.page_count().saturating_sub(1));
        if page != self.view.current_page {
            self.view.current_page = page;
            self.clear_selection();
            self.notify(ChangeNotification::PageChanged(page));
            self.notify(ChangeNotification::RedrawNeeded);
        }
    }

    pub fn next_page(&mut self) -> bool {
        let target = (self.view.current_page + 1).min(self.page_count().saturating_sub(1));
        let changed = target != self.view.current_page;
        self.navigate_to(target);
        changed
    }

    pub fn prev_page(&mut self) -> bool {
        let target = self.view.current_page.saturating_sub(1);
        let changed = target != self.view.current_page;
        self.navigate_to(target);
        changed
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        if self.view.mode != mode {
            self.view.mode = mode;
            self.clear_selection();
            self.notify(ChangeNotification::RedrawNeeded);
        }
    }

    pub fn set_scale(&mut self, scale: f32) {
        let scale = self.config.zoom.clamp(scale);
        if (scale - self.view.scale).abs() > f32::EPSILON {
            self.view.scale = scale;
            self.notify(ChangeNotification::RedrawNeeded);
        }
    }

    pub fn zoom_in(&mut self) {
        self.set_scale(self.view.scale * self.config.zoom.step);
    }

    pub fn zoom_out(&mut self) {
        self.set_scale(self.view.scale / self.config.zoom.step);
    }

    pub fn scroll_by(&mut self, dx: f32, dy: f32) {
        self.set_scroll(self.view.scroll_x + dx, self.view.scroll_y + dy);
    }

    pub fn set_scroll(&mut self, x: f32, y: f32) {
        let (extent_w, extent_h) = self.layout().content_extent();
        let max_x = (extent_w - self.view.viewport_width).max(0.0);
        let max_y = (extent_h - self.view.viewport_height).max(0.0);
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        if x != self.view.scroll_x || y != self.view.scroll_y {
            self.view.scroll_x = x;
            self.view.scroll_y = y;
            self.notify(ChangeNotification::RedrawNeeded);
        }
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        if width != self.view.viewport_width || height != self.view.viewport_height {
            self.view.viewport_width = width.max(1.0);
            self.view.viewport_height = height.max(1.0);
            self.notify(ChangeNotification::RedrawNeeded);
        }
    }

    // Tools: selection is active whenever no drawing engine is enabled;
    // arming one engine disables the other.

    pub fn enable_ink(&mut self) {
        let style = self.config.ink;
        self.enable_ink_with(style);
    }

    pub fn enable_ink_with(&mut self, style: InkStyle) {
        self.shapes.disable();
        self.clear_selection();
        self.ink.enable(style, self.config.ink_min_distance);
        self.notify(ChangeNotification::RedrawNeeded);
    }

    pub fn enable_shape(&mut self, kind: ShapeKind) {
        let style = self.config.shape;
        self.enable_shape_with(kind, style);
    }

    pub fn enable_shape_with(&mut self, kind: ShapeKind, style: ShapeStyle) {
        self.ink.disable();
        self.clear_selection();
        self.shapes.enable(kind, style);
        self.notify(ChangeNotification::RedrawNeeded);
    }

    pub fn set_shape_kind(&mut self, kind: ShapeKind) {
        if self.shapes.is_enabled() {
            self.shapes.set_kind(kind);
            self.notify(ChangeNotification::RedrawNeeded);
        }
    }

    /// Disables both drawing engines, returning to selection.
    pub fn disable_drawing(&mut self) {
        self.ink.disable();
        self.shapes.disable();
        self.gesture_page = None;
        self.notify(ChangeNotification::RedrawNeeded);
    }

    pub fn ink_engine(&self) -> &InkEngine {
        &self.ink
    }

    pub fn shape_engine(&self) -> &ShapeEngine {
        &self.shapes
    }

    // Pointer routing. While a content fetch is pending every engine is
    // frozen: events are ignored and in-flight gestures keep their state.

    pub fn pointer_down(&mut self, p: ViewPoint) -> EventOutcome {
        if self.content.has_pending() {
            return EventOutcome::Ignored;
        }
        let layout = self.layout();
        match self.active_tool() {
            ActiveTool::Ink => {
                let Some((page, doc)) = layout.to_document(p) else {
                    return EventOutcome::Ignored;
                };
                self.ink.pointer_down(doc);
                self.gesture_page = Some(page);
                self.notify(ChangeNotification::RedrawNeeded);
                EventOutcome::Consumed
            }
            ActiveTool::Shape => {
                let Some((page, doc)) = layout.to_document(p) else {
                    return EventOutcome::Ignored;
                };
                self.shapes.pointer_down(doc);
                self.gesture_page = Some(page);
                self.notify(ChangeNotification::RedrawNeeded);
                EventOutcome::Consumed
            }
            ActiveTool::Selection => {
                let Some((page, doc)) = layout.to_document(p) else {
                    if self.selection.has_selection() {
                        self.clear_selection();
                        self.notify(ChangeNotification::RedrawNeeded);
                    }
                    return EventOutcome::Ignored;
                };
                let Some(content) = self.content_or_request(page) else {
                    return EventOutcome::Ignored;
                };
                let chars = content.chars();
                let hit = if chars.on_text(doc) {
                    chars.nearest_char(doc).map(|i| CharRef::new(page, i))
                } else {
                    None
                };
                let had_selection = self.selection.has_selection();
                self.selection.pointer_down(hit);
                if had_selection || hit.is_some() {
                    self.notify(ChangeNotification::SelectionChanged);
                    self.notify(ChangeNotification::RedrawNeeded);
                }
                EventOutcome::Consumed
            }
        }
    }

    pub fn pointer_move(&mut self, p: ViewPoint) -> EventOutcome {
        if self.content.has_pending() {
            return EventOutcome::Ignored;
        }
        let layout = self.layout();
        if self.ink.is_tracing() {
            let page = self.gesture_page.unwrap_or(self.view.current_page);
            self.ink.pointer_move(layout.page_to_document(page, p));
            self.notify(ChangeNotification::RedrawNeeded);
            return EventOutcome::Consumed;
        }
        if self.shapes.is_tracing() {
            let page = self.gesture_page.unwrap_or(self.view.current_page);
            self.shapes.pointer_move(layout.page_to_document(page, p));
            self.notify(ChangeNotification::RedrawNeeded);
            return EventOutcome::Consumed;
        }
        if matches!(
            self.selection.phase(),
            SelectionPhase::Anchoring | SelectionPhase::Dragging
        ) {
            let Some((page, doc)) = layout.to_document(p) else {
                return EventOutcome::Ignored;
            };
            let Some(content) = self.content_or_request(page) else {
                return EventOutcome::Ignored;
            };
            let hit = content
                .chars()
                .nearest_char(doc)
                .map(|i| CharRef::new(page, i));
            self.selection.pointer_move(hit);
            self.notify(ChangeNotification::SelectionChanged);
            self.notify(ChangeNotification::RedrawNeeded);
            return EventOutcome::Consumed;
        }
        EventOutcome::Ignored
    }

    pub fn pointer_up(&mut self, _p: ViewPoint) -> ViewerResult<EventOutcome> {
        if self.content.has_pending() {
            return Ok(EventOutcome::Ignored);
        }
        if self.ink.is_tracing() {
            let page = self.gesture_page.take().unwrap_or(self.view.current_page);
            let style = *self.ink.style();
            if let Some(points) = self.ink.pointer_up() {
                self.commit_annotation(AnnotationRequest {
                    page_index: page,
                    body: AnnotationBody::Ink {
                        points,
                        color: style.color,
                        width: style.width,
                    },
                })?;
            }
            self.notify(ChangeNotification::RedrawNeeded);
            return Ok(EventOutcome::Consumed);
        }
        if self.shapes.is_tracing() {
            let page = self.gesture_page.take().unwrap_or(self.view.current_page);
            let style = *self.shapes.style();
            if let Some(draft) = self.shapes.pointer_up() {
                self.commit_annotation(AnnotationRequest {
                    page_index: page,
                    body: AnnotationBody::Shape {
                        kind: draft.kind,
                        start: draft.start,
                        end: draft.end,
                        style,
                    },
                })?;
            }
            self.notify(ChangeNotification::RedrawNeeded);
            return Ok(EventOutcome::Consumed);
        }
        if matches!(
            self.selection.phase(),
            SelectionPhase::Anchoring | SelectionPhase::Dragging
        ) {
            if self.selection.pointer_up() {
                self.notify(ChangeNotification::SelectionChanged);
                self.invoke_popup();
            }
            return Ok(EventOutcome::Consumed);
        }
        Ok(EventOutcome::Ignored)
    }

    #[instrument(skip(self, request), fields(page = request.page_index))]
    fn commit_annotation(&mut self, request: AnnotationRequest) -> ViewerResult<AnnotationId> {
        let page = request.page_index;
        match self.backend.create_annotation(&request) {
            Ok(id) => {
                debug!(%id, "annotation created");
                self.content.invalidate(page);
                self.notify(ChangeNotification::RedrawNeeded);
                Ok(id)
            }
            Err(err) => {
                warn!(?err, "annotation creation failed");
                Err(ViewerError::Backend(err))
            }
        }
    }

    // Selection actions

    pub fn clear_selection(&mut self) {
        if self.selection.has_selection() {
            self.selection.clear();
            self.notify(ChangeNotification::SelectionChanged);
        } else {
            self.selection.clear();
        }
    }

    pub fn has_selection(&self) -> bool {
        self.selection.has_selection()
    }

    /// Text of the current span, in forward order regardless of drag
    /// direction. `None` without a selection.
    pub fn selected_text(&self) -> Option<String> {
        let span = self.selection.span()?;
        Some(selection_text(&span, |page| self.content.get(page)))
    }

    /// Viewport-space bounding box of the current selection.
    pub fn selection_bounds(&self) -> Option<ViewRect> {
        let span = self.selection.span()?;
        let layout = self.layout();
        let mut bounds: Option<ViewRect> = None;
        for (page, rects) in selection_rects(&span, |page| self.content.get(page)) {
            for rect in rects {
                let view = layout.rect_to_viewport(page, rect);
                bounds = Some(match bounds {
                    Some(acc) => acc.union(view),
                    None => view,
                });
            }
        }
        bounds
    }

    /// Extracts the selected text and resets the selection.
    pub fn copy_selection(&mut self) -> ViewerResult<String> {
        let text = self.selected_text().ok_or(ViewerError::NoActiveSelection)?;
        self.clear_selection();
        self.notify(ChangeNotification::RedrawNeeded);
        Ok(text)
    }

    /// Converts the span's line rects into one markup annotation per
    /// touched page. On failure the span is kept so the user can retry.
    pub fn annotate_selection(
        &mut self,
        kind: MarkupKind,
        color: Color,
    ) -> ViewerResult<Vec<AnnotationId>> {
        let span = self
            .selection
            .span()
            .ok_or(ViewerError::NoActiveSelection)?;
        let per_page = selection_rects(&span, |page| self.content.get(page));
        if per_page.is_empty() {
            return Err(ViewerError::NoActiveSelection);
        }
        let mut ids = Vec::new();
        for (page, rects) in per_page {
            let id = self.commit_annotation(AnnotationRequest {
                page_index: page,
                body: AnnotationBody::Markup {
                    kind,
                    rects,
                    color,
                },
            })?;
            ids.push(id);
        }
        self.clear_selection();
        self.notify(ChangeNotification::RedrawNeeded);
        Ok(ids)
    }

    /// Drops a sticky note at the top-left of the selection.
    pub fn add_note_at_selection(
        &mut self,
        text: &str,
        color: Color,
    ) -> ViewerResult<AnnotationId> {
        let span = self
            .selection
            .span()
            .ok_or(ViewerError::NoActiveSelection)?;
        let per_page = selection_rects(&span, |page| self.content.get(page));
        let (page, rects) = per_page
            .into_iter()
            .next()
            .ok_or(ViewerError::NoActiveSelection)?;
        let first = rects.first().copied().unwrap_or_default();
        let id = self.commit_annotation(AnnotationRequest {
            page_index: page,
            body: AnnotationBody::Note {
                at: DocPoint::new(first.x, first.y),
                text: text.to_owned(),
                color,
            },
        })?;
        self.clear_selection();
        self.notify(ChangeNotification::RedrawNeeded);
        Ok(id)
    }

    fn invoke_popup(&mut self) {
        let Some(mut builder) = self.popup_builder.take() else {
            return;
        };
        if let (Some(bounds), Some(text)) = (self.selection_bounds(), self.selected_text()) {
            if !text.is_empty() {
                builder(&PopupRequest { bounds, text });
            }
        }
        self.popup_builder = Some(builder);
    }

    // Search

    /// Scans the whole document. Missing page content is fetched from the
    /// backend on the spot; the cursor lands on the first match and the
    /// view navigates to it.
    #[instrument(skip(self))]
    pub fn search(&mut self, query: &str, options: SearchOptions) -> ViewerResult<usize> {
        let mut pages = Vec::with_capacity(self.page_count());
        for page in 0..self.page_count() {
            let content = self
                .content
                .get_or_fetch(self.backend.as_ref(), page, self.view.current_page)
                .map_err(ViewerError::Backend)?;
            pages.push((page, content));
        }
        let count = self.search.run(query, options, pages.into_iter());
        self.notify(ChangeNotification::SearchChanged);
        self.notify(ChangeNotification::RedrawNeeded);
        if let Some(page) = self.search.current().map(|m| m.page_index) {
            self.navigate_to(page);
        }
        Ok(count)
    }

    pub fn search_next(&mut self) -> Option<usize> {
        let page = self.search.next().map(|m| m.page_index)?;
        self.navigate_to(page);
        self.notify(ChangeNotification::SearchChanged);
        self.notify(ChangeNotification::RedrawNeeded);
        self.search.current_index()
    }

    pub fn search_prev(&mut self) -> Option<usize> {
        let page = self.search.prev().map(|m| m.page_index)?;
        self.navigate_to(page);
        self.notify(ChangeNotification::SearchChanged);
        self.notify(ChangeNotification::RedrawNeeded);
        self.search.current_index()
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
        self.notify(ChangeNotification::SearchChanged);
        self.notify(ChangeNotification::RedrawNeeded);
    }

    pub fn search_matches(&self) -> &[SearchMatch] {
        self.search.matches()
    }

    pub fn current_match(&self) -> Option<&SearchMatch> {
        self.search.current()
    }

    // Content plumbing

    fn content_or_request(&mut self, page: usize) -> Option<Arc<PageContent>> {
        if let Some(content) = self.content.get(page) {
            return Some(content);
        }
        if self.content.request(page) {
            self.notify(ChangeNotification::ContentRequested(page));
        }
        None
    }

    /// Next page the host should fetch content for.
    pub fn take_content_request(&self) -> Option<usize> {
        self.content.take_request()
    }

    /// Completes a fetch; schedules exactly one redraw.
    pub fn supply_page_content(&mut self, page: usize, content: PageContent) {
        self.content.supply(page, content, self.view.current_page);
        self.notify(ChangeNotification::RedrawNeeded);
    }

    /// Abandons a failed fetch. Previously cached content, if any, stays
    /// on screen.
    pub fn fail_page_content(&mut self, page: usize) {
        self.content.fail(page);
        self.notify(ChangeNotification::RedrawNeeded);
    }

    /// Evicts a page after the backend signalled a content mutation.
    pub fn invalidate_page(&mut self, page: usize) {
        self.content.invalidate(page);
        self.notify(ChangeNotification::RedrawNeeded);
    }

    /// Synchronously fetches content for every visible page. Convenience
    /// for hosts without an async fetch path.
    pub fn ensure_visible_content(&mut self) -> ViewerResult<()> {
        for page in self.layout().visible_pages() {
            if self.content.get(page).is_none() {
                let content = fetch_page_content(self.backend.as_ref(), page)
                    .map_err(ViewerError::Backend)?;
                self.supply_page_content(page, content);
            }
        }
        Ok(())
    }

    // Rendering

    /// Draw primitives for every visible page, in paint order. Pages with
    /// no cached content render as a bare background and are requested.
    pub fn render(&mut self) -> Vec<DrawPrimitive> {
        let layout = self.layout();
        let mut out = Vec::new();
        for page in layout.visible_pages() {
            let content = self.content_or_request(page);
            let search_rects = self.search.page_rects(page);
            let selection_rects = self.selection_rects_for_page(page);
            let ink_preview = (self.gesture_page == Some(page) && !self.ink.path().is_empty())
                .then(|| (self.ink.path(), *self.ink.style()));
            let shape_preview = (self.gesture_page == Some(page))
                .then(|| self.shapes.draft().map(|d| (*d, *self.shapes.style())))
                .flatten();
            let overlay = PageOverlay {
                search_rects: &search_rects,
                selection_rects: &selection_rects,
                ink_preview,
                shape_preview,
            };
            out.extend(self.renderer.page_primitives(
                page,
                content.as_deref(),
                &layout,
                &overlay,
            ));
        }
        out
    }

    fn selection_rects_for_page(&self, page: usize) -> Vec<Rect> {
        let Some(span) = self.selection.span() else {
            return Vec::new();
        };
        selection_rects(&span, |p| self.content.get(p))
            .into_iter()
            .find(|(p, _)| *p == page)
            .map(|(_, rects)| rects)
            .unwrap_or_default()
    }

    // Document structure passthrough

    pub fn outline(&self) -> ViewerResult<Vec<OutlineItem>> {
        self.backend.outline().map_err(ViewerError::Backend)
    }

    pub fn resolve_destination(&self, name: &str) -> ViewerResult<Option<usize>> {
        self.backend
            .resolve_destination(name)
            .map_err(ViewerError::Backend)
    }

    /// Resolves a named destination and navigates to it. Returns false
    /// when the destination does not exist.
    pub fn goto_destination(&mut self, name: &str) -> ViewerResult<bool> {
        match self.resolve_destination(name)? {
            Some(page) => {
                self.goto(page)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // View-state persistence

    pub fn persisted_state(&self) -> PersistedViewState {
        PersistedViewState {
            current_page: self.view.current_page,
            scale: self.view.scale,
            mode: self.view.mode,
        }
    }

    pub fn restore_state(&mut self, state: &PersistedViewState) {
        self.view.current_page = state
            .current_page
            .min(self.page_count().saturating_sub(1));
        self.view.scale = self.config.zoom.clamp(state.scale);
        self.view.mode = state.mode;
        self.notify(ChangeNotification::RedrawNeeded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use parking_lot::Mutex;

    use crate::content::{AnnotationShape, ImagePlaceholder, TextRun};
    use crate::geometry::ZoomConfig;
    use crate::{document_id_for_path, DocumentInfo, DocumentMetadata, RenderImage};

    struct FakeBackend {
        info: DocumentInfo,
        sizes: Vec<PageSize>,
        runs: HashMap<usize, Vec<TextRun>>,
        created: Mutex<Vec<AnnotationRequest>>,
        fail_creates: Mutex<bool>,
    }

    impl FakeBackend {
        fn new(pages: Vec<(PageSize, Vec<TextRun>)>) -> Self {
            let path = PathBuf::from("/tmp/fake.pdf");
            let info = DocumentInfo {
                id: document_id_for_path(&path),
                path,
                page_count: pages.len(),
                metadata: DocumentMetadata::default(),
            };
            let mut sizes = Vec::new();
            let mut runs = HashMap::new();
            for (index, (size, page_runs)) in pages.into_iter().enumerate() {
                sizes.push(size);
                runs.insert(index, page_runs);
            }
            Self {
                info,
                sizes,
                runs,
                created: Mutex::new(Vec::new()),
                fail_creates: Mutex::new(false),
            }
        }

        fn created(&self) -> Vec<AnnotationRequest> {
            self.created.lock().clone()
        }
    }

    impl DocumentBackend for FakeBackend {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn page_size(&self, page_index: usize) -> Result<PageSize> {
            self.sizes
                .get(page_index)
                .copied()
                .ok_or_else(|| anyhow!("page {} out of range", page_index))
        }

        fn text_runs(&self, page_index: usize) -> Result<Vec<TextRun>> {
            Ok(self.runs.get(&page_index).cloned().unwrap_or_default())
        }

        fn annotations(&self, _page_index: usize) -> Result<Vec<AnnotationShape>> {
            Ok(Vec::new())
        }

        fn images(&self, _page_index: usize) -> Result<Vec<ImagePlaceholder>> {
            Ok(Vec::new())
        }

        fn create_annotation(&self, request: &AnnotationRequest) -> Result<AnnotationId> {
            if *self.fail_creates.lock() {
                return Err(anyhow!("backend rejected annotation"));
            }
            self.created.lock().push(request.clone());
            Ok(uuid::Uuid::new_v4())
        }

        fn outline(&self) -> Result<Vec<OutlineItem>> {
            Ok(vec![OutlineItem {
                title: "Intro".to_owned(),
                page_index: 0,
                depth: 0,
            }])
        }

        fn resolve_destination(&self, name: &str) -> Result<Option<usize>> {
            Ok((name == "intro").then_some(0))
        }

        fn render_page_bitmap(&self, page_index: usize, _scale: f32) -> Result<RenderImage> {
            Ok(RenderImage {
                width: 1,
                height: 1,
                pixels: vec![page_index as u8, 0, 0, 255],
            })
        }
    }

    fn ab_run() -> TextRun {
        TextRun::new(
            "AB",
            vec![
                Rect::new(0.0, 0.0, 10.0, 20.0),
                Rect::new(10.0, 0.0, 10.0, 20.0),
            ],
            0,
        )
    }

    fn ab_viewer() -> (Arc<FakeBackend>, Viewer) {
        let backend = Arc::new(FakeBackend::new(vec![(
            PageSize::new(100.0, 200.0),
            vec![ab_run()],
        )]));
        let mut viewer = Viewer::new(backend.clone(), ViewerConfig::default()).unwrap();
        viewer.ensure_visible_content().unwrap();
        viewer.take_notifications();
        (backend, viewer)
    }

    fn three_page_viewer() -> (Arc<FakeBackend>, Viewer) {
        let pages = (0..3)
            .map(|i| {
                let rects = "the"
                    .chars()
                    .enumerate()
                    .map(|(c, _)| Rect::new(c as f32 * 10.0, 0.0, 10.0, 20.0))
                    .collect();
                (PageSize::new(100.0, 200.0), vec![TextRun::new("the", rects, i)])
            })
            .collect();
        let backend = Arc::new(FakeBackend::new(pages));
        let viewer = Viewer::new(backend.clone(), ViewerConfig::default()).unwrap();
        (backend, viewer)
    }

    #[test]
    fn hit_test_scenario_selects_nearest_glyph_center() {
        let (_, mut viewer) = ab_viewer();
        assert!(viewer.pointer_down(ViewPoint::new(14.0, 10.0)).is_consumed());
        viewer.pointer_move(ViewPoint::new(3.0, 10.0));
        viewer.pointer_up(ViewPoint::new(3.0, 10.0)).unwrap();
        assert_eq!(viewer.selected_text().as_deref(), Some("AB"));
    }

    #[test]
    fn copy_is_identical_for_both_drag_directions() {
        let (_, mut viewer) = ab_viewer();
        viewer.pointer_down(ViewPoint::new(3.0, 10.0));
        viewer.pointer_move(ViewPoint::new(14.0, 10.0));
        viewer.pointer_up(ViewPoint::new(14.0, 10.0)).unwrap();
        let forward = viewer.copy_selection().unwrap();

        viewer.pointer_down(ViewPoint::new(14.0, 10.0));
        viewer.pointer_move(ViewPoint::new(3.0, 10.0));
        viewer.pointer_up(ViewPoint::new(3.0, 10.0)).unwrap();
        let backward = viewer.copy_selection().unwrap();

        assert_eq!(forward, backward);
    }

    #[test]
    fn pointer_down_outside_text_clears_selection_and_suppresses_popup() {
        let (_, mut viewer) = ab_viewer();
        let popups = Arc::new(Mutex::new(0usize));
        let seen = Arc::clone(&popups);
        viewer.set_popup_builder(move |_| *seen.lock() += 1);

        viewer.pointer_down(ViewPoint::new(5.0, 10.0));
        viewer.pointer_up(ViewPoint::new(5.0, 10.0)).unwrap();
        assert_eq!(*popups.lock(), 1);

        // Below the text run but still on the page.
        viewer.pointer_down(ViewPoint::new(50.0, 150.0));
        viewer.pointer_up(ViewPoint::new(50.0, 150.0)).unwrap();
        assert!(!viewer.has_selection());
        assert_eq!(*popups.lock(), 1);
    }

    #[test]
    fn zoom_out_never_drops_below_min() {
        let (_, mut viewer) = ab_viewer();
        let mut config = ViewerConfig::default();
        config.zoom = ZoomConfig::new(0.5, 4.0);
        let backend = Arc::new(FakeBackend::new(vec![(
            PageSize::new(100.0, 200.0),
            vec![ab_run()],
        )]));
        let mut viewer2 = Viewer::new(backend, config).unwrap();
        viewer2.set_scale(0.6);
        for _ in 0..10 {
            viewer2.zoom_out();
        }
        assert!(viewer2.view().scale >= 0.5);

        viewer.set_scale(100.0);
        assert!(viewer.view().scale <= viewer.config().zoom.max);
    }

    #[test]
    fn goto_out_of_range_is_an_error() {
        let (_, mut viewer) = three_page_viewer();
        assert!(matches!(
            viewer.goto(3),
            Err(ViewerError::InvalidPageIndex { page: 3, page_count: 3 })
        ));
        viewer.goto(2).unwrap();
        assert_eq!(viewer.view().current_page, 2);
        assert!(!viewer.next_page());
    }

    #[test]
    fn enabling_ink_disables_an_armed_shape_engine() {
        let (_, mut viewer) = ab_viewer();
        viewer.enable_shape(ShapeKind::Rectangle);
        assert!(viewer.shape_engine().is_armed());
        viewer.enable_ink();
        assert!(!viewer.shape_engine().is_enabled());
        assert!(viewer.ink_engine().is_armed());
        assert_eq!(viewer.active_tool(), ActiveTool::Ink);
    }

    #[test]
    fn ink_stroke_commits_to_backend() {
        let (backend, mut viewer) = ab_viewer();
        viewer.enable_ink();
        viewer.pointer_down(ViewPoint::new(10.0, 10.0));
        viewer.pointer_move(ViewPoint::new(30.0, 30.0));
        viewer.pointer_move(ViewPoint::new(60.0, 40.0));
        viewer.pointer_up(ViewPoint::new(60.0, 40.0)).unwrap();

        let created = backend.created();
        assert_eq!(created.len(), 1);
        assert!(matches!(
            created[0].body,
            AnnotationBody::Ink { ref points, .. } if points.len() == 3
        ));
        assert!(viewer.ink_engine().is_armed());
    }

    #[test]
    fn zero_area_shape_commits_nothing() {
        let (backend, mut viewer) = ab_viewer();
        viewer.enable_shape(ShapeKind::Rectangle);
        viewer.pointer_down(ViewPoint::new(40.0, 40.0));
        viewer.pointer_up(ViewPoint::new(40.0, 40.0)).unwrap();
        assert!(backend.created().is_empty());
        assert!(viewer.shape_engine().is_armed());
    }

    #[test]
    fn shape_drag_commits_draft_geometry() {
        let (backend, mut viewer) = ab_viewer();
        viewer.enable_shape(ShapeKind::Arrow);
        viewer.pointer_down(ViewPoint::new(10.0, 10.0));
        viewer.pointer_move(ViewPoint::new(70.0, 50.0));
        viewer.pointer_up(ViewPoint::new(70.0, 50.0)).unwrap();

        let created = backend.created();
        assert_eq!(created.len(), 1);
        match &created[0].body {
            AnnotationBody::Shape { kind, start, end, .. } => {
                assert_eq!(*kind, ShapeKind::Arrow);
                assert_eq!(*start, DocPoint::new(10.0, 10.0));
                assert_eq!(*end, DocPoint::new(70.0, 50.0));
            }
            other => panic!("unexpected annotation body: {:?}", other),
        }
    }

    #[test]
    fn annotate_selection_sends_line_rects_and_clears() {
        let (backend, mut viewer) = ab_viewer();
        viewer.pointer_down(ViewPoint::new(3.0, 10.0));
        viewer.pointer_move(ViewPoint::new(14.0, 10.0));
        viewer.pointer_up(ViewPoint::new(14.0, 10.0)).unwrap();

        let ids = viewer
            .annotate_selection(MarkupKind::Highlight, Color::rgb(1.0, 0.92, 0.23))
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert!(!viewer.has_selection());

        let created = backend.created();
        match &created[0].body {
            AnnotationBody::Markup { kind, rects, .. } => {
                assert_eq!(*kind, MarkupKind::Highlight);
                assert_eq!(rects.as_slice(), &[Rect::new(0.0, 0.0, 20.0, 20.0)]);
            }
            other => panic!("unexpected annotation body: {:?}", other),
        }
    }

    #[test]
    fn annotate_without_selection_is_no_active_selection() {
        let (_, mut viewer) = ab_viewer();
        assert!(matches!(
            viewer.annotate_selection(MarkupKind::Underline, Color::BLACK),
            Err(ViewerError::NoActiveSelection)
        ));
    }

    #[test]
    fn failed_commit_rolls_back_and_keeps_selection() {
        let (backend, mut viewer) = ab_viewer();
        viewer.pointer_down(ViewPoint::new(3.0, 10.0));
        viewer.pointer_move(ViewPoint::new(14.0, 10.0));
        viewer.pointer_up(ViewPoint::new(14.0, 10.0)).unwrap();

        *backend.fail_creates.lock() = true;
        assert!(viewer
            .annotate_selection(MarkupKind::Highlight, Color::BLACK)
            .is_err());
        assert!(viewer.has_selection(), "span survives a failed commit");

        *backend.fail_creates.lock() = false;
        assert!(viewer
            .annotate_selection(MarkupKind::Highlight, Color::BLACK)
            .is_ok());
        assert!(!viewer.has_selection());
    }

    #[test]
    fn search_is_cyclic_and_navigates_pages() {
        let (_, mut viewer) = three_page_viewer();
        let count = viewer.search("the", SearchOptions::default()).unwrap();
        assert_eq!(count, 3);
        assert_eq!(viewer.view().current_page, 0);

        viewer.search_next();
        assert_eq!(viewer.view().current_page, 1);
        viewer.search_next();
        viewer.search_next();
        assert_eq!(viewer.current_match().unwrap().match_index, 0);
        assert_eq!(viewer.view().current_page, 0);

        viewer.search_prev();
        assert_eq!(viewer.current_match().unwrap().match_index, 2);
        assert_eq!(viewer.view().current_page, 2);
    }

    #[test]
    fn clear_search_resets_cursor() {
        let (_, mut viewer) = three_page_viewer();
        viewer.search("the", SearchOptions::default()).unwrap();
        viewer.clear_search();
        assert!(viewer.search_matches().is_empty());
        assert!(viewer.current_match().is_none());
    }

    #[test]
    fn render_is_idempotent_for_unchanged_state() {
        let (_, mut viewer) = ab_viewer();
        viewer.pointer_down(ViewPoint::new(3.0, 10.0));
        viewer.pointer_move(ViewPoint::new(14.0, 10.0));
        viewer.pointer_up(ViewPoint::new(14.0, 10.0)).unwrap();

        let first = viewer.render();
        let second = viewer.render();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn pointer_events_are_frozen_while_a_fetch_is_pending() {
        let (backend, mut viewer) = three_page_viewer();
        // No content cached yet: the first pointer-down requests page 0
        // and is ignored.
        assert_eq!(
            viewer.pointer_down(ViewPoint::new(5.0, 10.0)),
            EventOutcome::Ignored
        );
        let requested = viewer.take_content_request().expect("page was requested");
        assert_eq!(requested, 0);

        // Still pending: everything stays frozen.
        assert_eq!(
            viewer.pointer_down(ViewPoint::new(5.0, 10.0)),
            EventOutcome::Ignored
        );

        let content = fetch_page_content(backend.as_ref(), requested).unwrap();
        viewer.supply_page_content(requested, content);
        assert!(viewer
            .take_notifications()
            .contains(&ChangeNotification::RedrawNeeded));

        assert_eq!(
            viewer.pointer_down(ViewPoint::new(5.0, 10.0)),
            EventOutcome::Consumed
        );
    }

    #[test]
    fn notifications_report_page_and_selection_changes() {
        let (_, mut viewer) = three_page_viewer();
        viewer.goto(1).unwrap();
        let notes = viewer.take_notifications();
        assert!(notes.contains(&ChangeNotification::PageChanged(1)));
        assert!(notes.contains(&ChangeNotification::RedrawNeeded));
    }

    #[test]
    fn destination_resolution_navigates() {
        let (_, mut viewer) = three_page_viewer();
        viewer.goto(2).unwrap();
        assert!(viewer.goto_destination("intro").unwrap());
        assert_eq!(viewer.view().current_page, 0);
        assert!(!viewer.goto_destination("missing").unwrap());
    }

    #[test]
    fn persisted_state_round_trips_through_restore() {
        let (_, mut viewer) = three_page_viewer();
        viewer.goto(2).unwrap();
        viewer.set_scale(2.0);
        viewer.set_mode(ViewMode::Continuous);
        let state = viewer.persisted_state();

        let (_, mut fresh) = three_page_viewer();
        fresh.restore_state(&state);
        assert_eq!(fresh.view().current_page, 2);
        assert_eq!(fresh.view().scale, 2.0);
        assert_eq!(fresh.view().mode, ViewMode::Continuous);
    }

    #[test]
    fn outline_passthrough_reaches_backend() {
        let (_, viewer) = three_page_viewer();
        let outline = viewer.outline().unwrap();
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].title, "Intro");
    }

    struct FakeProvider;

    #[async_trait::async_trait]
    impl DocumentProvider for FakeProvider {
        async fn open(&self, _path: &std::path::Path) -> Result<Arc<dyn DocumentBackend>> {
            Ok(Arc::new(FakeBackend::new(vec![(
                PageSize::new(100.0, 200.0),
                vec![ab_run()],
            )])))
        }
    }

    #[tokio::test]
    async fn open_with_builds_a_viewer_from_a_provider() {
        let viewer = Viewer::open_with(
            &FakeProvider,
            PathBuf::from("/tmp/fake.pdf"),
            ViewerConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(viewer.page_count(), 1);
    }
}
