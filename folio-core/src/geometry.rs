use serde::{Deserialize, Serialize};

/// A point in document space: a page's native units, origin at the page's
/// top-left corner, independent of zoom and scroll.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: DocPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A point in viewport space: pixels on the visible surface, after scale,
/// scroll, and view-mode layout have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewPoint {
    pub x: f32,
    pub y: f32,
}

impl ViewPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in document space. Width and height are never
/// negative; zero-size rectangles are legal and represent empty regions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w: w.max(0.0),
            h: h.max(0.0),
        }
    }

    /// Builds the bounding rectangle of two corner points, in either order.
    pub fn from_points(a: DocPoint, b: DocPoint) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self {
            x,
            y,
            w: (a.x - b.x).abs(),
            h: (a.y - b.y).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn center(&self) -> DocPoint {
        DocPoint::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    pub fn contains(&self, p: DocPoint) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn union(&self, other: Rect) -> Rect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect {
            x,
            y,
            w: right - x,
            h: bottom - y,
        }
    }
}

/// An axis-aligned rectangle in viewport space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl ViewRect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w: w.max(0.0),
            h: h.max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn contains(&self, p: ViewPoint) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn intersects(&self, other: ViewRect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    pub fn union(&self, other: ViewRect) -> ViewRect {
        if self.w <= 0.0 && self.h <= 0.0 {
            return other;
        }
        if other.w <= 0.0 && other.h <= 0.0 {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        ViewRect {
            x,
            y,
            w: right - x,
            h: bottom - y,
        }
    }
}

/// Native page dimensions in document units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Single,
    Continuous,
    Double,
}

impl Default for ViewMode {
    fn default() -> Self {
        ViewMode::Single
    }
}

/// Zoom clamp range and the factor applied by one zoom step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min: 0.25,
            max: 4.0,
            step: 1.25,
        }
    }
}

impl ZoomConfig {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    pub fn clamp(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            return self.min;
        }
        scale.clamp(self.min, self.max)
    }
}

/// The mutable view parameters owned by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub current_page: usize,
    pub scale: f32,
    pub mode: ViewMode,
    pub scroll_x: f32,
    pub scroll_y: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current_page: 0,
            scale: 1.0,
            mode: ViewMode::Single,
            scroll_x: 0.0,
            scroll_y: 0.0,
            viewport_width: 1024.0,
            viewport_height: 768.0,
        }
    }
}

/// The viewport-space frame occupied by one laid-out page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    pub page_index: usize,
    pub rect: ViewRect,
}

/// Page placement for one view state: which pages are shown and where.
///
/// Pure data computed from the page-size list and a `ViewState`; every
/// transform below is total and side-effect free.
#[derive(Debug, Clone)]
pub struct PageLayout {
    frames: Vec<PageFrame>,
    scale: f32,
    scroll_x: f32,
    scroll_y: f32,
    viewport_width: f32,
    viewport_height: f32,
}

impl PageLayout {
    pub fn new(page_sizes: &[PageSize], view: &ViewState, page_gap: f32) -> Self {
        let scale = if view.scale.is_finite() && view.scale > 0.0 {
            view.scale
        } else {
            1.0
        };
        let mut frames = Vec::new();
        let current = view.current_page.min(page_sizes.len().saturating_sub(1));

        match view.mode {
            ViewMode::Single => {
                if let Some(size) = page_sizes.get(current) {
                    frames.push(PageFrame {
                        page_index: current,
                        rect: ViewRect::new(0.0, 0.0, size.width * scale, size.height * scale),
                    });
                }
            }
            ViewMode::Double => {
                if let Some(left) = page_sizes.get(current) {
                    frames.push(PageFrame {
                        page_index: current,
                        rect: ViewRect::new(0.0, 0.0, left.width * scale, left.height * scale),
                    });
                    if let Some(right) = page_sizes.get(current + 1) {
                        let x = left.width * scale + page_gap;
                        frames.push(PageFrame {
                            page_index: current + 1,
                            rect: ViewRect::new(x, 0.0, right.width * scale, right.height * scale),
                        });
                    }
                }
            }
            ViewMode::Continuous => {
                let max_width = page_sizes
                    .iter()
                    .map(|s| s.width)
                    .fold(0.0_f32, f32::max);
                let mut y = 0.0;
                for (index, size) in page_sizes.iter().enumerate() {
                    let x = (max_width - size.width) * scale / 2.0;
                    frames.push(PageFrame {
                        page_index: index,
                        rect: ViewRect::new(x, y, size.width * scale, size.height * scale),
                    });
                    y += size.height * scale + page_gap;
                }
            }
        }

        for frame in &mut frames {
            frame.rect.x -= view.scroll_x;
            frame.rect.y -= view.scroll_y;
        }

        Self {
            frames,
            scale,
            scroll_x: view.scroll_x,
            scroll_y: view.scroll_y,
            viewport_width: view.viewport_width,
            viewport_height: view.viewport_height,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn frames(&self) -> &[PageFrame] {
        &self.frames
    }

    pub fn frame(&self, page_index: usize) -> Option<ViewRect> {
        self.frames
            .iter()
            .find(|f| f.page_index == page_index)
            .map(|f| f.rect)
    }

    /// Pages whose frame intersects the viewport, in visual order.
    pub fn visible_pages(&self) -> Vec<usize> {
        let viewport = ViewRect::new(0.0, 0.0, self.viewport_width, self.viewport_height);
        self.frames
            .iter()
            .filter(|f| f.rect.intersects(viewport))
            .map(|f| f.page_index)
            .collect()
    }

    /// Maps a document-space point on `page_index` into viewport space.
    ///
    /// Pages outside the current layout fall back to the scrolled stack
    /// origin, so the mapping saturates instead of failing.
    pub fn to_viewport(&self, page_index: usize, p: DocPoint) -> ViewPoint {
        let (ox, oy) = self.page_origin(page_index);
        ViewPoint::new(ox + p.x * self.scale, oy + p.y * self.scale)
    }

    pub fn rect_to_viewport(&self, page_index: usize, rect: Rect) -> ViewRect {
        let origin = self.to_viewport(page_index, DocPoint::new(rect.x, rect.y));
        ViewRect::new(origin.x, origin.y, rect.w * self.scale, rect.h * self.scale)
    }

    /// Resolves which page a viewport point belongs to, returning `None`
    /// when the point falls in a gap or outside the stack.
    pub fn to_document(&self, p: ViewPoint) -> Option<(usize, DocPoint)> {
        for frame in &self.frames {
            if frame.rect.contains(p) {
                return Some((frame.page_index, self.page_to_document(frame.page_index, p)));
            }
        }
        None
    }

    /// The exact inverse of `to_viewport` for a known page, unclamped:
    /// points outside the page bounds map to coordinates outside
    /// `[0, page size]`, which gesture engines rely on.
    pub fn page_to_document(&self, page_index: usize, p: ViewPoint) -> DocPoint {
        let (ox, oy) = self.page_origin(page_index);
        DocPoint::new((p.x - ox) / self.scale, (p.y - oy) / self.scale)
    }

    fn page_origin(&self, page_index: usize) -> (f32, f32) {
        match self.frame(page_index) {
            Some(rect) => (rect.x, rect.y),
            None => (-self.scroll_x, -self.scroll_y),
        }
    }

    /// Total extent of the laid-out stack in viewport units, before scroll.
    pub fn content_extent(&self) -> (f32, f32) {
        let mut width = 0.0_f32;
        let mut height = 0.0_f32;
        for frame in &self.frames {
            width = width.max(frame.rect.right() + self.scroll_x);
            height = height.max(frame.rect.bottom() + self.scroll_y);
        }
        (width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> Vec<PageSize> {
        vec![
            PageSize::new(100.0, 200.0),
            PageSize::new(100.0, 200.0),
            PageSize::new(80.0, 160.0),
        ]
    }

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-3, "{} != {}", a, b);
    }

    #[test]
    fn round_trip_single_mode() {
        let view = ViewState {
            scale: 1.5,
            scroll_x: 12.0,
            scroll_y: 40.0,
            ..ViewState::default()
        };
        let layout = PageLayout::new(&sizes(), &view, 16.0);

        let p = DocPoint::new(33.0, 77.0);
        let vp = layout.to_viewport(0, p);
        let (page, back) = layout.to_document(vp).expect("point is on the page");
        assert_eq!(page, 0);
        assert_close(back.x, p.x);
        assert_close(back.y, p.y);
    }

    #[test]
    fn round_trip_continuous_mode() {
        let view = ViewState {
            mode: ViewMode::Continuous,
            scale: 2.0,
            scroll_y: 150.0,
            ..ViewState::default()
        };
        let layout = PageLayout::new(&sizes(), &view, 10.0);

        for page in 0..3 {
            let p = DocPoint::new(40.0, 10.0);
            let vp = layout.to_viewport(page, p);
            let (resolved, back) = layout.to_document(vp).expect("point is on the page");
            assert_eq!(resolved, page);
            assert_close(back.x, p.x);
            assert_close(back.y, p.y);
        }
    }

    #[test]
    fn gap_between_pages_resolves_to_no_page() {
        let view = ViewState {
            mode: ViewMode::Continuous,
            scale: 1.0,
            ..ViewState::default()
        };
        let layout = PageLayout::new(&sizes(), &view, 16.0);

        // First page is 200 tall; y = 205 lands inside the 16px gap.
        assert!(layout.to_document(ViewPoint::new(50.0, 205.0)).is_none());
    }

    #[test]
    fn double_mode_places_pages_side_by_side() {
        let view = ViewState {
            mode: ViewMode::Double,
            ..ViewState::default()
        };
        let layout = PageLayout::new(&sizes(), &view, 16.0);

        let left = layout.frame(0).unwrap();
        let right = layout.frame(1).unwrap();
        assert_close(left.y, right.y);
        assert_close(right.x, left.right() + 16.0);
        assert!(layout.frame(2).is_none());
    }

    #[test]
    fn single_mode_lays_out_only_the_current_page() {
        let view = ViewState {
            current_page: 1,
            ..ViewState::default()
        };
        let layout = PageLayout::new(&sizes(), &view, 16.0);
        assert_eq!(layout.frames().len(), 1);
        assert_eq!(layout.frames()[0].page_index, 1);
    }

    #[test]
    fn continuous_mode_centers_narrow_pages() {
        let view = ViewState {
            mode: ViewMode::Continuous,
            ..ViewState::default()
        };
        let layout = PageLayout::new(&sizes(), &view, 16.0);
        // Page 2 is 80 wide against a 100-wide stack: centered at x = 10.
        assert_close(layout.frame(2).unwrap().x, 10.0);
    }

    #[test]
    fn zoom_config_clamps_and_rejects_non_finite() {
        let zoom = ZoomConfig::new(0.5, 4.0);
        assert_close(zoom.clamp(0.1), 0.5);
        assert_close(zoom.clamp(10.0), 4.0);
        assert_close(zoom.clamp(f32::NAN), 0.5);
    }

    #[test]
    fn rect_from_points_normalizes_order() {
        let r = Rect::from_points(DocPoint::new(10.0, 20.0), DocPoint::new(4.0, 2.0));
        assert_close(r.x, 4.0);
        assert_close(r.y, 2.0);
        assert_close(r.w, 6.0);
        assert_close(r.h, 18.0);
    }
}
