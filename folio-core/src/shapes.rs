use serde::{Deserialize, Serialize};

use crate::geometry::{DocPoint, Rect};
use crate::render::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Line,
    Arrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeStyle {
    pub stroke: Color,
    pub fill: Option<Color>,
    pub stroke_width: f32,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke: Color::BLACK,
            fill: None,
            stroke_width: 2.0,
        }
    }
}

/// A drag-defined shape in document space. `start` stays fixed at the
/// pointer-down position; `end` tracks the pointer until release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeDraft {
    pub kind: ShapeKind,
    pub start: DocPoint,
    pub end: DocPoint,
}

impl ShapeDraft {
    pub fn bounds(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }

    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }
}

/// Endpoints of the two arrowhead barbs for a line from `start` to `end`,
/// swept back from the tip at a fixed angle.
pub fn arrow_head(start: DocPoint, end: DocPoint, length: f32) -> [DocPoint; 2] {
    let angle = (end.y - start.y).atan2(end.x - start.x);
    let spread = std::f32::consts::PI * 5.0 / 6.0;
    let left = angle + spread;
    let right = angle - spread;
    [
        DocPoint::new(end.x + length * left.cos(), end.y + length * left.sin()),
        DocPoint::new(end.x + length * right.cos(), end.y + length * right.sin()),
    ]
}

#[derive(Debug, Clone, PartialEq)]
enum ShapeState {
    Disabled,
    Armed,
    Tracing(ShapeDraft),
}

/// State machine for drag-drawn geometric shapes.
///
/// `Disabled -> Armed(kind) -> Tracing -> Armed(kind)`. Undefined
/// event/state pairs are no-ops; a zero-area result is discarded.
#[derive(Debug, Clone)]
pub struct ShapeEngine {
    state: ShapeState,
    kind: ShapeKind,
    style: ShapeStyle,
}

impl ShapeEngine {
    pub fn new() -> Self {
        Self {
            state: ShapeState::Disabled,
            kind: ShapeKind::Rectangle,
            style: ShapeStyle::default(),
        }
    }

    pub fn enable(&mut self, kind: ShapeKind, style: ShapeStyle) {
        self.kind = kind;
        self.style = style;
        self.state = ShapeState::Armed;
    }

    pub fn disable(&mut self) {
        self.state = ShapeState::Disabled;
    }

    /// Switches the armed shape kind. Mid-trace, the draft is cancelled
    /// and the engine re-arms with the new kind.
    pub fn set_kind(&mut self, kind: ShapeKind) {
        self.kind = kind;
        if matches!(self.state, ShapeState::Tracing(_)) {
            self.state = ShapeState::Armed;
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn style(&self) -> &ShapeStyle {
        &self.style
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.state, ShapeState::Disabled)
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, ShapeState::Armed)
    }

    pub fn is_tracing(&self) -> bool {
        matches!(self.state, ShapeState::Tracing(_))
    }

    pub fn draft(&self) -> Option<&ShapeDraft> {
        match &self.state {
            ShapeState::Tracing(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn pointer_down(&mut self, p: DocPoint) {
        if matches!(self.state, ShapeState::Armed) {
            self.state = ShapeState::Tracing(ShapeDraft {
                kind: self.kind,
                start: p,
                end: p,
            });
        }
    }

    pub fn pointer_move(&mut self, p: DocPoint) {
        if let ShapeState::Tracing(draft) = &mut self.state {
            draft.end = p;
        }
    }

    /// Finishes the drag. Returns the frozen draft unless it is
    /// degenerate; either way the engine returns to `Armed`.
    pub fn pointer_up(&mut self) -> Option<ShapeDraft> {
        match std::mem::replace(&mut self.state, ShapeState::Disabled) {
            ShapeState::Tracing(draft) => {
                self.state = ShapeState::Armed;
                if draft.is_degenerate() {
                    None
                } else {
                    Some(draft)
                }
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Cancels any in-progress draft without committing.
    pub fn cancel(&mut self) {
        if matches!(self.state, ShapeState::Tracing(_)) {
            self.state = ShapeState::Armed;
        }
    }
}

impl Default for ShapeEngine {
    fn default() -> Self {
        Self::new()
    }
}
