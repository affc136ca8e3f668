use serde::{Deserialize, Serialize};

use crate::geometry::DocPoint;
use crate::render::Color;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InkStyle {
    pub color: Color,
    pub width: f32,
}

impl Default for InkStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InkState {
    Disabled,
    Armed,
    Tracing,
}

/// State machine for freehand ink strokes.
///
/// `Disabled -> Armed -> Tracing -> Armed` on commit. Points accumulate in
/// document space subject to a minimum-distance threshold so fast drags
/// stay bounded. Disabling mid-trace discards the path.
#[derive(Debug, Clone)]
pub struct InkEngine {
    state: InkState,
    style: InkStyle,
    min_distance: f32,
    path: Vec<DocPoint>,
}

impl InkEngine {
    pub fn new() -> Self {
        Self {
            state: InkState::Disabled,
            style: InkStyle::default(),
            min_distance: 2.0,
            path: Vec::new(),
        }
    }

    pub fn enable(&mut self, style: InkStyle, min_distance: f32) {
        self.style = style;
        self.min_distance = min_distance.max(0.0);
        self.path.clear();
        self.state = InkState::Armed;
    }

    pub fn disable(&mut self) {
        self.state = InkState::Disabled;
        self.path.clear();
    }

    pub fn style(&self) -> &InkStyle {
        &self.style
    }

    pub fn is_enabled(&self) -> bool {
        self.state != InkState::Disabled
    }

    pub fn is_armed(&self) -> bool {
        self.state == InkState::Armed
    }

    pub fn is_tracing(&self) -> bool {
        self.state == InkState::Tracing
    }

    /// The in-progress stroke, for live preview.
    pub fn path(&self) -> &[DocPoint] {
        &self.path
    }

    pub fn pointer_down(&mut self, p: DocPoint) {
        if self.state == InkState::Armed {
            self.path.clear();
            self.path.push(p);
            self.state = InkState::Tracing;
        }
    }

    pub fn pointer_move(&mut self, p: DocPoint) {
        if self.state != InkState::Tracing {
            return;
        }
        match self.path.last() {
            Some(last) if last.distance(p) < self.min_distance => {}
            _ => self.path.push(p),
        }
    }

    /// Finishes the stroke and returns it for commit. Strokes shorter
    /// than two points are degenerate and dropped. The engine stays
    /// `Armed` for further strokes.
    pub fn pointer_up(&mut self) -> Option<Vec<DocPoint>> {
        if self.state != InkState::Tracing {
            return None;
        }
        self.state = InkState::Armed;
        let path = std::mem::take(&mut self.path);
        if path.len() < 2 {
            None
        } else {
            Some(path)
        }
    }

}

impl Default for InkEngine {
    fn default() -> Self {
        Self::new()
    }
}
