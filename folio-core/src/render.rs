use serde::{Deserialize, Serialize};

use crate::config::Palette;
use crate::content::{AnnotationBody, MarkupKind, PageContent};
use crate::geometry::{DocPoint, PageLayout, Rect, ViewPoint, ViewRect};
use crate::ink::InkStyle;
use crate::shapes::{arrow_head, ShapeDraft, ShapeKind, ShapeStyle};

/// RGBA color, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(mut self, a: f32) -> Self {
        self.a = a;
        self
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaintStyle {
    Fill,
    Stroke,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Paint {
    pub color: Color,
    pub style: PaintStyle,
    pub stroke_width: f32,
}

impl Paint {
    pub fn fill(color: Color) -> Self {
        Self {
            color,
            style: PaintStyle::Fill,
            stroke_width: 0.0,
        }
    }

    pub fn stroke(color: Color, stroke_width: f32) -> Self {
        Self {
            color,
            style: PaintStyle::Stroke,
            stroke_width,
        }
    }
}

/// One drawable item in viewport space: geometry plus paint, nothing about
/// why it exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawPrimitive {
    Rect { rect: ViewRect, paint: Paint },
    Ellipse { rect: ViewRect, paint: Paint },
    Path { points: Vec<ViewPoint>, paint: Paint },
    Text {
        text: String,
        origin: ViewPoint,
        size: f32,
        color: Color,
    },
    Image { rect: ViewRect },
}

/// Transient engine output overlaid on one page during a render pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageOverlay<'a> {
    pub search_rects: &'a [Rect],
    pub selection_rects: &'a [Rect],
    pub ink_preview: Option<(&'a [DocPoint], InkStyle)>,
    pub shape_preview: Option<(ShapeDraft, ShapeStyle)>,
}

/// Derives draw primitives from page content, layout, and overlay state.
///
/// Pure: the same inputs always produce the same primitive list, in fixed
/// z-order — background, images, text, committed annotations, search
/// highlights, selection highlights, live preview on top.
#[derive(Debug, Clone)]
pub struct Renderer {
    palette: Palette,
}

impl Renderer {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    pub fn page_primitives(
        &self,
        page_index: usize,
        content: Option<&PageContent>,
        layout: &PageLayout,
        overlay: &PageOverlay<'_>,
    ) -> Vec<DrawPrimitive> {
        let Some(frame) = layout.frame(page_index) else {
            return Vec::new();
        };
        let scale = layout.scale();
        let mut out = Vec::new();

        out.push(DrawPrimitive::Rect {
            rect: frame,
            paint: Paint::fill(self.palette.page_background),
        });

        if let Some(content) = content {
            for image in &content.images {
                out.push(DrawPrimitive::Image {
                    rect: layout.rect_to_viewport(page_index, image.rect),
                });
            }
            for run in &content.text_runs {
                let bounds = run.bounds();
                if bounds.is_empty() && run.text.is_empty() {
                    continue;
                }
                let origin = layout.to_viewport(page_index, DocPoint::new(bounds.x, bounds.y));
                out.push(DrawPrimitive::Text {
                    text: run.text.clone(),
                    origin,
                    size: bounds.h * scale,
                    color: self.palette.text,
                });
            }
            for annotation in &content.annotations {
                self.annotation_primitives(&annotation.body, page_index, layout, &mut out);
            }
        }

        for rect in overlay.search_rects {
            out.push(DrawPrimitive::Rect {
                rect: layout.rect_to_viewport(page_index, *rect),
                paint: Paint::fill(self.palette.search_highlight),
            });
        }
        for rect in overlay.selection_rects {
            out.push(DrawPrimitive::Rect {
                rect: layout.rect_to_viewport(page_index, *rect),
                paint: Paint::fill(self.palette.selection),
            });
        }

        if let Some((points, style)) = overlay.ink_preview {
            push_polyline(
                points.iter().copied(),
                page_index,
                layout,
                Paint::stroke(style.color, style.width * scale),
                &mut out,
            );
        }
        if let Some((draft, style)) = overlay.shape_preview {
            shape_primitives(
                draft.kind,
                draft.start,
                draft.end,
                &style,
                page_index,
                layout,
                &mut out,
            );
        }

        out
    }

    fn annotation_primitives(
        &self,
        body: &AnnotationBody,
        page_index: usize,
        layout: &PageLayout,
        out: &mut Vec<DrawPrimitive>,
    ) {
        let scale = layout.scale();
        match body {
            AnnotationBody::Markup { kind, rects, color } => {
                for rect in rects {
                    markup_primitives(*kind, *rect, *color, page_index, layout, out);
                }
            }
            AnnotationBody::Note { at, color, .. } => {
                let icon = Rect::new(at.x, at.y, NOTE_ICON_SIZE, NOTE_ICON_SIZE);
                let view = layout.rect_to_viewport(page_index, icon);
                out.push(DrawPrimitive::Rect {
                    rect: view,
                    paint: Paint::fill(*color),
                });
                out.push(DrawPrimitive::Rect {
                    rect: view,
                    paint: Paint::stroke(Color::BLACK, 1.0),
                });
            }
            AnnotationBody::Ink {
                points,
                color,
                width,
            } => {
                push_polyline(
                    points.iter().copied(),
                    page_index,
                    layout,
                    Paint::stroke(*color, width * scale),
                    out,
                );
            }
            AnnotationBody::Shape {
                kind,
                start,
                end,
                style,
            } => {
                shape_primitives(*kind, *start, *end, style, page_index, layout, out);
            }
        }
    }
}

const NOTE_ICON_SIZE: f32 = 16.0;
const ARROW_HEAD_LENGTH: f32 = 12.0;
const SQUIGGLE_STEP: f32 = 4.0;
const SQUIGGLE_HEIGHT: f32 = 2.0;

fn push_polyline(
    points: impl Iterator<Item = DocPoint>,
    page_index: usize,
    layout: &PageLayout,
    paint: Paint,
    out: &mut Vec<DrawPrimitive>,
) {
    let view: Vec<ViewPoint> = points.map(|p| layout.to_viewport(page_index, p)).collect();
    if view.len() >= 2 {
        out.push(DrawPrimitive::Path {
            points: view,
            paint,
        });
    }
}

fn markup_primitives(
    kind: MarkupKind,
    rect: Rect,
    color: Color,
    page_index: usize,
    layout: &PageLayout,
    out: &mut Vec<DrawPrimitive>,
) {
    let scale = layout.scale();
    let line_width = (1.5 * scale).max(1.0);
    match kind {
        MarkupKind::Highlight => {
            out.push(DrawPrimitive::Rect {
                rect: layout.rect_to_viewport(page_index, rect),
                paint: Paint::fill(color.with_alpha(0.35)),
            });
        }
        MarkupKind::Underline => {
            push_polyline(
                [
                    DocPoint::new(rect.x, rect.bottom()),
                    DocPoint::new(rect.right(), rect.bottom()),
                ]
                .into_iter(),
                page_index,
                layout,
                Paint::stroke(color, line_width),
                out,
            );
        }
        MarkupKind::Strikethrough => {
            let mid = rect.y + rect.h / 2.0;
            push_polyline(
                [
                    DocPoint::new(rect.x, mid),
                    DocPoint::new(rect.right(), mid),
                ]
                .into_iter(),
                page_index,
                layout,
                Paint::stroke(color, line_width),
                out,
            );
        }
        MarkupKind::Squiggly => {
            push_polyline(
                squiggle_points(rect.x, rect.right(), rect.bottom()).into_iter(),
                page_index,
                layout,
                Paint::stroke(color, (1.0 * scale).max(1.0)),
                out,
            );
        }
    }
}

/// Zigzag wave along the baseline, in document units.
fn squiggle_points(x0: f32, x1: f32, y: f32) -> Vec<DocPoint> {
    let mut points = Vec::new();
    let mut x = x0;
    let mut up = true;
    while x < x1 {
        let py = if up { y - SQUIGGLE_HEIGHT } else { y };
        points.push(DocPoint::new(x, py));
        x += SQUIGGLE_STEP;
        up = !up;
    }
    points.push(DocPoint::new(x1, if up { y - SQUIGGLE_HEIGHT } else { y }));
    points
}

fn shape_primitives(
    kind: ShapeKind,
    start: DocPoint,
    end: DocPoint,
    style: &ShapeStyle,
    page_index: usize,
    layout: &PageLayout,
    out: &mut Vec<DrawPrimitive>,
) {
    let scale = layout.scale();
    let stroke = Paint::stroke(style.stroke, style.stroke_width * scale);
    match kind {
        ShapeKind::Rectangle | ShapeKind::Circle => {
            let bounds = Rect::from_points(start, end);
            let view = layout.rect_to_viewport(page_index, bounds);
            if let Some(fill) = style.fill {
                let paint = Paint::fill(fill);
                out.push(match kind {
                    ShapeKind::Rectangle => DrawPrimitive::Rect { rect: view, paint },
                    _ => DrawPrimitive::Ellipse { rect: view, paint },
                });
            }
            out.push(match kind {
                ShapeKind::Rectangle => DrawPrimitive::Rect {
                    rect: view,
                    paint: stroke,
                },
                _ => DrawPrimitive::Ellipse {
                    rect: view,
                    paint: stroke,
                },
            });
        }
        ShapeKind::Line => {
            push_polyline([start, end].into_iter(), page_index, layout, stroke, out);
        }
        ShapeKind::Arrow => {
            push_polyline([start, end].into_iter(), page_index, layout, stroke, out);
            let [left, right] = arrow_head(start, end, ARROW_HEAD_LENGTH);
            push_polyline([left, end, right].into_iter(), page_index, layout, stroke, out);
        }
    }
}
