//! Backend-agnostic view/interaction engine for paginated documents:
//! coordinate transforms, a page-content model, a draw-primitive renderer,
//! and the selection/ink/shape/search interaction state machines, wired
//! together by a single-owner [`Viewer`] orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod config;
pub mod content;
pub mod geometry;
pub mod ink;
pub mod render;
pub mod search;
pub mod selection;
pub mod shapes;
pub mod store;
pub mod viewer;

pub use config::{Palette, ViewerConfig};
pub use content::{
    fetch_page_content, AnnotationBody, AnnotationRequest, AnnotationShape, ContentStore,
    ImagePlaceholder, MarkupKind, PageChars, PageContent, TextRun,
};
pub use geometry::{
    DocPoint, PageFrame, PageLayout, PageSize, Rect, ViewMode, ViewPoint, ViewRect, ViewState,
    ZoomConfig,
};
pub use ink::{InkEngine, InkStyle};
pub use render::{Color, DrawPrimitive, Paint, PaintStyle, Renderer};
pub use search::{SearchEngine, SearchMatch, SearchOptions};
pub use selection::{CharRef, SelectionEngine, SelectionPhase, SelectionSpan};
pub use shapes::{ShapeDraft, ShapeEngine, ShapeKind, ShapeStyle};
pub use store::{FileStateStore, MemoryStateStore, PersistedViewState, StateStore};
pub use viewer::{
    ActiveTool, ChangeNotification, EventOutcome, PopupRequest, Viewer,
};

pub type DocumentId = Uuid;
pub type AnnotationId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f1a6fd4-2c8b-5e19-9d07-6a41c0b8d5e2").expect("valid namespace UUID")
});

/// Stable id for a document, derived from its canonicalized path.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

/// One entry of the document outline, flattened with its nesting depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    pub title: String,
    pub page_index: usize,
    pub depth: usize,
}

/// RGBA8 raster of one page, produced by the backend's long-running
/// render operation.
#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Errors surfaced by the core. Transform functions never fail; engine
/// state machines treat undefined transitions as no-ops.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("page {page} out of range (document has {page_count} pages)")]
    InvalidPageIndex { page: usize, page_count: usize },
    #[error("no active selection")]
    NoActiveSelection,
    #[error("degenerate geometry")]
    DegenerateGeometry,
    #[error("backend unavailable: {0}")]
    Backend(#[source] anyhow::Error),
}

pub type ViewerResult<T> = Result<T, ViewerError>;

/// The capability set the core needs from a document backend. Anything
/// implementing this is substitutable; the engine never sees the
/// underlying format.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn page_size(&self, page_index: usize) -> Result<PageSize>;
    fn text_runs(&self, page_index: usize) -> Result<Vec<TextRun>>;
    fn annotations(&self, page_index: usize) -> Result<Vec<AnnotationShape>>;
    fn images(&self, page_index: usize) -> Result<Vec<ImagePlaceholder>>;
    fn create_annotation(&self, request: &AnnotationRequest) -> Result<AnnotationId>;
    fn outline(&self) -> Result<Vec<OutlineItem>>;
    fn resolve_destination(&self, name: &str) -> Result<Option<usize>>;
    fn render_page_bitmap(&self, page_index: usize, scale: f32) -> Result<RenderImage>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}
