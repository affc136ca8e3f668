//! Pdfium-backed implementation of the folio document backend.
//!
//! Adapts native PDF data into the core's backend-agnostic content model.
//! Annotations created through the viewer are held in a per-page in-memory
//! overlay; writing them back into the file is out of scope.

use std::collections::HashMap;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use folio_core::{
    document_id_for_path, AnnotationBody, AnnotationId, AnnotationRequest, AnnotationShape, Color,
    DocPoint, DocumentBackend, DocumentInfo, DocumentMetadata, DocumentProvider, ImagePlaceholder,
    MarkupKind, OutlineItem, PageSize, Rect, RenderImage, ShapeKind, ShapeStyle, TextRun,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{instrument, warn};
use uuid::Uuid;

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let info = build_document_info(&self.pdfium, &absolute)?;
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            absolute,
            info,
        )))
    }
}

struct PdfiumDocument {
    // Declared first so the cached document drops before the bindings it
    // borrows from.
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    info: DocumentInfo,
    outline_cache: Mutex<Option<Vec<OutlineItem>>>,
    /// Annotations created this session, keyed by page.
    overlay: Mutex<HashMap<usize, Vec<AnnotationShape>>>,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, info: DocumentInfo) -> Self {
        Self {
            document: Mutex::new(None),
            pdfium,
            path,
            info,
            outline_cache: Mutex::new(None),
            overlay: Mutex::new(HashMap::new()),
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the returned PdfDocument borrows from the Pdfium bindings owned by
        // self.pdfium. The document is stored inside self.document, which is declared
        // before pdfium and therefore drops first, so the borrow never outlives the
        // bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            let document = self.open_document()?;
            *guard = Some(document);
        }
        let document = guard.as_ref().expect("document must be loaded");
        f(document)
    }

    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        self.with_document(|document| {
            let index: PdfPageIndex = page_index
                .try_into()
                .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
            let page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page_index))?;
            f(&page)
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        self.with_page(page_index, |page| {
            Ok(PageSize::new(page.width().value, page.height().value))
        })
    }

    #[instrument(skip(self))]
    fn text_runs(&self, page_index: usize) -> Result<Vec<TextRun>> {
        self.with_page(page_index, |page| {
            let page_height = page.height().value;
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;

            let mut runs = Vec::new();
            for segment in text.segments().iter() {
                let segment_text = segment.text();
                let count = segment_text.chars().count();
                if count == 0 || segment_text.trim().is_empty() {
                    continue;
                }
                let bounds = segment.bounds();
                let left = bounds.left().value;
                let right = bounds.right().value;
                let top = bounds.top().value;
                let bottom = bounds.bottom().value;
                let height = (top - bottom).max(0.0);
                let y = page_height - top;
                // Per-character boxes from an even split of the segment
                // width; pdfium does not hand out per-glyph advances here.
                let char_width = (right - left) / count as f32;
                let glyph_rects = (0..count)
                    .map(|i| Rect::new(left + char_width * i as f32, y, char_width, height))
                    .collect();
                runs.push(TextRun::new(segment_text, glyph_rects, page_index));
            }
            Ok(runs)
        })
    }

    fn annotations(&self, page_index: usize) -> Result<Vec<AnnotationShape>> {
        let mut shapes = self.with_page(page_index, |page| {
            let page_height = page.height().value;
            let mut out = Vec::new();
            for annotation in page.annotations().iter() {
                let bounds = match annotation.bounds() {
                    Ok(bounds) => bounds,
                    Err(err) => {
                        warn!(
                            ?err,
                            page = page_index,
                            path = %self.path.display(),
                            "failed to resolve annotation bounds"
                        );
                        continue;
                    }
                };
                let rect = rect_from_pdfium(
                    bounds.left().value,
                    bounds.top().value,
                    bounds.right().value,
                    bounds.bottom().value,
                    page_height,
                );
                if let Some(body) = annotation_body(&annotation, rect) {
                    out.push(AnnotationShape {
                        id: Uuid::new_v4(),
                        body,
                    });
                }
            }
            Ok(out)
        })?;

        if let Some(created) = self.overlay.lock().get(&page_index) {
            shapes.extend(created.iter().cloned());
        }
        Ok(shapes)
    }

    fn images(&self, page_index: usize) -> Result<Vec<ImagePlaceholder>> {
        self.with_page(page_index, |page| {
            let page_height = page.height().value;
            let mut placeholders = Vec::new();
            for object in page.objects().iter() {
                if let PdfPageObject::Image(ref image) = object {
                    match image.bounds() {
                        Ok(bounds) => placeholders.push(ImagePlaceholder {
                            rect: rect_from_pdfium(
                                bounds.left().value,
                                bounds.top().value,
                                bounds.right().value,
                                bounds.bottom().value,
                                page_height,
                            ),
                        }),
                        Err(err) => {
                            warn!(?err, page = page_index, "failed to resolve image bounds");
                        }
                    }
                }
            }
            Ok(placeholders)
        })
    }

    fn create_annotation(&self, request: &AnnotationRequest) -> Result<AnnotationId> {
        if request.page_index >= self.info.page_count {
            return Err(anyhow!("page {} out of range", request.page_index));
        }
        let id = Uuid::new_v4();
        self.overlay
            .lock()
            .entry(request.page_index)
            .or_default()
            .push(AnnotationShape {
                id,
                body: request.body.clone(),
            });
        Ok(id)
    }

    fn outline(&self) -> Result<Vec<OutlineItem>> {
        {
            let cache = self.outline_cache.lock();
            if let Some(cached) = cache.as_ref() {
                return Ok(cached.clone());
            }
        }

        let outline = self.with_document(|document| {
            let mut outline = Vec::new();
            if let Some(root) = document.bookmarks().root() {
                collect_outline(root, 0, &mut outline);
            }
            Ok(outline)
        })?;

        let mut cache = self.outline_cache.lock();
        *cache = Some(outline.clone());

        Ok(outline)
    }

    fn resolve_destination(&self, name: &str) -> Result<Option<usize>> {
        // Pdfium exposes no direct named-destination lookup through these
        // bindings; outline titles cover the common case.
        let outline = self.outline()?;
        Ok(outline
            .iter()
            .find(|item| item.title.eq_ignore_ascii_case(name))
            .map(|item| item.page_index))
    }

    #[instrument(skip(self))]
    fn render_page_bitmap(&self, page_index: usize, scale: f32) -> Result<RenderImage> {
        self.with_page(page_index, |page| {
            let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", page_index))?;
            let image = bitmap.as_image().to_rgba8();
            let width = image.width();
            let height = image.height();
            Ok(RenderImage {
                width,
                height,
                pixels: image.into_raw(),
            })
        })
    }
}

/// Converts a pdfium rectangle (origin bottom-left) into document space
/// (origin top-left).
fn rect_from_pdfium(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> Rect {
    Rect::new(left, page_height - top, right - left, top - bottom)
}

fn annotation_body(annotation: &PdfPageAnnotation<'_>, rect: Rect) -> Option<AnnotationBody> {
    let markup = |kind: MarkupKind| AnnotationBody::Markup {
        kind,
        rects: vec![rect],
        color: default_markup_color(kind),
    };
    match annotation.annotation_type() {
        PdfPageAnnotationType::Highlight => Some(markup(MarkupKind::Highlight)),
        PdfPageAnnotationType::Underline => Some(markup(MarkupKind::Underline)),
        PdfPageAnnotationType::Strikeout => Some(markup(MarkupKind::Strikethrough)),
        PdfPageAnnotationType::Squiggly => Some(markup(MarkupKind::Squiggly)),
        PdfPageAnnotationType::Square => Some(shape_body(ShapeKind::Rectangle, rect)),
        PdfPageAnnotationType::Circle => Some(shape_body(ShapeKind::Circle, rect)),
        PdfPageAnnotationType::Line => Some(shape_body(ShapeKind::Line, rect)),
        PdfPageAnnotationType::Text => Some(AnnotationBody::Note {
            at: DocPoint::new(rect.x, rect.y),
            text: annotation.contents().unwrap_or_default(),
            color: Color::rgb(1.0, 0.92, 0.0),
        }),
        _ => None,
    }
}

fn shape_body(kind: ShapeKind, rect: Rect) -> AnnotationBody {
    AnnotationBody::Shape {
        kind,
        start: DocPoint::new(rect.x, rect.y),
        end: DocPoint::new(rect.right(), rect.bottom()),
        style: ShapeStyle::default(),
    }
}

fn default_markup_color(kind: MarkupKind) -> Color {
    match kind {
        MarkupKind::Highlight => Color::rgb(1.0, 0.92, 0.23),
        MarkupKind::Underline => Color::rgb(0.38, 0.65, 0.98),
        MarkupKind::Strikethrough => Color::rgb(0.97, 0.44, 0.44),
        MarkupKind::Squiggly => Color::rgb(0.0, 0.8, 0.0),
    }
}

fn collect_outline(mut bookmark: PdfBookmark<'_>, depth: usize, out: &mut Vec<OutlineItem>) {
    loop {
        if let Some(title) = bookmark.title() {
            if let Some(destination) = bookmark.destination() {
                if let Ok(page_index) = destination.page_index() {
                    let page_index = page_index as usize;
                    out.push(OutlineItem {
                        title,
                        page_index,
                        depth,
                    });
                }
            }
        }

        if let Some(child) = bookmark.first_child() {
            collect_outline(child, depth + 1, out);
        }

        match bookmark.next_sibling() {
            Some(next) => bookmark = next,
            None => break,
        }
    }
}

fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned());
    let keywords = metadata
        .get(PdfDocumentMetadataTagType::Keywords)
        .map(|t| t.value().split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_else(Vec::new);

    Ok(DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        metadata: DocumentMetadata {
            title,
            author,
            keywords,
        },
    })
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match std::env::var("FOLIO_PDFIUM_LIBRARY_PATH") {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load Pdfium from {}: {}", path, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}
