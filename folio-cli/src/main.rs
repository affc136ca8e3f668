use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use folio_core::{
    DocumentBackend, DocumentProvider, FileStateStore, SearchOptions, StateStore, ViewMode,
    Viewer, ViewerConfig,
};
use folio_render::PdfiumProvider;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "headless driver for the folio document view engine"
)]
struct Args {
    /// Path to the document to open
    file: PathBuf,

    /// Page to operate on (0-based); defaults to the last viewed page
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Zoom scale override
    #[arg(short = 's', long = "scale")]
    scale: Option<f32>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print document metadata
    Info,
    /// Search the document text and list every match
    Search {
        query: String,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long)]
        whole_word: bool,
    },
    /// Print the document outline
    Toc,
    /// Dump the visible pages' draw primitives as JSON
    Primitives {
        #[arg(long, value_enum, default_value_t = ModeArg::Single)]
        mode: ModeArg,
    },
    /// Rasterize the current page to a PNG file
    Render {
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Single,
    Continuous,
    Double,
}

impl From<ModeArg> for ViewMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => ViewMode::Single,
            ModeArg::Continuous => ViewMode::Continuous,
            ModeArg::Double => ViewMode::Double,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "folio", "folio")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config = ViewerConfig::load_or_default(&project_dirs.config_dir().join("config.toml"))?;
    let store: Arc<dyn StateStore> =
        Arc::new(FileStateStore::new(project_dirs.data_local_dir().join("state"))?);

    let provider = PdfiumProvider::new()?;
    let backend = provider
        .open(&args.file)
        .await
        .with_context(|| format!("failed to open {:?}", args.file))?;

    let mut viewer = Viewer::new(Arc::clone(&backend), config)?;
    if let Some(state) = store.load(backend.info())? {
        viewer.restore_state(&state);
    }
    if let Some(page) = args.page {
        viewer.goto(page)?;
    }
    if let Some(scale) = args.scale {
        viewer.set_scale(scale);
    }

    match args.command {
        CliCommand::Info => {
            let info = viewer.document_info();
            println!("path:   {}", info.path.display());
            println!("pages:  {}", info.page_count);
            if let Some(title) = &info.metadata.title {
                println!("title:  {}", title);
            }
            if let Some(author) = &info.metadata.author {
                println!("author: {}", author);
            }
            if !info.metadata.keywords.is_empty() {
                println!("keywords: {}", info.metadata.keywords.join(", "));
            }
            let layout = viewer.layout();
            if let Some(frame) = layout.frames().first() {
                println!(
                    "page size: {:.1} x {:.1} (at scale {:.2})",
                    frame.rect.w,
                    frame.rect.h,
                    viewer.view().scale
                );
            }
        }
        CliCommand::Search {
            query,
            case_sensitive,
            whole_word,
        } => {
            let options = SearchOptions {
                case_sensitive,
                whole_word,
            };
            let count = viewer.search(&query, options)?;
            println!("{} match(es) for {:?}", count, query);
            for m in viewer.search_matches() {
                let location = m
                    .rects
                    .first()
                    .map(|r| format!(" at ({:.1}, {:.1})", r.x, r.y))
                    .unwrap_or_default();
                println!("  [{}] page {}{}", m.match_index, m.page_index + 1, location);
            }
        }
        CliCommand::Toc => {
            let outline = viewer.outline()?;
            if outline.is_empty() {
                println!("(no outline)");
            }
            for item in outline {
                println!(
                    "{}{} ... page {}",
                    "  ".repeat(item.depth),
                    item.title,
                    item.page_index + 1
                );
            }
        }
        CliCommand::Primitives { mode } => {
            viewer.set_mode(mode.into());
            viewer.ensure_visible_content()?;
            let primitives = viewer.render();
            println!("{}", serde_json::to_string_pretty(&primitives)?);
        }
        CliCommand::Render { output } => {
            let page = viewer.view().current_page;
            let scale = viewer.view().scale;
            let bitmap = backend.render_page_bitmap(page, scale)?;
            let image =
                image::RgbaImage::from_raw(bitmap.width, bitmap.height, bitmap.pixels)
                    .ok_or_else(|| anyhow!("backend returned a malformed bitmap"))?;
            image
                .save(&output)
                .with_context(|| format!("failed to write {:?}", output))?;
            println!("wrote page {} to {}", page + 1, output.display());
        }
    }

    store.save(backend.info(), &viewer.persisted_state())?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
