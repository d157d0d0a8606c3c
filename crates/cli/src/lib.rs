use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leafview_cache::{CacheConfig, ThumbnailDiskStore};
use leafview_core::{PageSource, SourceOptions, ThumbnailCache};
use leafview_pdf_engine::PagedEngine;
use leafview_render::encode_png;
use leafview_scheduler::{SlotId, WorkerPool, WorkerPoolConfig};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const RENDER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Parser)]
#[command(name = "leafview")]
#[command(about = "Leafview page and thumbnail renderer")]
pub struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render one page to PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based page number.
        #[arg(long)]
        page: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Produce the document thumbnail through the thumbnail cache.
    Thumb {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete persisted thumbnails past the retention window.
    CleanThumbs {
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,
        #[arg(long)]
        max_age_days: Option<u64>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    format: &'static str,
    page_count: u32,
    pages: Vec<String>,
}

/// Install the stderr log subscriber, honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("leafview=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = CacheConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Info { file } => run_info(&file, &config),
        Commands::Render { file, page, output } => run_render(&file, page, output.as_deref(), &config),
        Commands::Thumb { file, cache_dir, output } => {
            run_thumb(&file, cache_dir, output.as_deref(), config)
        }
        Commands::CleanThumbs { cache_dir, max_age_days } => {
            run_clean_thumbs(cache_dir, max_age_days, config)
        }
        Commands::Version => Ok(()),
    }
}

fn source_options(config: &CacheConfig) -> SourceOptions {
    SourceOptions::from_config(config).with_paged_engine(paged_engine())
}

#[cfg(feature = "pdfium")]
fn paged_engine() -> Arc<dyn PagedEngine> {
    match leafview_pdf_engine::pdfium_backend::PdfiumEngine::from_system_library() {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            tracing::warn!(error = %err, "pdfium unavailable, falling back to lopdf");
            leafview_pdf_engine::default_engine()
        }
    }
}

#[cfg(not(feature = "pdfium"))]
fn paged_engine() -> Arc<dyn PagedEngine> {
    leafview_pdf_engine::default_engine()
}

fn open_source(file: &Path, config: &CacheConfig) -> Result<PageSource> {
    ensure_file_exists(file)?;
    PageSource::open_path(file, &source_options(config))
        .with_context(|| format!("failed to open {}", file.display()))
}

fn run_info(file: &Path, config: &CacheConfig) -> Result<()> {
    let source = open_source(file, config)?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        format: source.format().name(),
        page_count: source.page_count(),
        pages: source.entries().iter().map(|entry| entry.name.clone()).collect(),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    source.close();
    Ok(())
}

fn run_render(file: &Path, page: u32, output: Option<&Path>, config: &CacheConfig) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let source = Arc::new(open_source(file, config)?);
    let page_count = source.page_count();
    if page > page_count {
        anyhow::bail!("page {page} out of range (document has {page_count} pages)");
    }

    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::adaptive()));
    let scheduler = source.scheduler(pool);
    let slot = SlotId(0);

    scheduler.request(slot, page - 1).context("render request was rejected")?;
    let delivery = scheduler
        .wait_for(slot, RENDER_TIMEOUT)
        .with_context(|| format!("page {page} was not rendered"))?;
    scheduler.cancel_all();

    if let Some(caption) = delivery.image.caption() {
        tracing::warn!(caption, "page could not be decoded, writing placeholder");
    }

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_output(file, &format!("page-{page}")));
    write_png(&delivery.image, &output)?;
    println!("{}", output.display());

    source.close();
    Ok(())
}

fn run_thumb(
    file: &Path,
    cache_dir: Option<PathBuf>,
    output: Option<&Path>,
    mut config: CacheConfig,
) -> Result<()> {
    ensure_file_exists(file)?;
    let locator = leafview_core::DocumentLocator::from_path(file)
        .with_context(|| format!("unsupported document format: {}", file.display()))?;

    if let Some(dir) = cache_dir {
        config.thumbnail_dir = dir;
    }

    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::new(1)));
    let thumbnails = ThumbnailCache::from_config(&config, pool)
        .with_context(|| format!("failed to open thumbnail cache at {}", config.thumbnail_dir.display()))?;

    let image = thumbnails
        .load_blocking(&locator)
        .with_context(|| format!("failed to produce a thumbnail for {}", file.display()))?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_output(file, "thumb"));
    write_png(&image, &output)?;
    println!("{}", output.display());

    Ok(())
}

fn run_clean_thumbs(cache_dir: Option<PathBuf>, max_age_days: Option<u64>, mut config: CacheConfig) -> Result<()> {
    if let Some(dir) = cache_dir {
        config.thumbnail_dir = dir;
    }
    if let Some(days) = max_age_days {
        config.retention_days = days;
    }

    let store = ThumbnailDiskStore::new(&config.thumbnail_dir)
        .with_context(|| format!("failed to open thumbnail directory {}", config.thumbnail_dir.display()))?;
    let report = store.cleanup_older_than(config.retention()).context("thumbnail cleanup failed")?;

    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");

    Ok(())
}

fn write_png(image: &leafview_render::RasterImage, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let png = encode_png(image).context("failed to encode PNG")?;
    fs::write(output, png).with_context(|| format!("failed to write image to {}", output.display()))
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_output(file: &Path, suffix: &str) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("document");

    file.with_file_name(format!("{stem}-{suffix}.png"))
}
