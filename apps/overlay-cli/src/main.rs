//! Overlay CLI
//!
//! Inspect the preview geometry of a PDF, or bake a saved annotation
//! document into it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use overlay_core::{AnnotationStore, DataUrlDecoder, DirFontSource, EditSession, EditorConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "overlay")]
#[command(version, about = "Place text, signature and symbol overlays onto PDF pages")]
struct Args {
    /// Editor configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the preview size of every page as JSON
    Pages {
        /// Source PDF
        input: PathBuf,
    },
    /// Bake an annotation document into the PDF
    Export {
        /// Source PDF
        input: PathBuf,

        /// Annotation document (JSON array, preview coordinates)
        #[arg(short, long)]
        annotations: PathBuf,

        /// Where to write the flattened PDF
        #[arg(short, long)]
        output: PathBuf,

        /// Directory with Ubuntu-R/B/I/BI.ttf to embed instead of the standard fonts
        #[arg(long)]
        font_dir: Option<PathBuf>,

        /// Base directory for image paths (defaults to the annotation file's directory)
        #[arg(long)]
        asset_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries command output, logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => EditorConfig::from_file(path)?,
        None => EditorConfig::default(),
    };

    match args.command {
        Command::Pages { input } => pages(config, &input).await,
        Command::Export {
            input,
            annotations,
            output,
            font_dir,
            asset_dir,
        } => {
            let asset_dir = asset_dir.unwrap_or_else(|| parent_dir(&annotations));
            export(config, &input, &annotations, &output, font_dir, asset_dir).await
        }
    }
}

async fn read_source(input: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read PDF: {}", input.display()))
}

async fn pages(config: EditorConfig, input: &Path) -> Result<()> {
    let mut session = EditSession::new(config);
    let pages = session
        .load(read_source(input).await?)
        .await
        .with_context(|| format!("Failed to load {}", input.display()))?;
    println!("{}", serde_json::to_string_pretty(pages)?);
    Ok(())
}

async fn export(
    config: EditorConfig,
    input: &Path,
    annotations: &Path,
    output: &Path,
    font_dir: Option<PathBuf>,
    asset_dir: PathBuf,
) -> Result<()> {
    let mut session = EditSession::new(config)
        .with_asset_decoder(Arc::new(DataUrlDecoder::with_base_dir(asset_dir)));
    if let Some(dir) = font_dir {
        tracing::info!("Embedding fonts from {}", dir.display());
        session = session.with_font_source(Arc::new(DirFontSource::ubuntu(dir)));
        session.load_font_metrics().await;
    }

    session
        .load(read_source(input).await?)
        .await
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let json = tokio::fs::read_to_string(annotations)
        .await
        .with_context(|| format!("Failed to read annotations: {}", annotations.display()))?;
    let store = AnnotationStore::from_json(&json)
        .with_context(|| format!("Invalid annotation document: {}", annotations.display()))?;
    let count = store.len();
    session.replace_annotations(store)?;

    let bytes = session.export().await.context("Export failed")?;
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!("Wrote {} annotations to {}", count, output.display());
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
