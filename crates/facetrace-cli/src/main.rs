use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facetrace_core::annotate::{annotate, load_font};
use facetrace_core::{CascadeDetector, FacePipeline, Fetcher, HarArchive, Target};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod display;

use config::Config;

#[derive(Parser)]
#[command(name = "facetrace", about = "Harvest faces from HAR captures, train, and scan images for a target")]
struct Cli {
    /// TOML config file (default: $FACETRACE_CONFIG or ./facetrace.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move new HAR captures into the target folder, download their images and save detected faces
    #[command(alias = "add_images", alias = "add-images")]
    Init {
        /// Target name (folder under the targets directory, or a path)
        target: String,
    },
    /// Train the target's recognizer from its saved face crops
    Train {
        /// Target name
        target: String,
    },
    /// Download one image and look for the target's face in it
    #[command(name = "scan_for", alias = "scan-for")]
    ScanFor {
        /// Target name
        target: String,
        /// Image URL to scan
        url: String,
        /// Also save the annotated image here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Do not open a window
        #[arg(long)]
        no_window: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { target } => add_images(&config, &target).await,
        Commands::Train { target } => train(&config, &target),
        Commands::ScanFor {
            target,
            url,
            output,
            no_window,
        } => scan_for(&config, &target, &url, output, no_window).await,
    }
}

/// Load the cascade and bind it to the target, with its model if trained.
fn open_pipeline(config: &Config, target: Target) -> Result<FacePipeline<CascadeDetector>> {
    let detector = CascadeDetector::load(&config.classifier_path, config.detector_settings())
        .context("load face detector")?;
    let model_exists = target.model_path().is_file();
    FacePipeline::new(target, detector, model_exists, config.pipeline_settings())
        .context("open face pipeline")
}

async fn add_images(config: &Config, name: &str) -> Result<()> {
    println!("Adding new images for {name} from HAR captures");
    let target = Target::resolve(&config.targets_dir, name);

    let archive = HarArchive::import(&target, &config.har_source_dir).context("import HAR captures")?;
    let urls = archive
        .media_urls(&config.media_type)
        .context("extract media URLs")?;
    println!(
        "Found {} .{} URLs in {} HAR files",
        urls.len(),
        config.media_type,
        archive.files().len()
    );

    let fetcher = Fetcher::new(&config.fetch_settings())?;
    let images = fetcher.fetch_all(&urls).await.context("download images")?;

    let mut pipeline = open_pipeline(config, target)?;
    let summary = pipeline.save_all(&images).context("save faces")?;

    println!(
        "Target images added for {name}: {} faces saved ({} downloads missing, {} not images).",
        summary.faces_saved, summary.missing, summary.undecodable
    );
    println!(
        "Please double check that all faces in {} are in fact your target.",
        pipeline.target().dir().display()
    );
    Ok(())
}

fn train(config: &Config, name: &str) -> Result<()> {
    println!("Training on {name}");
    let target = Target::resolve(&config.targets_dir, name);
    let mut pipeline = open_pipeline(config, target)?;

    let samples = pipeline.train().context("train recognizer")?;
    println!(
        "Trained on {samples} faces; model written to {}",
        pipeline.target().model_path().display()
    );
    Ok(())
}

async fn scan_for(
    config: &Config,
    name: &str,
    url: &str,
    output: Option<PathBuf>,
    no_window: bool,
) -> Result<()> {
    println!("Scanning picture for {name}");
    let target = Target::resolve(&config.targets_dir, name);
    let mut pipeline = open_pipeline(config, target)?;
    if !pipeline.has_model() {
        bail!(
            "no trained model at {} — run `facetrace train {name}` first",
            pipeline.target().model_path().display()
        );
    }

    let fetcher = Fetcher::new(&config.fetch_settings())?;
    let data = fetcher
        .fetch_one(url)
        .await?
        .with_context(|| format!("timed out downloading {url}"))?;

    let report = pipeline.scan(&data).context("scan image")?;
    for face in &report.faces {
        println!(
            "{} at ({}, {}) {}x{}: distance {:.2}, confidence {}%",
            face.label,
            face.region.x,
            face.region.y,
            face.region.width,
            face.region.height,
            face.prediction.distance,
            face.prediction.confidence_pct()
        );
    }
    if report.faces.is_empty() {
        println!("No faces found");
    } else if report.found_target() {
        println!("{name} found");
    } else {
        println!("{name} not found");
    }

    let font = load_font(&config.font_path);
    let annotated = annotate(&report, font.as_ref());

    if let Some(path) = output {
        annotated
            .save(&path)
            .with_context(|| format!("write annotated image {}", path.display()))?;
        println!("Annotated image written to {}", path.display());
    }
    if !no_window {
        display::show("facetrace", &annotated)?;
    }
    Ok(())
}
