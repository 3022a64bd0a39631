use annotation::{run_evaluation, run_labelling, AnnotateError, AnnotationEvent, DisplaySink, NullDisplay};
use clap::{Parser, Subcommand};
use cli::{spawn_event_feed, DirectorySink, FileDisplay, ProjectConfig, SceneDirectory, ScoreFileClassifier};
use color_eyre::eyre::{eyre, Result};
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tracing::{debug, info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label scenes interactively, reading annotator events as JSON lines
    Label {
        /// Path to the project configuration (.toml or .json)
        #[arg(short, long)]
        config: PathBuf,
        /// JSON-lines event script (defaults to stdin)
        #[arg(short, long)]
        events: Option<PathBuf>,
        /// Image file kept up to date with the label visualization
        #[arg(short, long)]
        preview: Option<PathBuf>,
    },
    /// Classify scenes from precomputed class scores and write cleaned masks
    Evaluate {
        /// Path to the project configuration (.toml or .json)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the JSON schema of the project configuration
    Schema {
        /// Print the annotator event schema instead
        #[arg(long)]
        events: bool,
    },
    /// Write a project configuration with default settings
    InitConfig {
        /// Where to write the configuration (.toml or .json)
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = "scenes")]
        scenes_dir: String,
        #[arg(long, default_value = "labels")]
        output_dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Label { config, events, preview } => {
            label(config, events.as_deref(), preview.clone()).await?;
        }
        Commands::Evaluate { config } => {
            evaluate(config).await?;
        }
        Commands::Schema { events } => {
            let schema = if *events {
                serde_json::to_string_pretty(&AnnotationEvent::schema())?
            } else {
                serde_json::to_string_pretty(&ProjectConfig::schema())?
            };
            println!("{schema}");
        }
        Commands::InitConfig { output, scenes_dir, output_dir } => {
            ProjectConfig::new(scenes_dir.as_str(), output_dir.as_str()).to_file(output)?;
            info!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

async fn label(config_path: &Path, events: Option<&Path>, preview: Option<PathBuf>) -> Result<()> {
    let config = ProjectConfig::from_file(config_path)?;
    let scenes = SceneDirectory::open(&config.scenes_dir)?;
    info!(
        "Labelling {} scenes of {} into {}",
        scenes.manifest().scenes.len(),
        scenes.manifest().site_id,
        config.output_dir
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let feed = match events {
        Some(path) => spawn_event_feed(BufReader::new(tokio::fs::File::open(path).await?), tx),
        None => spawn_event_feed(BufReader::new(tokio::io::stdin()), tx),
    };

    let settings = config.labelling.clone();
    let mut sink = DirectorySink::new(&config.output_dir);
    let session = tokio::task::spawn_blocking(move || {
        let mut display: Box<dyn DisplaySink + Send> = match preview {
            Some(path) => Box::new(FileDisplay::new(path)),
            None => Box::new(NullDisplay),
        };
        let result = run_labelling(scenes.scenes(), &settings, &mut rx, display.as_mut(), &mut sink);
        (result, sink)
    });
    let (result, mut sink) = session.await?;

    if !feed.is_finished() {
        feed.abort();
    }
    match feed.await {
        Ok(Ok(forwarded)) => debug!("Event feed forwarded {} events", forwarded),
        Ok(Err(err)) => warn!("Event feed failed: {}", err),
        Err(err) if err.is_cancelled() => {}
        Err(err) => warn!("Event feed task failed: {}", err),
    }

    match result {
        Ok(mut summary) => {
            if !summary.unsaved.is_empty() && summary.retry_unsaved(&mut sink).is_err() {
                let pending: Vec<&str> = summary.unsaved.iter().map(|r| r.image_id.as_str()).collect();
                return Err(eyre!(
                    "labels for {} could not be written to {}",
                    pending.join(", "),
                    config.output_dir
                ));
            }
            info!(
                "✅ Labelled {} of {} scenes ({} too cloudy, {} skipped)",
                summary.saved, summary.processed, summary.skipped_cloud, summary.skipped_user
            );
            Ok(())
        }
        Err(AnnotateError::SessionAborted) => {
            warn!("Labelling aborted; the current image was not saved");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn evaluate(config_path: &Path) -> Result<()> {
    let config = ProjectConfig::from_file(config_path)?;
    let directory = SceneDirectory::open(&config.scenes_dir)?;
    let scores_dir = config
        .scores_dir
        .clone()
        .ok_or_else(|| eyre!("'scores_dir' must be set to evaluate"))?;

    tokio::task::spawn_blocking(move || -> Result<()> {
        let classes = &config.labelling.classes;
        let classifier = ScoreFileClassifier::new(scores_dir, classes.clone(), config.score_threshold);
        let mut sink = DirectorySink::new(&config.output_dir);

        for satellite in directory.satellites() {
            let min_area = config.min_area_pixels_for(&satellite)?;
            info!("Evaluating {} scenes (min area {} px)", satellite, min_area);

            let subset = directory.for_satellite(&satellite);
            let summary = run_evaluation(
                subset.scenes(),
                &classifier,
                &config.evaluation,
                classes,
                min_area,
                &mut sink,
            )?;
            info!(
                "✅ {}: classified {} of {} scenes",
                satellite, summary.saved, summary.processed
            );
        }
        Ok(())
    })
    .await?
}
