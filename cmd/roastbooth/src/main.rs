//! roastbooth - identify a face, roast the person, speak the roast.

mod config;
mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use roastbooth_facematch::{EmbeddingMatcher, HttpFaceEmbedder, IdentificationPolicy};
use roastbooth_gallery::{GalleryStore, PersonId};
use roastbooth_pipeline::{Outcome, Pipeline};
use roastbooth_roast::{ChatCompletionGenerator, ElevenLabsSynthesizer};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Roast booth: face identification, roast generation and speech.
#[derive(Parser)]
#[command(name = "roastbooth")]
#[command(about = "Identify a face, generate a roast, stream it as speech")]
#[command(version)]
struct Cli {
    /// Config file (default is ~/.roastbooth/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gallery database path (overrides data_path)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Listen address (e.g. :8080)
        #[arg(long)]
        listen: Option<String>,

        /// Static files directory for the front end
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Enroll a person with one or more reference photos
    Enroll {
        name: String,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Add an annotation to an enrolled person
    Annotate { person_id: PersonId, text: String },
    /// List enrolled people and their annotations
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one image through the pipeline
    Identify {
        image: PathBuf,

        /// Output audio file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        cfg.data_path = data;
    }

    match cli.command {
        Commands::Serve { listen, static_dir } => {
            if let Some(listen) = listen {
                cfg.listen = listen;
            }
            if static_dir.is_some() {
                cfg.static_dir = static_dir;
            }
            serve(cfg).await
        }
        Commands::Enroll { name, images } => enroll(&cfg, &name, &images),
        Commands::Annotate { person_id, text } => {
            open_gallery(&cfg)?.add_annotation(person_id, &text)?;
            println!("Added annotation to person {person_id}");
            Ok(())
        }
        Commands::List { json } => list(&cfg, json),
        Commands::Identify { image, output } => identify(&cfg, &image, output.as_deref()).await,
    }
}

fn open_gallery(cfg: &Config) -> Result<Arc<GalleryStore>> {
    if let Some(parent) = cfg.data_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    let store = GalleryStore::open(&cfg.data_path)
        .with_context(|| format!("open gallery {}", cfg.data_path.display()))?;
    Ok(Arc::new(store))
}

fn build_pipeline(cfg: &Config, gallery: Arc<GalleryStore>) -> Result<Pipeline> {
    cfg.validate_providers()?;

    let embedder = HttpFaceEmbedder::new(cfg.embedder_config())?;
    let matcher = EmbeddingMatcher::new(gallery.clone(), Arc::new(embedder), cfg.matcher_config());
    let generator = ChatCompletionGenerator::new(cfg.generator_config())?;
    let synthesizer = ElevenLabsSynthesizer::new(cfg.speech_config())?;

    Ok(Pipeline::new(
        gallery,
        Arc::new(matcher),
        IdentificationPolicy::new(cfg.matching.threshold),
        Arc::new(generator),
        Arc::new(synthesizer),
    ))
}

async fn serve(cfg: Config) -> Result<()> {
    let gallery = open_gallery(&cfg)?;
    let pipeline = Arc::new(build_pipeline(&cfg, gallery)?);

    let warm = pipeline.matcher().clone();
    tokio::spawn(async move {
        match warm.warm_up().await {
            Ok(usable) => info!(usable, model = warm.embedder_model(), "reference embeddings ready"),
            Err(e) => warn!(error = %e, "reference warm-up failed"),
        }
    });

    let app = server::router(pipeline, cfg.static_dir.clone());
    server::serve(&cfg.listen, app).await
}

fn enroll(cfg: &Config, name: &str, images: &[PathBuf]) -> Result<()> {
    let photos = images
        .iter()
        .map(|p| std::fs::read(p).with_context(|| format!("read {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let id = open_gallery(cfg)?.enroll(name, &photos)?;
    println!("Enrolled {name} as person {id} with {} photo(s)", photos.len());
    Ok(())
}

fn list(cfg: &Config, json: bool) -> Result<()> {
    let people = open_gallery(cfg)?.people_with_annotations()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&people)?);
        return Ok(());
    }
    if people.is_empty() {
        println!("No people enrolled");
    }
    for p in people {
        println!("{:>4}  {}", p.id, p.name);
        for a in p.annotations {
            println!("        - {a}");
        }
    }
    Ok(())
}

async fn identify(cfg: &Config, image: &Path, output: Option<&Path>) -> Result<()> {
    let probe = std::fs::read(image).with_context(|| format!("read {}", image.display()))?;
    let pipeline = build_pipeline(cfg, open_gallery(cfg)?)?;

    let run = pipeline.run(probe.into()).await;
    let (person, text, mut stream) = match run.outcome {
        Outcome::Audio {
            person,
            text,
            stream,
            ..
        } => (person, text, stream),
        other => {
            let report = other
                .report()
                .context("pipeline returned neither audio nor a report")?;
            anyhow::bail!("{}: {}", report.outcome, report.message);
        }
    };
    eprintln!("Identified {} (id {})", person.name, person.id);
    eprintln!("{text}");

    let mut out: Box<dyn tokio::io::AsyncWrite + Unpin> = match output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len();
        out.write_all(&chunk).await?;
    }
    out.flush().await?;
    info!(bytes = written, stages = ?run.tracker.history(), "identify: done");
    Ok(())
}
