use anyhow::Result;
use clap::{Parser, Subcommand};
use lookout_core::{FaceEngine, Gallery};
use lookout_stream::Transport;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod identify;
mod shutdown;
mod watch;

use config::Config;

#[derive(Parser)]
#[command(name = "lookout", about = "Live face recognition on RTSP camera streams")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Directory of <name>/<image> folders with known faces
    #[arg(long, global = true)]
    known_faces: Option<PathBuf>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    models: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize faces on a live stream (default)
    Watch {
        /// Stream URL (overrides RTSP_URL)
        #[arg(long)]
        url: Option<String>,
        /// RTSP transport: udp or tcp
        #[arg(long)]
        transport: Option<Transport>,
        /// Log recognitions instead of opening a window
        #[arg(long)]
        headless: bool,
    },
    /// Encode the known faces and list who is enrolled
    Gallery {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Recognize faces in a still image
    Identify {
        /// Image to analyse
        image: PathBuf,
        /// Write the annotated image here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.known_faces {
        config.known_faces_dir = dir;
    }
    if let Some(dir) = cli.models {
        config.model_dir = dir;
    }

    let command = cli.command.unwrap_or(Commands::Watch {
        url: None,
        transport: None,
        headless: false,
    });

    match command {
        Commands::Watch {
            url,
            transport,
            headless,
        } => {
            if url.is_some() {
                config.rtsp_url = url;
            }
            if let Some(transport) = transport {
                config.rtsp_transport = transport;
            }
            config.headless |= headless;
            config.validate()?;
            watch::run(&config)
        }
        Commands::Gallery { json } => {
            config.validate()?;
            print_gallery(&config, json)
        }
        Commands::Identify {
            image,
            output,
            json,
        } => {
            config.validate()?;
            identify::run(&config, &image, output.as_deref(), json)
        }
    }
}

fn print_gallery(config: &Config, json: bool) -> Result<()> {
    let mut faces = FaceEngine::load(&config.model_dir, config.detector_options())?;
    let (gallery, report) = Gallery::load(&config.known_faces_dir, &mut faces)?;

    if json {
        let people: Vec<_> = gallery
            .counts()
            .into_iter()
            .map(|(name, samples)| serde_json::json!({ "name": name, "samples": samples }))
            .collect();
        let skipped: Vec<_> = report
            .skipped
            .iter()
            .map(|s| serde_json::json!({ "path": s.sample.path, "reason": s.reason }))
            .collect();
        let doc = serde_json::json!({ "people": people, "skipped": skipped });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if gallery.is_empty() {
        println!("No known faces in {}", config.known_faces_dir.display());
    }
    for (name, samples) in gallery.counts() {
        println!("{name}\t{samples} sample(s)");
    }
    for skipped in &report.skipped {
        println!("skipped\t{}\t{}", skipped.sample.path.display(), skipped.reason);
    }
    Ok(())
}
