// SPDX-License-Identifier: GPL-3.0-only

use chromakey_camera::config::HostRequest;
use chromakey_camera::constants::app_info;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "chromakey-camera")]
#[command(about = "Chroma key camera: composite the live camera over a photo or video")]
#[command(version = app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Raw host request as JSON, e.g. '{"mode":"photo","backgroundPhoto":"bg.jpg"}'
    #[arg(long)]
    request: Option<String>,

    /// Use a synthetic green-screen camera instead of a real device
    #[arg(long, global = true)]
    test_pattern: bool,

    /// Directory for the session photo and movie (default: from settings)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture one composite photo
    Photo {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Record the composite to a video
    Video {
        #[command(flatten)]
        key: KeyArgs,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Restart the background video before recording
        #[arg(long)]
        rewind: bool,
    },

    /// Tune threshold and smoothing interactively
    ///
    /// Reads `threshold <v>`, `smoothing <v>` and `done` from stdin.
    Calibrate {
        #[command(flatten)]
        key: KeyArgs,
    },
}

/// Background and key settings shared by every mode
#[derive(Args)]
struct KeyArgs {
    /// Background still image
    #[arg(long)]
    background_photo: Option<String>,

    /// Background video, played in a loop
    #[arg(long)]
    background_video: Option<String>,

    /// Which background to use: photo or video
    #[arg(long)]
    background_mode: Option<String>,

    /// Key color: red, green, blue or #rrggbb
    #[arg(short, long)]
    color: Option<String>,

    #[arg(short, long)]
    threshold: Option<f32>,

    #[arg(short, long)]
    smoothing: Option<f32>,
}

impl KeyArgs {
    fn into_request(self, mode: &str) -> HostRequest {
        // A lone --background-video implies video mode
        let background_mode = self.background_mode.or_else(|| {
            (self.background_photo.is_none() && self.background_video.is_some())
                .then(|| "video".to_string())
        });
        HostRequest {
            mode: Some(mode.to_string()),
            background_mode,
            background_photo: self.background_photo,
            background_video: self.background_video,
            color: self.color,
            threshold: self.threshold,
            smoothing: self.smoothing,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=chromakey_camera=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let mut options = cli::RunOptions {
        test_pattern: cli.test_pattern,
        output: cli.output,
        ..Default::default()
    };

    let request = match (cli.request, cli.command) {
        (Some(json), _) => {
            options.print_json = true;
            HostRequest::from_json(&json)?
        }
        (None, Some(Commands::Photo { key })) => key.into_request("photo"),
        (None, Some(Commands::Video {
            key,
            duration,
            rewind,
        })) => {
            options.duration = std::time::Duration::from_secs(duration);
            options.rewind = rewind;
            key.into_request("video")
        }
        (None, Some(Commands::Calibrate { key })) => key.into_request("calibrate"),
        (None, None) => {
            eprintln!("Nothing to do: pass a subcommand or --request (see --help)");
            return Ok(());
        }
    };

    cli::run(request, options)
}
