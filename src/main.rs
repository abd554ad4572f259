// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use fxcam::backends::camera::SourceKind;
use fxcam::config::Config;
use fxcam::filters::FilterKind;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "fxcam")]
#[command(about = "Live camera preview with real-time comic filtering")]
#[command(version = fxcam::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every command that opens a pipeline
#[derive(Args, Clone)]
struct PipelineArgs {
    /// Frame source: test, pipewire[:node] or /dev/videoN
    #[arg(short, long, value_parser = cli::parse_source)]
    source: Option<SourceKind>,

    /// Filter applied to each frame: comic, mono or none
    #[arg(short, long)]
    filter: Option<FilterKind>,

    /// Render on the CPU instead of the GPU
    #[arg(long)]
    software: bool,

    /// Read settings from this file instead of the user config
    #[arg(long)]
    config: Option<PathBuf>,
}

impl PipelineArgs {
    fn resolve(&self) -> Config {
        let mut config = match &self.config {
            Some(path) => Config::load_or_default(path),
            None => Config::load(),
        };
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(filter) = self.filter {
            config.filter = filter;
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run in terminal mode (renders the filtered preview to the terminal)
    Terminal {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Run without a view and print frame statistics
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Stop after this many presented frames
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Save a presented frame as PNG
    Snapshot {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Output file path (default: ~/Pictures/fxcam/snapshot_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of frames to present before saving
        #[arg(short = 'n', long, default_value = "5")]
        frames: u64,
    },

    /// Show the effective configuration
    Config {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Write it to the user config file
        #[arg(short, long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=fxcam=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Terminal { pipeline }) => {
            fxcam::terminal::run(&pipeline.resolve(), pipeline.software)
        }
        Some(Commands::Run {
            pipeline,
            frames,
            duration,
        }) => cli::run_headless(&pipeline.resolve(), frames, duration, pipeline.software),
        Some(Commands::Snapshot {
            pipeline,
            output,
            frames,
        }) => cli::snapshot(&pipeline.resolve(), output, frames, pipeline.software),
        Some(Commands::Config { pipeline, write }) => cli::print_config(&pipeline.resolve(), write),
        None => fxcam::terminal::run(&Config::load(), false),
    }
}
