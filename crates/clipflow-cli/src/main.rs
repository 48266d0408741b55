//! ClipFlow terminal client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clipflow_models::TimeWindow;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "clipflow")]
#[command(version, about = "Start and follow remote clip processing sessions")]
pub struct Cli {
    /// API base address
    #[arg(long, global = true, env = "CLIPFLOW_API_URL")]
    pub api_url: Option<String>,

    /// File remembering the current session, saved results and logs
    #[arg(
        long,
        global = true,
        env = "CLIPFLOW_STATE_FILE",
        default_value = ".clipflow/state.json"
    )]
    pub state_file: PathBuf,

    /// Keep state in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a processing job and follow it until it finishes
    Run {
        /// Channel name, or VOD URL with --vod
        source: String,

        /// Treat the source as a VOD URL
        #[arg(long)]
        vod: bool,

        /// Clip look-back window (day, week, month, all)
        #[arg(long, default_value = "week")]
        time_window: TimeWindow,

        #[arg(long, default_value = "5")]
        max_clips: u32,

        /// Segment length in seconds (VOD mode)
        #[arg(long, default_value = "30")]
        segment_duration: u32,

        /// Burn subtitles into the clips
        #[arg(long)]
        subtitles: bool,

        /// Skip source clips below this view count
        #[arg(long, default_value = "0")]
        min_views: u64,

        /// Download the session archive here when the job completes
        #[arg(long)]
        download: Option<PathBuf>,
    },
    /// Reattach to the remembered session
    Resume {
        /// Download the session archive here when the job completes
        #[arg(long)]
        download: Option<PathBuf>,
    },
    /// Show the server-side status of a session (default: the remembered one)
    Status { session_id: Option<String> },
    /// Cancel the remembered session's job
    Cancel,
    /// Download one file of a session
    Download {
        session_id: String,
        filename: String,
        /// Destination path (default: the file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Download the zip archive of a session
    Archive {
        session_id: String,
        /// Destination path (default: clips_<session>.zip)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List sessions held by the server
    Sessions,
    /// Delete a session and its files on the server
    Cleanup { session_id: String },
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if let Ok(directive) = "clipflow=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match commands::dispatch(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}
