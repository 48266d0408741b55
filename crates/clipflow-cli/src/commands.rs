//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clipflow_client::{
    ArtifactDownloader, ClientConfig, DownloadProgress, SessionApi, SessionClient,
};
use clipflow_models::{PipelineParams, ProcessingSession, SessionId, SessionStatus};
use clipflow_session::{ResultBatch, SessionConfig, SessionOrchestrator};
use clipflow_store::{FileStore, KeyValueStore, MemoryStore, SessionStore};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::{Cli, Commands};

struct App {
    config: ClientConfig,
    client: Arc<SessionClient>,
    kv: Arc<dyn KeyValueStore>,
    json: bool,
}

/// Run a command. `Ok(false)` means it finished but the session failed.
pub async fn dispatch(cli: Cli) -> Result<bool> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }

    let client = Arc::new(SessionClient::new(config.clone()).context("Invalid API configuration")?);
    let kv: Arc<dyn KeyValueStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::open(&cli.state_file).await)
    };

    let app = App {
        config,
        client,
        kv,
        json: cli.json,
    };

    match cli.command {
        Commands::Run {
            source,
            vod,
            time_window,
            max_clips,
            segment_duration,
            subtitles,
            min_views,
            download,
        } => {
            let params = PipelineParams {
                source,
                time_window,
                vod,
                max_clips,
                segment_duration,
                include_subtitles: subtitles,
                min_views,
            };
            run(&app, params, download).await
        }
        Commands::Resume { download } => resume(&app, download).await,
        Commands::Status { session_id } => status(&app, session_id).await,
        Commands::Cancel => cancel(&app).await,
        Commands::Download {
            session_id,
            filename,
            output,
        } => {
            let dest = output.unwrap_or_else(|| PathBuf::from(&filename));
            download_file(&app, &SessionId::from(session_id), &filename, &dest).await
        }
        Commands::Archive { session_id, output } => {
            let session_id = SessionId::from(session_id);
            let dest = output.unwrap_or_else(|| archive_name(&session_id));
            download_archive(&app, &session_id, &dest).await
        }
        Commands::Sessions => sessions(&app).await,
        Commands::Cleanup { session_id } => cleanup(&app, &SessionId::from(session_id)).await,
    }
}

fn orchestrator(app: &App) -> Result<SessionOrchestrator> {
    let downloader = ArtifactDownloader::new(&app.config)?;
    let api: Arc<dyn SessionApi> = app.client.clone();

    Ok(
        SessionOrchestrator::new(api, Arc::clone(&app.kv), SessionConfig::from_env())
            .with_downloader(downloader),
    )
}

async fn run(app: &App, params: PipelineParams, download: Option<PathBuf>) -> Result<bool> {
    let orchestrator = orchestrator(app)?;
    let states = orchestrator.subscribe_state();
    let batches = orchestrator.subscribe_results();

    info!(source = %params.source, "Starting pipeline");
    if !orchestrator.start_pipeline(params).await {
        let session = orchestrator.current_session().await;
        if let Some(session) = &session {
            print_state(app, session);
        }
        return Ok(false);
    }

    follow(app, &orchestrator, states, batches, download).await
}

async fn resume(app: &App, download: Option<PathBuf>) -> Result<bool> {
    let orchestrator = orchestrator(app)?;
    let states = orchestrator.subscribe_state();
    let batches = orchestrator.subscribe_results();

    if !orchestrator.initialize().await {
        bail!("No session to resume");
    }

    follow(app, &orchestrator, states, batches, download).await
}

/// Print events until the session is no longer running.
async fn follow(
    app: &App,
    orchestrator: &SessionOrchestrator,
    mut states: broadcast::Receiver<ProcessingSession>,
    mut batches: broadcast::Receiver<ResultBatch>,
    download: Option<PathBuf>,
) -> Result<bool> {
    let mut last = None;

    loop {
        tokio::select! {
            state = states.recv() => match state {
                Ok(session) => {
                    print_state(app, &session);
                    let done = !session.status.is_active();
                    last = Some(session);
                    if done {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} state updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            batch = batches.recv() => match batch {
                Ok(batch) => print_batch(app, orchestrator, &batch),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} result batches", n);
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Interrupted; the job keeps running on the server. Use `clipflow resume` to reattach.");
                orchestrator.shutdown().await;
                return Ok(false);
            }
        }
    }

    // Drain batches published together with the final state.
    while let Ok(batch) = batches.try_recv() {
        print_batch(app, orchestrator, &batch);
    }

    let Some(session) = last else {
        return Ok(false);
    };

    if session.status == SessionStatus::Completed {
        if let Some(dir) = download {
            let dest = dir.join(archive_name(&session.session_id));
            download_archive(app, &session.session_id, &dest).await?;
        }
    }

    Ok(session.status != SessionStatus::Error)
}

async fn status(app: &App, session_id: Option<String>) -> Result<bool> {
    let session_id = match session_id {
        Some(id) => SessionId::from(id),
        None => SessionStore::new(Arc::clone(&app.kv))
            .current()
            .await?
            .context("No remembered session; pass a session id")?,
    };

    let response = app.client.session_status(&session_id).await?;
    if app.json {
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!(
            "{}  {}  {}%  {}",
            session_id,
            response.status,
            response.progress_percent(),
            response.current_step.as_deref().unwrap_or_default()
        );
        if let Some(error) = &response.error {
            println!("  error: {}", error);
        }
        for clip in response.results(&session_id) {
            println!("  {}", app.client.urls().video(&clip));
        }
    }

    Ok(true)
}

async fn cancel(app: &App) -> Result<bool> {
    let orchestrator = orchestrator(app)?;
    if !orchestrator.initialize().await {
        bail!("No active session to cancel");
    }

    let cancelled = orchestrator.cancel_processing().await;
    if cancelled {
        println!("Cancelled");
    } else {
        eprintln!("The server did not accept the cancellation");
    }
    Ok(cancelled)
}

async fn download_file(
    app: &App,
    session_id: &SessionId,
    filename: &str,
    dest: &Path,
) -> Result<bool> {
    let downloader = ArtifactDownloader::new(&app.config)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(rx));

    let result = downloader
        .download_artifact(session_id, filename, dest, Some(&tx))
        .await;
    drop(tx);
    reporter.await.ok();

    let bytes = result.with_context(|| format!("Failed to download {}", filename))?;
    println!("Saved {} ({} bytes)", dest.display(), bytes);
    Ok(true)
}

async fn download_archive(app: &App, session_id: &SessionId, dest: &Path) -> Result<bool> {
    let downloader = ArtifactDownloader::new(&app.config)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(rx));

    let result = downloader.download_archive(session_id, dest, Some(&tx)).await;
    drop(tx);
    reporter.await.ok();

    let bytes = result.with_context(|| format!("Failed to download archive of {}", session_id))?;
    println!("Saved {} ({} bytes)", dest.display(), bytes);
    Ok(true)
}

async fn report_progress(mut rx: mpsc::UnboundedReceiver<DownloadProgress>) {
    let mut last_percent = None;

    while let Some(progress) = rx.recv().await {
        match progress {
            DownloadProgress::Fraction(fraction) => {
                let percent = (fraction * 100.0).floor() as u32;
                if last_percent != Some(percent) && percent % 10 == 0 {
                    eprintln!("  {}%", percent);
                    last_percent = Some(percent);
                }
            }
            DownloadProgress::Complete { bytes } => {
                info!(bytes, "Download complete");
            }
        }
    }
}

async fn sessions(app: &App) -> Result<bool> {
    let sessions = app.client.list_sessions().await?;

    if app.json {
        println!("{}", serde_json::to_string(&sessions)?);
    } else if sessions.is_empty() {
        println!("No sessions");
    } else {
        for session in sessions {
            println!(
                "{}  {}  {} result(s)",
                session.session_id, session.status, session.results_count
            );
        }
    }

    Ok(true)
}

async fn cleanup(app: &App, session_id: &SessionId) -> Result<bool> {
    let orchestrator = orchestrator(app)?;
    orchestrator.cleanup_session(session_id).await?;
    println!("Cleaned up {}", session_id);
    Ok(true)
}

fn archive_name(session_id: &SessionId) -> PathBuf {
    PathBuf::from(format!("clips_{}.zip", session_id))
}

fn print_state(app: &App, session: &ProcessingSession) {
    if app.json {
        match serde_json::to_string(session) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to encode state: {}", e),
        }
        return;
    }

    match &session.error {
        Some(error) => println!("[{}] {}: {}", session.session_id, session.status, error),
        None => println!(
            "[{}] {} {:>3}%  {}",
            session.session_id, session.status, session.progress, session.current_step
        ),
    }
}

fn print_batch(app: &App, orchestrator: &SessionOrchestrator, batch: &ResultBatch) {
    for clip in &batch.results {
        if app.json {
            match serde_json::to_string(clip) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to encode result: {}", e),
            }
            continue;
        }

        let url = orchestrator
            .downloader()
            .map(|d| d.urls().video(clip))
            .unwrap_or_else(|| clip.video.clone());
        println!("  + {}", url);
        if !clip.description.is_empty() {
            println!("    {}", clip.description);
        }
        if !clip.hashtags.is_empty() {
            println!("    {}", clip.hashtags.join(" "));
        }
    }
}
