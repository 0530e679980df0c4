//! Tubefetch - YouTube downloader
//!
//! Resolves a video with yt-dlp, lets the caller pick a quality and merges separate
//! video and audio tracks with ffmpeg when needed.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tubefetch::downloader::MergeStrategy;
use tubefetch::extractor::StreamDescriptor;
use tubefetch::utils::AppSettings;
use tubefetch::workflow::{DownloadMode, QualityChoice, Workflow, WorkflowEvent};

#[derive(Parser)]
#[command(name = "tubefetch", version, about = "Download YouTube videos at the quality you pick")]
struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory receiving finished files
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the title, available streams and download modes
    Info { url: String },

    /// Download a video
    Get {
        url: String,

        /// Download mode (defaults to the best available)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Video-only stream id for manual mode
        #[arg(long)]
        video: Option<String>,

        /// Audio-only stream id for manual mode
        #[arg(long)]
        audio: Option<String>,

        /// Combined stream id for progressive mode
        #[arg(long)]
        stream: Option<String>,

        /// Re-encode to H.264/AAC instead of copying streams
        #[arg(long)]
        transcode: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Auto,
    Manual,
    Progressive,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut settings = AppSettings::load_or_default(args.config.as_deref())?;
    if let Some(output) = args.output {
        settings.download_location = output;
    }

    match args.command {
        Command::Info { url } => show_info(settings, &url).await,
        Command::Get {
            url,
            mode,
            video,
            audio,
            stream,
            transcode,
        } => {
            if transcode {
                settings.merge_strategy = MergeStrategy::Transcode;
            }
            download(settings, &url, mode, video, audio, stream).await
        }
    }
}

async fn show_info(settings: AppSettings, url: &str) -> Result<()> {
    let mut workflow = Workflow::from_settings(settings)?;
    workflow.submit_url(url).await?;

    let state = workflow.state();
    println!("Title: {}", state.title().unwrap_or_default());
    if let Some(catalog) = state.catalog() {
        print_bucket("Progressive", &catalog.progressive);
        print_bucket("Video only", &catalog.video_only);
        print_bucket("Audio only", &catalog.audio_only);
    }

    let modes = workflow.available_modes();
    println!("\nAvailable modes:");
    for mode in &modes {
        let marker = if Some(*mode) == workflow.default_mode() {
            " (default)"
        } else {
            ""
        };
        println!("  {:<12} {}{}", mode.to_string(), mode.label(), marker);
    }
    if !workflow.merge_available() {
        println!("\nffmpeg not found: merged modes need ffmpeg on PATH.");
    }
    Ok(())
}

fn print_bucket(name: &str, streams: &[StreamDescriptor]) {
    println!("\n{} ({}):", name, streams.len());
    for stream in streams {
        println!("  {:>6}  {}", stream.id, stream.display_label());
    }
}

async fn download(
    settings: AppSettings,
    url: &str,
    mode: Option<ModeArg>,
    video: Option<String>,
    audio: Option<String>,
    stream: Option<String>,
) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<WorkflowEvent>();
    let mut workflow = Workflow::from_settings(settings)?.with_events(events_tx);

    // Spawn progress reporter
    let reporter = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                WorkflowEvent::PhaseChanged(phase) => println!("== {:?}", phase),
                WorkflowEvent::Progress(snapshot) => println!("{}", snapshot.summary()),
                WorkflowEvent::CleanupFailed { path, reason } => {
                    eprintln!("Could not clean up {}: {}", path.display(), reason)
                }
                WorkflowEvent::Failed(message) => eprintln!("Error: {}", message),
            }
        }
    });

    let result = run_download(&mut workflow, url, mode, video, audio, stream).await;

    // Closing the channel lets the reporter drain and exit.
    drop(workflow);
    let _ = reporter.await;

    let artifact = result?;
    println!(
        "Saved {} ({:.1} MB)",
        artifact.path.display(),
        artifact.size_bytes as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

async fn run_download(
    workflow: &mut Workflow,
    url: &str,
    mode: Option<ModeArg>,
    video: Option<String>,
    audio: Option<String>,
    stream: Option<String>,
) -> Result<tubefetch::Artifact> {
    check_stream_flags(mode, video.is_some() || audio.is_some(), stream.is_some())?;
    let catalog = workflow.submit_url(url).await?.clone();

    let mode = match mode {
        Some(ModeArg::Auto) => DownloadMode::DashAuto,
        Some(ModeArg::Manual) => DownloadMode::DashManual,
        Some(ModeArg::Progressive) => DownloadMode::Progressive,
        None if stream.is_some() => DownloadMode::Progressive,
        None if video.is_some() || audio.is_some() => DownloadMode::DashManual,
        None => workflow
            .default_mode()
            .ok_or_else(|| anyhow!("No downloadable options for this video"))?,
    };

    let choice = match mode {
        DownloadMode::DashAuto => QualityChoice::Auto,
        DownloadMode::DashManual => match (video, audio) {
            (Some(video_id), Some(audio_id)) => QualityChoice::Manual { video_id, audio_id },
            _ => return Err(anyhow!("Manual mode needs both --video and --audio")),
        },
        DownloadMode::Progressive => {
            let stream_id = match stream {
                Some(id) => id,
                None => catalog
                    .progressive
                    .first()
                    .map(|s| s.id.clone())
                    .ok_or_else(|| anyhow!("No progressive stream available"))?,
            };
            QualityChoice::Progressive { stream_id }
        }
    };

    workflow.choose(choice)?;
    Ok(workflow.download().await?)
}

/// Reject stream ids that the requested mode would ignore
fn check_stream_flags(mode: Option<ModeArg>, adaptive_ids: bool, stream_id: bool) -> Result<()> {
    match mode {
        Some(ModeArg::Auto) if adaptive_ids || stream_id => Err(anyhow!(
            "--mode auto picks streams itself; drop --video, --audio and --stream"
        )),
        Some(ModeArg::Manual) if stream_id => {
            Err(anyhow!("--stream applies to progressive mode, not manual"))
        }
        Some(ModeArg::Progressive) if adaptive_ids => Err(anyhow!(
            "--video and --audio apply to manual mode, not progressive"
        )),
        None if adaptive_ids && stream_id => Err(anyhow!(
            "--stream cannot be combined with --video or --audio"
        )),
        _ => Ok(()),
    }
}
