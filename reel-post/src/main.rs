//! reel-post - Publish a short video to YouTube Shorts and Instagram Reels

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use libreelcast::logging::LoggingConfig;
use libreelcast::platforms::youtube::VideoStatus;
use libreelcast::types::parse_platform_list;
use libreelcast::uploader::ConnectionCheck;
use libreelcast::{
    Config, Privacy, ReelcastError, UploadResult, ValidationReport, VideoMetadata, VideoSource,
    VideoUploader,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "reel-post")]
#[command(version, about = "Publish a short video to YouTube Shorts and Instagram Reels")]
#[command(long_about = r#"Publish one short vertical video to YouTube Shorts and Instagram Reels.

The video is checked against each platform's limits first. Platforms it
does not fit are reported as validation failures; the rest are uploaded
concurrently, retrying network errors and rate limits.

EXAMPLES:
    # Upload to both platforms
    reel-post --video-source short.mp4 --title "Match highlights" \
        --description "Best goals of the week" --tags football,highlights

    # Only YouTube, scheduled, with JSON output
    reel-post --video-source short.mp4 --title "Teaser" --platforms youtube \
        --privacy private --schedule-time 2026-11-01T18:00:00Z --format json

    # Check compatibility without uploading
    reel-post --video-source short.mp4 --title "Teaser" --check

    # Verify credentials for both platforms
    reel-post --test-connection

CONFIGURATION:
    ~/.config/reelcast/config.toml, or the file named by --config or
    REELCAST_CONFIG. Token files are JSON with access_token, refresh_token
    and expiry fields.

EXIT CODES:
    0 - Every platform succeeded
    1 - At least one platform failed, or a runtime error
    2 - Authentication error
    3 - Invalid input
"#)]
struct Cli {
    /// Video file to publish
    #[arg(long, value_name = "PATH", required_unless_present_any = ["test_connection", "youtube_status"])]
    video_source: Option<PathBuf>,

    /// Video title
    #[arg(long, required_unless_present_any = ["test_connection", "youtube_status"])]
    title: Option<String>,

    /// Video description
    #[arg(long, default_value = "")]
    description: String,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// public, unlisted or private
    #[arg(long, default_value = "public")]
    privacy: String,

    /// Caption for Instagram (defaults to title and description)
    #[arg(long)]
    instagram_caption: Option<String>,

    /// Publish time for platforms that support scheduling (RFC 3339)
    #[arg(long, value_name = "RFC3339")]
    schedule_time: Option<String>,

    /// Custom YouTube thumbnail (JPEG or PNG)
    #[arg(long, value_name = "PATH")]
    thumbnail: Option<PathBuf>,

    /// Comma-separated target platforms
    #[arg(long, default_value = "youtube,instagram")]
    platforms: String,

    /// Config file (overrides the default location)
    #[arg(long, env = "REELCAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overall deadline for the upload, e.g. "10m"
    #[arg(long, value_name = "DURATION")]
    timeout: Option<String>,

    /// Continue interrupted uploads from their checkpoints
    #[arg(long)]
    resume: bool,

    /// Only report platform compatibility, do not upload
    #[arg(long)]
    check: bool,

    /// Authenticate with each platform and report the account, do not upload
    #[arg(long, conflicts_with = "check")]
    test_connection: bool,

    /// Print processing and privacy state of an uploaded YouTube video
    #[arg(long, value_name = "VIDEO_ID", conflicts_with_all = ["check", "test_connection"])]
    youtube_status: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("warn").with_verbose(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<ReelcastError>()
                .map(ReelcastError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

fn invalid(message: String) -> anyhow::Error {
    ReelcastError::InvalidInput(message).into()
}

fn load_config(cli: &Cli) -> libreelcast::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from_path(path)?;
            config.apply_env_overrides()?;
            config.validate()?;
            config
        }
        None => Config::load()?,
    };
    if cli.resume {
        config.upload.resume_from_checkpoint = true;
    }
    Ok(config)
}

fn metadata(cli: &Cli) -> anyhow::Result<VideoMetadata> {
    let privacy: Privacy = cli.privacy.parse()?;
    let title = cli.title.as_deref().unwrap_or_default();
    let mut metadata = VideoMetadata::new(title, &cli.description)
        .with_tags(cli.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()))
        .with_privacy(privacy);

    if let Some(caption) = &cli.instagram_caption {
        metadata = metadata.with_instagram_caption(caption);
    }
    if let Some(raw) = &cli.schedule_time {
        let at = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| invalid(format!("Invalid --schedule-time '{}': {}", raw, e)))?;
        metadata = metadata.with_schedule(at.with_timezone(&Utc));
    }
    if let Some(path) = &cli.thumbnail {
        metadata = metadata.with_thumbnail(path);
    }
    Ok(metadata)
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let platforms = parse_platform_list(&cli.platforms)?;
    let deadline: Option<Duration> = cli
        .timeout
        .as_deref()
        .map(|raw| {
            humantime::parse_duration(raw)
                .map_err(|e| invalid(format!("Invalid --timeout '{}': {}", raw, e)))
        })
        .transpose()?;

    if cli.test_connection || cli.youtube_status.is_some() {
        let config = load_config(&cli).context("Failed to load configuration")?;
        let uploader = VideoUploader::from_config(config).await?;
        if let Some(video_id) = &cli.youtube_status {
            let status = uploader.youtube_video_status(video_id).await?;
            print_status(&status, &cli.format)?;
            return Ok(0);
        }
        let checks = uploader.test_connections(&platforms).await?;
        print_connections(&checks, &cli.format)?;
        return Ok(if checks.iter().all(ConnectionCheck::connected) { 0 } else { 2 });
    }

    let metadata = metadata(&cli)?;
    let video_source = cli
        .video_source
        .as_ref()
        .ok_or_else(|| invalid("--video-source is required".to_string()))?;
    let source = VideoSource::from_path(video_source)?;

    let config = load_config(&cli).context("Failed to load configuration")?;
    let uploader = VideoUploader::from_config(config).await?;

    if cli.check {
        let report = uploader
            .check_compatibility(source, metadata, &platforms)
            .await?;
        print_report(&report, &cli.format)?;
        return Ok(if report.all_failed() { 1 } else { 0 });
    }

    let cancel = CancellationToken::new();
    #[cfg(unix)]
    cancel_on_signal(cancel.clone())?;

    let result = uploader
        .upload_video_with_cancel(source, metadata, &platforms, deadline, cancel)
        .await?;

    print_result(&result, &cli.format)?;
    Ok(if result.all_succeeded() { 0 } else { 1 })
}

/// Cancel in-flight uploads on SIGINT or SIGTERM
#[cfg(unix)]
fn cancel_on_signal(cancel: CancellationToken) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, cancelling uploads");
            cancel.cancel();
        }
    });

    Ok(())
}

fn print_result(result: &UploadResult, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        let json = serde_json::to_string_pretty(result).context("Failed to serialize results")?;
        println!("{}", json);
        return Ok(());
    }

    for outcome in result.outcomes() {
        match (&outcome.video_url, &outcome.error) {
            (Some(url), _) => println!(
                "{}: {} ({:.1}s, {} attempt(s))",
                outcome.platform,
                url,
                outcome.elapsed.as_secs_f64(),
                outcome.attempts
            ),
            (None, Some(error)) => {
                println!("{}: failed [{}] {}", outcome.platform, error.kind, error.message)
            }
            (None, None) => println!("{}: failed", outcome.platform),
        }
    }
    Ok(())
}

fn print_report(report: &ValidationReport, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        let entries: Vec<serde_json::Value> = report
            .platforms()
            .iter()
            .map(|p| {
                serde_json::json!({
                    "platform": p.as_str(),
                    "compatible": report.passed_for(*p),
                    "issues": report
                        .failures_for(*p)
                        .map(|c| c.message.clone())
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries).context("Failed to serialize report")?;
        println!("{}", json);
        return Ok(());
    }

    for line in report.compatibility_summary() {
        println!("{}", line);
    }
    Ok(())
}

fn print_connections(checks: &[ConnectionCheck], format: &str) -> anyhow::Result<()> {
    if format == "json" {
        let json = serde_json::to_string_pretty(checks).context("Failed to serialize results")?;
        println!("{}", json);
        return Ok(());
    }

    for check in checks {
        match (&check.error, &check.account_id) {
            (None, Some(account)) => println!("{}: connected as {}", check.platform, account),
            (None, None) => println!("{}: connected", check.platform),
            (Some(error), _) => println!("{}: not connected ({})", check.platform, error),
        }
    }
    Ok(())
}

fn print_status(status: &VideoStatus, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        let json = serde_json::to_string_pretty(status).context("Failed to serialize status")?;
        println!("{}", json);
        return Ok(());
    }

    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    println!("video: {}", status.video_id);
    println!("upload: {}", field(&status.upload_status));
    println!("processing: {}", field(&status.processing_status));
    println!("privacy: {}", field(&status.privacy_status));
    if let Some(at) = &status.publish_at {
        println!("publish at: {}", at);
    }
    Ok(())
}
