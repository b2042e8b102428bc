//! Media Transcoder
//!
//! Re-encodes the video track of a media file to H.264 at a configurable
//! bitrate and copies the audio track through untouched.
//!
//! Usage: `media-transcoder <input> <output> [config.toml]`

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_transcoder::config::{AppConfig, LogFormat, LoggingConfig};
use media_transcoder::config_file::ConfigFile;
use media_transcoder::{ffmpeg_utils, Transcoder};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "media-transcoder";

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (input, output, config_path) = match args.as_slice() {
        [input, output] => (PathBuf::from(input), PathBuf::from(output), None),
        [input, output, config] => (
            PathBuf::from(input),
            PathBuf::from(output),
            Some(PathBuf::from(config)),
        ),
        _ => {
            eprintln!("usage: {} <input> <output> [config.toml]", APP_NAME);
            return ExitCode::from(2);
        }
    };

    // Load configuration before logging so the log format can be configured
    let (config, config_error) = match config_path.as_ref() {
        Some(path) => match ConfigFile::from_file(path).and_then(|cf| cf.into_app_config()) {
            Ok(config) => (config, None),
            Err(e) => (AppConfig::default(), Some(format!("{}: {}", path.display(), e))),
        },
        None => (AppConfig::default(), None),
    };

    init_logging(&config.logging);
    if let Some(e) = config_error {
        tracing::error!("Failed to load config file {}", e);
        return ExitCode::from(2);
    }

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("FFmpeg version: {}", ffmpeg_utils::version_info());

    if let Err(e) = ffmpeg_utils::init() {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }
    ffmpeg_utils::install_log_filter();
    tracing::debug!("Configuration loaded: {:?}", config.transcode);

    let transcoder = Transcoder::new(config.transcode);
    match transcoder.transcode(&input, &output).await {
        Ok(path) => {
            tracing::info!("Wrote {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(category = ?e.category(), "Transcode failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with tracing
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("media_transcoder={0},ffmpeg={0}", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
