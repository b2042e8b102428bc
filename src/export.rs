//! One-call export with a fixed quality preset
//!
//! A convenience wrapper over [`Transcoder`]: pick a preset, get back a
//! session handle (or nothing, if the export cannot be set up at all).

use std::path::{Path, PathBuf};

use tokio::sync::watch;

use crate::config::{TranscoderConfig, DEFAULT_VIDEO_BITRATE};
use crate::error::{ErrorCategory, Result, TranscodeError};
use crate::transcoder::Transcoder;

/// Container extensions the export path writes
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v"];

/// Fixed quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportPreset {
    Low,
    #[default]
    Medium,
    Highest,
}

impl ExportPreset {
    /// Average video bitrate in bps
    pub fn video_bitrate(self) -> u64 {
        match self {
            ExportPreset::Low => 300_000,
            ExportPreset::Medium => DEFAULT_VIDEO_BITRATE,
            ExportPreset::Highest => 5_000_000,
        }
    }

    /// Transcoder settings for this preset
    pub fn config(self) -> TranscoderConfig {
        TranscoderConfig {
            video_bitrate: self.video_bitrate(),
            ..Default::default()
        }
    }
}

/// Progress of an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Exporting,
    Completed,
    Failed {
        category: ErrorCategory,
        message: String,
    },
}

impl ExportStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ExportStatus::Exporting)
    }
}

/// Handle to a running export
#[derive(Debug)]
pub struct ExportSession {
    output: PathBuf,
    preset: ExportPreset,
    status: watch::Receiver<ExportStatus>,
}

impl ExportSession {
    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn preset(&self) -> ExportPreset {
        self.preset
    }

    /// Current status without waiting
    pub fn status(&self) -> ExportStatus {
        self.status.borrow().clone()
    }

    /// Wait until the export completes or fails.
    pub async fn wait(&mut self) -> ExportStatus {
        match self.status.wait_for(ExportStatus::is_finished).await {
            Ok(status) => status.clone(),
            // The export task went away without reporting
            Err(_) => self.status.borrow().clone(),
        }
    }
}

/// Export `input` to `output` with `preset`.
///
/// Returns `None` when the export cannot be set up: the input is missing,
/// the output already exists, the output extension is not a QuickTime/MP4
/// one, or no Tokio runtime is running. `on_complete` still receives that
/// setup error before `None` is returned. Otherwise the export runs in the
/// background and `on_complete` receives its single terminal result.
pub fn export_with_preset<F>(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    preset: ExportPreset,
    on_complete: F,
) -> Option<ExportSession>
where
    F: FnOnce(Result<PathBuf>) + Send + 'static,
{
    let input = input.as_ref().to_path_buf();
    let output = output.as_ref().to_path_buf();

    let runtime = match check_setup(&input, &output) {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(category = ?e.category(), "Export not started: {}", e);
            on_complete(Err(e));
            return None;
        }
    };

    let (tx, rx) = watch::channel(ExportStatus::Exporting);
    let transcoder = Transcoder::new(preset.config());
    let target = output.clone();
    runtime.spawn(async move {
        let result = transcoder.transcode(&input, &target).await;
        let status = match &result {
            Ok(_) => ExportStatus::Completed,
            Err(e) => ExportStatus::Failed {
                category: e.category(),
                message: e.to_string(),
            },
        };
        // Nobody may be watching any more; the callback still gets the result
        let _ = tx.send(status);
        on_complete(result);
    });

    tracing::debug!(preset = ?preset, output = ?output, "Export started");
    Some(ExportSession {
        output,
        preset,
        status: rx,
    })
}

/// Everything that must hold before an export task is spawned.
fn check_setup(input: &Path, output: &Path) -> Result<tokio::runtime::Handle> {
    if !input.exists() {
        return Err(TranscodeError::InputNotFound(input.to_path_buf()));
    }
    if output.exists() {
        return Err(TranscodeError::OutputExists(output.to_path_buf()));
    }
    if !has_supported_extension(output) {
        return Err(TranscodeError::Construction(format!(
            "export output must be one of {:?}: {:?}",
            SUPPORTED_EXTENSIONS, output
        )));
    }
    tokio::runtime::Handle::try_current()
        .map_err(|e| TranscodeError::Construction(format!("export needs a Tokio runtime: {}", e)))
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_bitrates() {
        assert_eq!(ExportPreset::default(), ExportPreset::Medium);
        assert_eq!(ExportPreset::Medium.video_bitrate(), 900_000);
        assert!(ExportPreset::Low.video_bitrate() < ExportPreset::Medium.video_bitrate());
        assert!(ExportPreset::Highest.video_bitrate() > ExportPreset::Medium.video_bitrate());
        assert!(ExportPreset::Highest.config().validate().is_ok());
    }

    #[test]
    fn test_supported_extensions() {
        assert!(has_supported_extension(Path::new("/tmp/a.mov")));
        assert!(has_supported_extension(Path::new("/tmp/a.MP4")));
        assert!(has_supported_extension(Path::new("a.m4v")));
        assert!(!has_supported_extension(Path::new("a.mkv")));
        assert!(!has_supported_extension(Path::new("noext")));
    }

    #[test]
    fn test_status_finished() {
        assert!(!ExportStatus::Exporting.is_finished());
        assert!(ExportStatus::Completed.is_finished());
        assert!(ExportStatus::Failed {
            category: ErrorCategory::Write,
            message: "eio".into()
        }
        .is_finished());
    }

    /// Export that must be rejected up front; returns what the callback saw.
    fn rejected(input: &Path, output: &Path) -> Vec<TranscodeError> {
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let session = export_with_preset(input, output, ExportPreset::Low, move |result| {
            sink.lock().push(result.unwrap_err());
        });
        assert!(session.is_none());
        let errors = std::mem::take(&mut *seen.lock());
        errors
    }

    #[tokio::test]
    async fn test_setup_failures_return_none() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("existing.mov");
        std::fs::write(&existing, b"x").unwrap();

        // Missing input
        let errors = rejected(&dir.path().join("missing.mov"), &dir.path().join("out.mov"));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TranscodeError::InputNotFound(_)));
        assert_eq!(errors[0].category(), ErrorCategory::InputUnreadable);

        // Output already exists
        let errors = rejected(&existing, &existing);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TranscodeError::OutputExists(_)));
        assert_eq!(errors[0].category(), ErrorCategory::Construction);

        // Unsupported container
        let errors = rejected(&existing, &dir.path().join("out.mkv"));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TranscodeError::Construction(_)));
    }

    #[test]
    fn test_no_runtime_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mov");
        std::fs::write(&input, b"x").unwrap();

        let errors = rejected(&input, &dir.path().join("out.mov"));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TranscodeError::Construction(_)));
    }

    #[tokio::test]
    async fn test_unreadable_input_fails_session() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mov");
        std::fs::write(&input, b"not a movie").unwrap();
        let out = dir.path().join("out.mov");

        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut session = export_with_preset(&input, &out, ExportPreset::Medium, move |result| {
            let _ = tx.send(result);
        })
        .unwrap();
        assert_eq!(session.output(), out.as_path());

        let status = session.wait().await;
        assert!(matches!(
            status,
            ExportStatus::Failed {
                category: ErrorCategory::InputUnreadable,
                ..
            }
        ));
        assert!(rx.await.unwrap().is_err());
        assert!(!out.exists());
    }
}
