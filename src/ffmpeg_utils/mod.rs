//! FFmpeg module - initialization, log routing and small FFI helpers
//!
//! This module handles:
//! - FFmpeg initialization
//! - Routing FFmpeg's own log output into `tracing`
//! - Safe accessors for codec-parameter fields ffmpeg-next does not expose

pub mod helpers;

pub use ffmpeg_next as ffmpeg;

/// Initialize the FFmpeg library.
///
/// Safe to call more than once; every entry point that opens media calls it.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    tracing::trace!("FFmpeg initialized");

    Ok(())
}

/// Install a custom FFmpeg log callback that forwards messages to `tracing`.
///
/// Known-benign chatter from the encoder and muxer is dropped.
///
/// **Safety & Ordering:** Must be called after `init()` and before any threading begins,
/// because altering the global log callback is not thread-safe.
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state and are safe to call
    // after `ffmpeg::init()`. Called once at startup before pipelines run.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that are expected while re-encoding and should be suppressed.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "using cpu capabilities",
    "profile High, level",
    "264 - core",
    "Starting second pass: moving the moov atom to the beginning of the file",
    "Could not update timestamps for skipped samples",
];

/// Whether a formatted FFmpeg log line should be dropped.
fn is_suppressed(msg: &str) -> bool {
    msg.trim().is_empty() || SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s))
}

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    // Respect the configured log level
    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    // Format the message using FFmpeg's own vsnprintf helper
    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    if is_suppressed(&msg) {
        return;
    }
    let msg = msg.trim_end();

    if level <= ffmpeg_next::ffi::AV_LOG_ERROR as std::ffi::c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg_next::ffi::AV_LOG_WARNING as std::ffi::c_int {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::debug!(target: "ffmpeg", "{}", msg);
    }
}

/// Get the version of the linked libavformat.
pub fn version_info() -> String {
    // SAFETY: `avformat_version` only returns a compile-time constant.
    let v = unsafe { ffmpeg::ffi::avformat_version() };
    format!("libavformat {}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}
