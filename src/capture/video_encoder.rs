use log::{error, info};
use std::path::Path;
use std::time::Instant;
use tokio::process::Command;

use crate::error_handling::types::BackendError;

/// Encoder arguments chosen by output extension. The container format is
/// configuration, not logic: `.webm` gets VP9, everything else x264.
pub fn codec_args(output: &Path) -> &'static [&'static str] {
    match output.extension().and_then(|e| e.to_str()) {
        Some("webm") => &[
            "-c:v", "libvpx-vp9", "-crf", "30", "-b:v", "0", "-pix_fmt", "yuv420p",
        ],
        _ => &["-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "fast"],
    }
}

/// Encodes a numbered frame sequence into one video, synchronously, at
/// session end. The elapsed time is unbounded but always reported.
pub async fn encode_sequence(
    pattern: &Path,
    fps: u32,
    output: &Path,
) -> Result<(), BackendError> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-framerate")
        .arg(fps.to_string())
        .arg("-i")
        .arg(pattern)
        .args(codec_args(output))
        .arg(output);

    info!(
        "Encoding frame sequence {} -> {} at {} fps",
        pattern.display(),
        output.display(),
        fps
    );
    let started = Instant::now();
    let result = cmd.output().await.map_err(|e| {
        error!("Failed to run ffmpeg: {}", e);
        BackendError::EncodeFailed(format!("could not run ffmpeg: {}", e))
    })?;
    let elapsed = started.elapsed();

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(" | ");
        error!("ffmpeg encode failed after {:?}: {}", elapsed, tail);
        return Err(BackendError::EncodeFailed(tail));
    }

    info!("Encode finished in {:?}", elapsed);
    Ok(())
}
