use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::process::Command;

use super::backend::CaptureBackend;
use crate::configuration::{BackendKind, SessionConfig};
use crate::error_handling::types::{BackendError, ProcessError};
use crate::process_management::ProcessHandle;

/// Continuous screen-to-video capture: one ffmpeg process reads the virtual
/// display via x11grab and writes to a temporary file next to the final
/// output, so finalizing is an atomic rename on the same filesystem.
pub struct StreamingEncoder {
    config: SessionConfig,
    encoder: Option<ProcessHandle>,
    temp: Option<NamedTempFile>,
}

impl StreamingEncoder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            encoder: None,
            temp: None,
        }
    }

    fn encoder_args(output: &Path) -> &'static [&'static str] {
        match output.extension().and_then(|e| e.to_str()) {
            Some("webm") => &[
                "-c:v", "libvpx-vp9", "-crf", "30", "-b:v", "0", "-pix_fmt", "yuv420p",
            ],
            // Live encode favors speed over size
            _ => &["-c:v", "libx264", "-preset", "ultrafast", "-pix_fmt", "yuv420p"],
        }
    }
}

#[async_trait]
impl CaptureBackend for StreamingEncoder {
    fn kind(&self) -> BackendKind {
        BackendKind::Streaming
    }

    async fn begin(&mut self) -> Result<(), BackendError> {
        let output = &self.config.output_path;
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let extension = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let temp = tempfile::Builder::new()
            .prefix("reel-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(&parent)?;
        debug!("Encoding to temporary file {}", temp.path().display());

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y")
            .arg("-f")
            .arg("x11grab")
            .arg("-video_size")
            .arg(&self.config.resolution)
            .arg("-framerate")
            .arg(self.config.fps.to_string())
            .arg("-i")
            .arg(&self.config.display)
            .args(Self::encoder_args(output))
            .arg(temp.path());

        // Spawned unverified so the caller can persist the pid before the
        // startup grace window runs (see verify)
        let encoder = ProcessHandle::spawn_unverified("ffmpeg", cmd).await?;
        info!(
            "Screen recording started on {} (pid {})",
            self.config.display,
            encoder.pid()
        );

        self.encoder = Some(encoder);
        self.temp = Some(temp);
        Ok(())
    }

    async fn verify(&mut self) -> Result<(), BackendError> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| BackendError::CaptureFailed("no encoder running".to_string()))?;
        encoder.watch_startup(self.config.spawn_grace).await?;
        Ok(())
    }

    async fn end(&mut self) -> Result<PathBuf, BackendError> {
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| BackendError::CaptureFailed("no encoder running".to_string()))?;

        // SIGINT, never a kill first: the encoder has to write the container
        // trailer or the file is unplayable
        match encoder
            .stop_graceful(libc::SIGINT, self.config.stop_timeout)
            .await
        {
            Ok(()) => debug!("Encoder stopped cleanly"),
            Err(ProcessError::StopTimeout(msg)) => {
                warn!("{}; force-killing encoder, the recording may be truncated", msg);
                encoder.kill().await;
            }
            Err(e) => {
                warn!("Error stopping encoder ({}), force-killing", e);
                encoder.kill().await;
            }
        }

        let temp = self
            .temp
            .take()
            .ok_or_else(|| BackendError::ArtifactMissing(self.config.output_path.clone()))?;

        let size = std::fs::metadata(temp.path()).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            error!("Encoder produced no data at {}", temp.path().display());
            return Err(BackendError::ArtifactMissing(self.config.output_path.clone()));
        }

        temp.persist(&self.config.output_path).map_err(|e| {
            error!("Failed to finalize recording: {}", e.error);
            BackendError::IoError(e.error)
        })?;
        info!(
            "Recording saved to {} ({} bytes)",
            self.config.output_path.display(),
            size
        );
        Ok(self.config.output_path.clone())
    }

    async fn capture_frame(&mut self) -> Result<u64, BackendError> {
        Err(BackendError::CaptureFailed(
            "streaming backend does not capture individual frames".to_string(),
        ))
    }

    async fn release(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            encoder.kill().await;
        }
        // Dropping the temp file removes it
        self.temp = None;
    }

    fn pids(&self) -> Vec<u32> {
        self.encoder.iter().map(|h| h.pid()).collect()
    }
}
