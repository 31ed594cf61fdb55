use async_trait::async_trait;
use log::{debug, info, trace, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::backend::CaptureBackend;
use super::cdp::CdpConnection;
use super::frame_store::{self, FrameStore};
use super::video_encoder;
use crate::configuration::{BackendKind, CaptureTarget, SessionConfig};
use crate::error_handling::types::BackendError;

enum SamplerCommand {
    CaptureNow(oneshot::Sender<Result<u64, BackendError>>),
    Stop(oneshot::Sender<SamplerReport>),
}

#[derive(Debug, Clone, Copy)]
struct SamplerReport {
    frames: u64,
    connection_lost: bool,
}

/// Periodic screenshot capture over the browser debugger connection.
///
/// A spawned task owns the connection and the frame sequence; it loops over
/// an interval tick and a command channel, so `end` and ad-hoc captures never
/// race an in-flight screenshot. The numbered sequence is batch-encoded into
/// one video when the session stops.
pub struct FrameSampler {
    config: SessionConfig,
    command_tx: Option<mpsc::Sender<SamplerCommand>>,
    task: Option<JoinHandle<()>>,
    // Shared with the sampler task so the count is readable mid-recording
    frames: Arc<AtomicU64>,
}

impl FrameSampler {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            command_tx: None,
            task: None,
            frames: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl CaptureBackend for FrameSampler {
    fn kind(&self) -> BackendKind {
        BackendKind::Sampler
    }

    async fn begin(&mut self) -> Result<(), BackendError> {
        let url = match &self.config.target {
            CaptureTarget::Debugger(url) => url.clone(),
            _ => {
                return Err(BackendError::ConnectionFailed(
                    "sampler requires a debugger target".to_string(),
                ))
            }
        };

        let mut store = FrameStore::new(self.config.frame_dir.clone());
        store.prepare()?;

        let cdp = CdpConnection::connect(&url).await?;

        let (tx, rx) = mpsc::channel(8);
        let period = self.config.frame_interval();
        let manual = self.config.manual;
        self.frames.store(0, Ordering::SeqCst);
        self.task = Some(tokio::spawn(sampler_loop(
            cdp,
            store,
            period,
            manual,
            rx,
            self.frames.clone(),
        )));
        self.command_tx = Some(tx);

        if manual {
            info!("Frame sampling started in manual mode");
        } else {
            info!(
                "Frame sampling started at {} fps ({:?} interval)",
                self.config.fps, period
            );
        }
        Ok(())
    }

    async fn end(&mut self) -> Result<PathBuf, BackendError> {
        let tx = self
            .command_tx
            .take()
            .ok_or_else(|| BackendError::CaptureFailed("sampler is not recording".to_string()))?;

        // Ask the loop to stop; the reply arrives once any in-flight capture
        // has finished
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = tx.send(SamplerCommand::Stop(reply_tx)).await;

        let report = match tokio::time::timeout(self.config.drain_timeout, reply_rx).await {
            Ok(Ok(report)) => report,
            _ => {
                warn!("Sampler did not drain within {:?}", self.config.drain_timeout);
                if let Some(task) = self.task.take() {
                    task.abort();
                }
                SamplerReport {
                    frames: frame_store::count_frames(&self.config.frame_dir),
                    connection_lost: false,
                }
            }
        };
        self.frames.store(report.frames, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!(
            "Sampler drained: {} frame(s), connection lost: {}",
            report.frames, report.connection_lost
        );

        if report.frames < 2 {
            frame_store::purge_dir(&self.config.frame_dir);
            if report.connection_lost {
                return Err(BackendError::ConnectionClosed);
            }
            return Err(BackendError::InsufficientFrames(report.frames));
        }

        let pattern = self.config.frame_dir.join("frame_%06d.png");
        let result = video_encoder::encode_sequence(
            &pattern,
            self.config.fps,
            &self.config.output_path,
        )
        .await;
        // The working directory is purged whether or not the encode worked
        frame_store::purge_dir(&self.config.frame_dir);
        result.map(|_| self.config.output_path.clone())
    }

    async fn capture_frame(&mut self) -> Result<u64, BackendError> {
        let tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| BackendError::CaptureFailed("sampler is not recording".to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(SamplerCommand::CaptureNow(reply_tx))
            .await
            .map_err(|_| BackendError::ConnectionClosed)?;

        // Bounded wait: a debugger that stays connected but never answers
        // must not wedge the caller
        match tokio::time::timeout(self.config.drain_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BackendError::ConnectionClosed),
            Err(_) => Err(BackendError::CaptureFailed(format!(
                "debugger did not answer within {:?}",
                self.config.drain_timeout
            ))),
        }
    }

    async fn release(&mut self) {
        // Dropping the sender makes the loop close the connection and exit;
        // a wedged capture is aborted rather than waited out
        self.command_tx = None;
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(self.config.drain_timeout, &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
        frame_store::purge_dir(&self.config.frame_dir);
    }

    fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    fn pids(&self) -> Vec<u32> {
        // The sampler spawns no long-lived child processes
        Vec::new()
    }
}

async fn sampler_loop(
    mut cdp: CdpConnection,
    mut store: FrameStore,
    period: std::time::Duration,
    manual: bool,
    mut rx: mpsc::Receiver<SamplerCommand>,
    frames: Arc<AtomicU64>,
) {
    // Delay the first tick one full period so starting never double-captures
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut connection_lost = false;

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(SamplerCommand::CaptureNow(reply)) => {
                    let result = if connection_lost {
                        Err(BackendError::ConnectionClosed)
                    } else {
                        capture_once(&mut cdp, &mut store, &frames).await
                    };
                    if matches!(result, Err(BackendError::ConnectionClosed)) {
                        connection_lost = true;
                    }
                    let _ = reply.send(result);
                }
                Some(SamplerCommand::Stop(reply)) => {
                    cdp.close().await;
                    let _ = reply.send(SamplerReport {
                        frames: store.frame_count(),
                        connection_lost,
                    });
                    return;
                }
                None => {
                    cdp.close().await;
                    return;
                }
            },
            _ = ticker.tick(), if !manual && !connection_lost => {
                match capture_once(&mut cdp, &mut store, &frames).await {
                    Ok(index) => trace!("Captured frame {}", index),
                    Err(BackendError::ConnectionClosed) => {
                        warn!("Debugger connection lost, periodic sampling stopped");
                        connection_lost = true;
                    }
                    // The frame is skipped; the index does not advance
                    Err(e) => warn!("Frame capture skipped: {}", e),
                }
            }
        }
    }
}

async fn capture_once(
    cdp: &mut CdpConnection,
    store: &mut FrameStore,
    frames: &AtomicU64,
) -> Result<u64, BackendError> {
    let bytes = cdp.capture_screenshot().await?;
    let index = store.append(&bytes).map_err(BackendError::IoError)?;
    frames.store(store.frame_count(), Ordering::SeqCst);
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::cdp::test_support::spawn_fake_debugger;
    use crate::capture::video_encoder::test_support::{ffmpeg_available, tiny_png};
    use std::path::Path;
    use std::time::Duration;

    fn sampler_config(url: &str, dir: &Path, manual: bool) -> SessionConfig {
        SessionConfig {
            backend: BackendKind::Sampler,
            target: CaptureTarget::Debugger(url.to_string()),
            display: ":99".to_string(),
            resolution: "1920x1080".to_string(),
            fps: 10,
            manual,
            output_path: dir.join("out.mp4"),
            frame_dir: dir.join("frames"),
            spawn_grace: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn begin_fails_without_a_debugger_target() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = sampler_config("ws://unused", tmp.path(), false);
        config.target = CaptureTarget::OwnedDisplay;

        let mut sampler = FrameSampler::new(config);
        let err = sampler.begin().await.unwrap_err();
        assert!(matches!(err, BackendError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn stopping_with_no_frames_reports_insufficient_data() {
        let tmp = tempfile::tempdir().unwrap();
        let url = spawn_fake_debugger(tiny_png(), 100).await;
        let mut sampler = FrameSampler::new(sampler_config(&url, tmp.path(), true));

        sampler.begin().await.unwrap();
        let err = sampler.end().await.unwrap_err();
        assert!(matches!(err, BackendError::InsufficientFrames(0)));
        // No artifact and no leftover frames
        assert!(!tmp.path().join("out.mp4").exists());
        assert!(!tmp.path().join("frames").exists());
    }

    #[tokio::test]
    async fn manual_captures_are_numbered_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let url = spawn_fake_debugger(tiny_png(), 100).await;
        let mut sampler = FrameSampler::new(sampler_config(&url, tmp.path(), true));

        sampler.begin().await.unwrap();
        for expected in 0..5u64 {
            let index = sampler.capture_frame().await.unwrap();
            assert_eq!(index, expected);
        }

        if ffmpeg_available() {
            let artifact = sampler.end().await.unwrap();
            assert_eq!(artifact, tmp.path().join("out.mp4"));
            assert!(artifact.exists());
            assert!(std::fs::metadata(&artifact).unwrap().len() > 0);
        } else {
            eprintln!("ffmpeg not available, checking cleanup only");
            let err = sampler.end().await.unwrap_err();
            assert!(matches!(err, BackendError::EncodeFailed(_)));
        }
        // The working directory is purged either way
        assert!(!tmp.path().join("frames").exists());
    }

    #[tokio::test]
    async fn periodic_sampling_collects_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let url = spawn_fake_debugger(tiny_png(), 1000).await;
        let mut config = sampler_config(&url, tmp.path(), false);
        config.fps = 50;

        let mut sampler = FrameSampler::new(config);
        sampler.begin().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // The count is visible while the sampler is still running
        assert!(sampler.frames_captured() >= 2);

        match sampler.end().await {
            Ok(artifact) => {
                assert!(artifact.exists());
            }
            Err(BackendError::EncodeFailed(_)) if !ffmpeg_available() => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
        assert!(!tmp.path().join("frames").exists());
    }

    #[tokio::test]
    async fn lost_connection_fails_manual_captures() {
        let tmp = tempfile::tempdir().unwrap();
        // The fake endpoint hangs up after a single screenshot
        let url = spawn_fake_debugger(tiny_png(), 1).await;
        let mut sampler = FrameSampler::new(sampler_config(&url, tmp.path(), true));

        sampler.begin().await.unwrap();
        sampler.capture_frame().await.unwrap();

        let err = sampler.capture_frame().await.unwrap_err();
        assert!(matches!(err, BackendError::ConnectionClosed));

        // One frame and a lost connection: reported as the connection loss
        let err = sampler.end().await.unwrap_err();
        assert!(matches!(err, BackendError::ConnectionClosed));
    }

    #[tokio::test]
    async fn unresponsive_debugger_fails_the_capture_within_the_drain_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        // Handshake succeeds but no request is ever answered
        let url = crate::capture::cdp::test_support::spawn_silent_debugger().await;
        let mut config = sampler_config(&url, tmp.path(), true);
        config.drain_timeout = Duration::from_millis(200);

        let mut sampler = FrameSampler::new(config);
        sampler.begin().await.unwrap();

        let started = std::time::Instant::now();
        let err = sampler.capture_frame().await.unwrap_err();
        assert!(matches!(err, BackendError::CaptureFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(2));

        sampler.release().await;
    }

    #[tokio::test]
    async fn release_purges_the_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let url = spawn_fake_debugger(tiny_png(), 100).await;
        let mut sampler = FrameSampler::new(sampler_config(&url, tmp.path(), true));

        sampler.begin().await.unwrap();
        sampler.capture_frame().await.unwrap();
        sampler.release().await;

        assert!(!tmp.path().join("frames").exists());
        // Release is idempotent
        sampler.release().await;
    }
}
