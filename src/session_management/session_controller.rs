use chrono::Utc;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use uuid::Uuid;

use super::recovery::{self, MarkedProcess, SessionMarker};
use super::session::{Session, SessionState};
use crate::capture::{CaptureBackend, FrameSampler, StreamingEncoder};
use crate::configuration::{
    BackendKind, CaptureTarget, RecorderConfig, SessionConfig, SessionOptions,
};
use crate::error_handling::types::{BackendError, SessionError};
use crate::process_management::VirtualDisplay;

/// Result of an ad-hoc frame request.
#[derive(Debug, PartialEq)]
pub enum FrameOutcome {
    Captured(u64),
    /// The active backend does not capture individual frames; reported as a
    /// diagnostic, not an error.
    Unsupported,
    /// The capture itself failed; the session keeps recording.
    Failed(String),
}

pub(crate) type BackendFactory = Box<dyn Fn(&SessionConfig) -> Box<dyn CaptureBackend> + Send>;

/// Orchestrates one display process plus one capture backend as a single
/// logical session.
///
/// The controller owns the only mutable session slot: at most one session is
/// ever in `Starting`, `Recording` or `Stopping`. All process handles belong
/// to the active session; nothing else may terminate them.
pub struct SessionController {
    config: RecorderConfig,
    session: Option<Session>,
    display: Option<VirtualDisplay>,
    backend: Option<Box<dyn CaptureBackend>>,
    backend_factory: BackendFactory,
}

impl SessionController {
    pub fn new(config: RecorderConfig) -> Self {
        Self::with_backend_factory(
            config,
            Box::new(|session_config| match session_config.backend {
                BackendKind::Streaming => Box::new(StreamingEncoder::new(session_config.clone())),
                BackendKind::Sampler => Box::new(FrameSampler::new(session_config.clone())),
            }),
        )
    }

    /// Constructor with an injectable backend factory, used by tests.
    pub(crate) fn with_backend_factory(config: RecorderConfig, factory: BackendFactory) -> Self {
        Self {
            config,
            session: None,
            display: None,
            backend: None,
            backend_factory: factory,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Frames captured so far. While a sampler backend is running this reads
    /// the live count; afterwards it reads what the session recorded.
    pub fn frame_count(&self) -> u64 {
        let recorded = self
            .session
            .as_ref()
            .map(|s| s.frame_count)
            .unwrap_or(0);
        let live = self
            .backend
            .as_ref()
            .map(|b| b.frames_captured())
            .unwrap_or(0);
        recorded.max(live)
    }

    /// Runs crash recovery for an unclean prior shutdown. Must complete
    /// before the controller accepts any work.
    pub async fn recover(&mut self) -> Result<(), SessionError> {
        recovery::recover(&self.config.marker_path(), &self.config.frame_dir()).await
    }

    /// Starts a new session, rejecting the request while another session is
    /// active or a failed one has not been reset.
    pub async fn start(&mut self, options: &SessionOptions) -> Result<Uuid, SessionError> {
        match &self.session {
            Some(s) if s.state == SessionState::Failed => {
                return Err(SessionError::AlreadyActive(format!(
                    "session {} failed and must be reset first",
                    s.id
                )));
            }
            Some(s) if s.is_active() => {
                return Err(SessionError::AlreadyActive(format!(
                    "session {} is {:?}",
                    s.id, s.state
                )));
            }
            _ => {}
        }

        let session_config = self.config.resolve(options)?;
        let session = Session::new(session_config.backend, session_config.output_path.clone());
        let id = session.id;
        info!(
            "[{}] starting {:?} session -> {}",
            id,
            session_config.backend,
            session_config.output_path.display()
        );
        self.session = Some(session);

        // Display stage: only sessions without a pre-existing target need one
        if session_config.target == CaptureTarget::OwnedDisplay {
            match VirtualDisplay::start(
                &session_config.display,
                &session_config.resolution,
                session_config.spawn_grace,
            )
            .await
            {
                Ok(display) => self.display = Some(display),
                Err(e) => {
                    error!("[{}] display stage failed: {}", id, e);
                    self.mark_failed();
                    return Err(SessionError::DisplayError(e));
                }
            }
            self.write_marker(id, &session_config.output_path);
        }

        // Backend stage; on failure the display is rolled back first
        let mut backend = (self.backend_factory)(&session_config);
        if let Err(e) = backend.begin().await {
            error!("[{}] backend start stage failed: {}", id, e);
            backend.release().await;
            if let Some(mut display) = self.display.take() {
                display.stop().await;
            }
            SessionMarker::remove(&self.config.marker_path());
            self.mark_failed();
            return Err(SessionError::BackendStart(e));
        }
        self.backend = Some(backend);
        // The marker carries the backend pids before the startup watch runs,
        // so a crash during verification still leaves them recoverable
        self.write_marker(id, &session_config.output_path);

        let verified = match self.backend.as_mut() {
            Some(backend) => backend.verify().await,
            None => Ok(()),
        };
        if let Err(e) = verified {
            error!("[{}] backend verification failed: {}", id, e);
            self.release_all().await;
            self.mark_failed();
            return Err(SessionError::BackendStart(e));
        }

        if let Some(session) = self.session.as_mut() {
            session.state = SessionState::Recording;
            session.started_at = Some(Utc::now());
        }
        info!("[{}] recording", id);
        Ok(id)
    }

    /// Stops the active session and returns the artifact path.
    ///
    /// The capture backend is always finalized before the display goes down;
    /// the other order would corrupt the in-progress artifact.
    pub async fn stop(&mut self) -> Result<PathBuf, SessionError> {
        let id = match &self.session {
            Some(s) if s.state == SessionState::Recording => s.id,
            _ => return Err(SessionError::NotActive),
        };

        info!("[{}] stopping", id);
        if let Some(session) = self.session.as_mut() {
            session.state = SessionState::Stopping;
        }

        let result = match self.backend.as_mut() {
            Some(backend) => backend.end().await,
            None => Err(BackendError::CaptureFailed("no backend running".to_string())),
        };

        // The backend's final count survives into the session entity before
        // the backend itself is dropped
        let frames = self.frame_count();
        if let Some(session) = self.session.as_mut() {
            session.frame_count = frames;
        }

        // One cleanup path for every exit: backend leftovers, display, marker
        self.release_all().await;

        match result {
            Ok(artifact) => {
                if let Some(session) = self.session.as_mut() {
                    session.state = SessionState::Idle;
                    session.ended_at = Some(Utc::now());
                }
                info!("[{}] stopped, artifact at {}", id, artifact.display());
                Ok(artifact)
            }
            Err(e) => {
                error!("[{}] backend stop stage failed: {}", id, e);
                self.mark_failed();
                Err(SessionError::BackendStop(e))
            }
        }
    }

    /// Captures one ad-hoc frame through the sampler backend.
    pub async fn capture_frame(&mut self) -> Result<FrameOutcome, SessionError> {
        let backend_kind = match &self.session {
            Some(s) if s.state == SessionState::Recording => s.backend,
            _ => return Err(SessionError::NotActive),
        };
        if backend_kind != BackendKind::Sampler {
            warn!("Frame request ignored: the streaming backend captures continuously");
            return Ok(FrameOutcome::Unsupported);
        }

        let backend = self
            .backend
            .as_mut()
            .ok_or(SessionError::NotActive)?;
        match backend.capture_frame().await {
            Ok(index) => {
                if let Some(session) = self.session.as_mut() {
                    session.frame_count = index + 1;
                }
                Ok(FrameOutcome::Captured(index))
            }
            Err(e) => {
                warn!("Ad-hoc frame capture failed: {}", e);
                Ok(FrameOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Clears a failed session so new work is accepted again. Re-runs the
    /// cleanup path first, so a reset can never leak a process.
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        if let Some(s) = &self.session {
            if s.is_active() {
                return Err(SessionError::AlreadyActive(format!(
                    "session {} is {:?}; stop it instead of resetting",
                    s.id, s.state
                )));
            }
        }
        self.release_all().await;
        self.session = None;
        info!("Controller reset to idle");
        Ok(())
    }

    /// The single idempotent cleanup operation: releases the capture backend,
    /// stops the display, removes the liveness marker. Invoked by normal
    /// stop, by a caught termination signal, and after crash recovery.
    pub async fn release_all(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.release().await;
        }
        if let Some(mut display) = self.display.take() {
            display.stop().await;
        }
        SessionMarker::remove(&self.config.marker_path());
        debug!("All session resources released");
    }

    fn mark_failed(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.state = SessionState::Failed;
            session.ended_at = Some(Utc::now());
        }
    }

    /// Writes (or refreshes) the crash-recovery marker with the pids of every
    /// process currently backing the session.
    fn write_marker(&mut self, id: Uuid, output_path: &std::path::Path) {
        let mut processes = Vec::new();
        if let Some(display) = &self.display {
            processes.push(MarkedProcess {
                name: "Xvfb".to_string(),
                pid: display.pid(),
            });
        }
        if let Some(backend) = &self.backend {
            for pid in backend.pids() {
                processes.push(MarkedProcess {
                    name: "ffmpeg".to_string(),
                    pid,
                });
            }
        }

        let marker = SessionMarker::new(id, processes, output_path.to_path_buf());
        if let Err(e) = marker.write(&self.config.marker_path()) {
            warn!("Could not write session marker: {}", e);
        }
    }
}
