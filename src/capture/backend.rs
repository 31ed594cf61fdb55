use async_trait::async_trait;
use std::path::PathBuf;

use crate::configuration::BackendKind;
use crate::error_handling::types::BackendError;

/// Contract shared by both capture strategies so the session controller is
/// backend-agnostic.
///
/// Within one session `begin` always completes (success or failure) before
/// `end` is accepted; the controller's single-active-session invariant makes
/// the calls strictly sequential.
#[async_trait]
pub trait CaptureBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Spawns or connects the capture resources. On failure the backend must
    /// leave nothing behind. After a successful return [`Self::pids`] reports
    /// every child process, even before startup verification ran.
    async fn begin(&mut self) -> Result<(), BackendError>;

    /// Completes startup verification after [`Self::begin`], once the caller
    /// has had a chance to persist the spawned pids. Backends without a
    /// verification step succeed immediately.
    async fn verify(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Stops capturing and finalizes the artifact, returning its path.
    async fn end(&mut self) -> Result<PathBuf, BackendError>;

    /// Captures one ad-hoc frame and returns its index. Only meaningful for
    /// the sampler backend.
    async fn capture_frame(&mut self) -> Result<u64, BackendError>;

    /// Frames captured so far, including frames the backend gathered on its
    /// own. Always zero for backends without a frame sequence.
    fn frames_captured(&self) -> u64 {
        0
    }

    /// Idempotent, unconditional cleanup: terminate processes, drop temp
    /// state. Never fails.
    async fn release(&mut self);

    /// Pids of the child processes this backend supervises, for the
    /// crash-recovery marker.
    fn pids(&self) -> Vec<u32>;
}
