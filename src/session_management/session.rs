use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::configuration::BackendKind;

/// Lifecycle state of a recording session.
///
/// Transitions are `Idle -> Starting -> Recording -> Stopping -> Idle` on
/// success; any unrecoverable error lands in `Failed`, which is terminal
/// until an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Stopping,
    Failed,
}

/// One bounded recording attempt, from start request to stop request.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub backend: BackendKind,
    /// Fixed at session creation, never renamed while the session is active.
    pub output_path: PathBuf,
    /// Monotonically increasing; meaningful only for the sampler backend.
    pub frame_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(backend: BackendKind, output_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Starting,
            backend,
            output_path,
            frame_count: 0,
            started_at: None,
            ended_at: None,
        }
    }

    /// Whether this session holds the single active slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            SessionState::Starting | SessionState::Recording | SessionState::Stopping
        )
    }
}
