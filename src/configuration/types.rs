use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The capture strategy used by a session.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum BackendKind {
    /// Continuous ffmpeg encode of a live X display.
    Streaming,
    /// Periodic screenshot capture over the browser debugger connection,
    /// batch-encoded at session end.
    Sampler,
}

/// What the session records from, derived from the `target` option.
#[derive(Debug, PartialEq, Clone)]
pub enum CaptureTarget {
    /// Websocket URL of a browser remote-debugging endpoint.
    Debugger(String),
    /// An X display that already exists (`:N`); the session attaches to it.
    ExistingDisplay(String),
    /// No target given: the session spawns its own virtual display.
    OwnedDisplay,
}

/// Per-session options as the caller provides them (HTTP body or CLI flags).
/// All fields are optional; unset fields fall back to the recorder defaults.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SessionOptions {
    pub target: Option<String>,
    pub output: Option<String>,
    pub fps: Option<u32>,
    pub resolution: Option<String>,
    pub display: Option<String>,
    pub manual: Option<bool>,
}

/// Fully resolved session configuration. Defaults are applied exactly once,
/// at session creation, and never re-read afterwards.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backend: BackendKind,
    pub target: CaptureTarget,
    pub display: String,
    pub resolution: String,
    pub fps: u32,
    pub manual: bool,
    pub output_path: PathBuf,
    pub frame_dir: PathBuf,
    pub spawn_grace: Duration,
    pub stop_timeout: Duration,
    pub drain_timeout: Duration,
}

impl SessionConfig {
    /// Screenshot interval for the sampler backend.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.fps as u64)
    }
}
