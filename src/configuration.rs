pub mod config;
pub mod types;

pub use config::RecorderConfig;
pub use types::{BackendKind, CaptureTarget, SessionConfig, SessionOptions};
