use serde::Serialize;
use uuid::Uuid;

use crate::session_management::SessionState;

/// API error payload
#[derive(Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Uniform response body for the control endpoints.
///
/// Every response carries the controller `state` so a caller can always tell
/// what the recorder is doing, even on errors.
#[derive(Serialize)]
pub struct ControlResponse {
    pub status: String,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlResponse {
    pub fn ok(state: SessionState) -> Self {
        Self {
            status: "ok".to_string(),
            state,
            session_id: None,
            frame_index: None,
            output: None,
            message: None,
        }
    }

    pub fn error(state: SessionState, message: String) -> Self {
        Self {
            status: "error".to_string(),
            state,
            session_id: None,
            frame_index: None,
            output: None,
            message: Some(message),
        }
    }
}
