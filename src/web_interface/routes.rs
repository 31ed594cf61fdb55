use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{ApiError, ControlResponse};
use crate::configuration::SessionOptions;
use crate::error_handling::types::SessionError;
use crate::session_management::{FrameOutcome, SessionController};

pub type SharedController = Arc<Mutex<SessionController>>;

const BODY_LIMIT: u64 = 16 * 1024;

fn error_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::AlreadyActive(_) | SessionError::NotActive => StatusCode::CONFLICT,
        SessionError::ConfigError(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET / -> small HTML status page
pub fn dashboard_route(
    controller: SharedController,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end().and(warp::get()).and_then(move || {
        let controller = controller.clone();
        async move {
            let controller = controller.lock().await;
            let session_line = match controller.session() {
                Some(session) => format!(
                    "<p>Session {} &mdash; {} frame(s), output {}</p>",
                    session.id,
                    controller.frame_count(),
                    session.output_path.display()
                ),
                None => "<p>No session yet.</p>".to_string(),
            };
            let html = format!(
                r#"<html><head><title>Reel</title></head>
                <body><h1>Reel is running</h1><p>State: {:?}</p>{}</body></html>"#,
                controller.state(),
                session_line
            );
            Ok::<_, Rejection>(reply::html(html))
        }
    })
}

/// POST /start -> begin a recording session
///
/// The body is a JSON [`SessionOptions`] object; an empty body means
/// "all defaults" so `curl -X POST .../start` just works.
pub fn start_route(
    controller: SharedController,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("start")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::bytes())
        .and_then(move |body: Bytes| {
            let controller = controller.clone();
            async move {
                let options: SessionOptions = if body.is_empty() {
                    SessionOptions::default()
                } else {
                    match serde_json::from_slice(&body) {
                        Ok(options) => options,
                        Err(e) => {
                            let res = reply::with_status(
                                reply::json(&ApiError {
                                    message: format!("Invalid request body: {}", e),
                                }),
                                StatusCode::BAD_REQUEST,
                            )
                            .into_response();
                            return Ok::<_, Rejection>(res);
                        }
                    }
                };

                let mut controller = controller.lock().await;
                let res = match controller.start(&options).await {
                    Ok(session_id) => {
                        let mut body = ControlResponse::ok(controller.state());
                        body.session_id = Some(session_id);
                        reply::with_status(reply::json(&body), StatusCode::OK).into_response()
                    }
                    Err(e) => {
                        let body = ControlResponse::error(controller.state(), e.to_string());
                        reply::with_status(reply::json(&body), error_status(&e)).into_response()
                    }
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// POST /frame -> capture one frame (sampler backend only)
pub fn frame_route(
    controller: SharedController,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("frame")
        .and(warp::path::end())
        .and(warp::post())
        .and_then(move || {
            let controller = controller.clone();
            async move {
                let mut controller = controller.lock().await;
                let res = match controller.capture_frame().await {
                    Ok(FrameOutcome::Captured(index)) => {
                        let mut body = ControlResponse::ok(controller.state());
                        body.frame_index = Some(index);
                        reply::with_status(reply::json(&body), StatusCode::OK).into_response()
                    }
                    Ok(FrameOutcome::Unsupported) => {
                        let mut body = ControlResponse::ok(controller.state());
                        body.message =
                            Some("frame capture is not applicable to a streaming session".to_string());
                        reply::with_status(reply::json(&body), StatusCode::OK).into_response()
                    }
                    Ok(FrameOutcome::Failed(message)) => {
                        let body = ControlResponse::error(controller.state(), message);
                        reply::with_status(reply::json(&body), StatusCode::INTERNAL_SERVER_ERROR)
                            .into_response()
                    }
                    Err(e) => {
                        let body = ControlResponse::error(controller.state(), e.to_string());
                        reply::with_status(reply::json(&body), error_status(&e)).into_response()
                    }
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// POST /stop -> end the session and report the artifact path
pub fn stop_route(
    controller: SharedController,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("stop")
        .and(warp::path::end())
        .and(warp::post())
        .and_then(move || {
            let controller = controller.clone();
            async move {
                let mut controller = controller.lock().await;
                let res = match controller.stop().await {
                    Ok(artifact) => {
                        let mut body = ControlResponse::ok(controller.state());
                        body.output = Some(artifact.to_string_lossy().to_string());
                        reply::with_status(reply::json(&body), StatusCode::OK).into_response()
                    }
                    Err(e) => {
                        let body = ControlResponse::error(controller.state(), e.to_string());
                        reply::with_status(reply::json(&body), error_status(&e)).into_response()
                    }
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// POST /reset -> clear a failed session
pub fn reset_route(
    controller: SharedController,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("reset")
        .and(warp::path::end())
        .and(warp::post())
        .and_then(move || {
            let controller = controller.clone();
            async move {
                let mut controller = controller.lock().await;
                let res = match controller.reset().await {
                    Ok(()) => reply::with_status(
                        reply::json(&ControlResponse::ok(controller.state())),
                        StatusCode::OK,
                    )
                    .into_response(),
                    Err(e) => {
                        let body = ControlResponse::error(controller.state(), e.to_string());
                        reply::with_status(reply::json(&body), error_status(&e)).into_response()
                    }
                };
                Ok::<_, Rejection>(res)
            }
        })
}
