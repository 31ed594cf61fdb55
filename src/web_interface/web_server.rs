use std::net::SocketAddr;

use log::{error, info};
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::routes;
use super::routes::SharedController;
use super::types::ApiError;
use crate::error_handling::types::WebError;

/// HTTP control plane for the recorder.
///
/// A thin protocol adapter: every endpoint locks the shared
/// [`SessionController`](crate::session_management::SessionController) and
/// translates one request into one controller call, so concurrent requests
/// serialize through the controller rather than the transport.
pub struct WebServer {
    controller: SharedController,
}

impl WebServer {
    pub fn new(controller: SharedController) -> Self {
        Self { controller }
    }

    /// Runs the server until the surrounding task is dropped or aborted.
    pub async fn start(&self, addr: SocketAddr) -> Result<(), WebError> {
        // Surface an occupied port as an error instead of a panic inside warp
        let probe = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(WebError::BindError)?;
        drop(probe);

        let routes = build_routes(self.controller.clone());

        info!("Control server listening on http://{}", addr);
        warp::serve(routes).run(addr).await;

        error!("Control server on {} stopped serving", addr);
        Err(WebError::ServerFailed(format!(
            "server on {} exited unexpectedly",
            addr
        )))
    }
}

pub(crate) fn build_routes(
    controller: SharedController,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    routes::dashboard_route(controller.clone())
        .or(routes::start_route(controller.clone()))
        .or(routes::frame_route(controller.clone()))
        .or(routes::stop_route(controller.clone()))
        .or(routes::reset_route(controller))
        .recover(handle_rejection)
}

/// Maps rejections onto JSON errors so a bad request never kills the server.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::BAD_REQUEST, "Request body too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(reply::with_status(
        reply::json(&ApiError { message }),
        status,
    ))
}
