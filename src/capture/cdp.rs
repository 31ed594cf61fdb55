use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error_handling::types::BackendError;

/// One persistent websocket connection to a browser remote-debugging
/// endpoint, used to request screenshots over the DevTools protocol.
pub struct CdpConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl std::fmt::Debug for CdpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpConnection")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl CdpConnection {
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        debug!("Connecting to debugger at {}", url);
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| BackendError::ConnectionFailed(format!("{}: {}", url, e)))?;
        debug!("Debugger connection established");
        Ok(Self { ws, next_id: 1 })
    }

    /// Issues one `Page.captureScreenshot` call and returns the decoded PNG.
    ///
    /// Protocol event messages carry no `id` and are skipped while waiting for
    /// the matching response. A closed connection is
    /// [`BackendError::ConnectionClosed`], which callers treat as fatal; any
    /// malformed response is a [`BackendError::CaptureFailed`], which callers
    /// may skip.
    pub async fn capture_screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = serde_json::json!({
            "id": id,
            "method": "Page.captureScreenshot",
            "params": { "format": "png" }
        });
        self.ws
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|_| BackendError::ConnectionClosed)?;

        loop {
            let msg = match self.ws.next().await {
                Some(Ok(m)) => m,
                Some(Err(_)) | None => return Err(BackendError::ConnectionClosed),
            };
            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => return Err(BackendError::ConnectionClosed),
                _ => continue,
            };

            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| BackendError::CaptureFailed(format!("bad response: {}", e)))?;

            match value.get("id").and_then(|v| v.as_u64()) {
                Some(got) if got == id => {
                    if let Some(data) = value.pointer("/result/data").and_then(|v| v.as_str()) {
                        let bytes = base64::engine::general_purpose::STANDARD
                            .decode(data)
                            .map_err(|e| {
                                BackendError::CaptureFailed(format!("invalid base64 payload: {}", e))
                            })?;
                        trace!("Screenshot {} received ({} bytes)", id, bytes.len());
                        return Ok(bytes);
                    }
                    if let Some(err) = value.get("error") {
                        return Err(BackendError::CaptureFailed(err.to_string()));
                    }
                    return Err(BackendError::CaptureFailed(
                        "screenshot response without data".to_string(),
                    ));
                }
                // No id (protocol event) or a stale id: keep waiting
                _ => {
                    trace!("Skipping unrelated debugger message");
                    continue;
                }
            }
        }
    }

    pub async fn close(&mut self) {
        let _ = self.ws.close(None).await;
        debug!("Debugger connection closed");
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::spawn_fake_debugger;
    use super::*;

    #[tokio::test]
    async fn connect_fails_when_nothing_listens() {
        let err = CdpConnection::connect("ws://127.0.0.1:1/devtools/page/1")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn screenshots_are_decoded_and_events_skipped() {
        let url = spawn_fake_debugger(b"fake-png".to_vec(), 3).await;
        let mut cdp = CdpConnection::connect(&url).await.unwrap();

        for _ in 0..3 {
            let frame = cdp.capture_screenshot().await.unwrap();
            assert_eq!(frame, b"fake-png");
        }
    }

    #[tokio::test]
    async fn closed_connection_is_fatal() {
        let url = spawn_fake_debugger(b"png".to_vec(), 1).await;
        let mut cdp = CdpConnection::connect(&url).await.unwrap();

        cdp.capture_screenshot().await.unwrap();
        let err = cdp.capture_screenshot().await.unwrap_err();
        assert!(matches!(err, BackendError::ConnectionClosed));
    }
}
