//! Text transport seam and its WebSocket implementation

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::CloudError;

/// STOMP sub-protocols offered during the WebSocket upgrade
pub const STOMP_SUBPROTOCOLS: &str = "v12.stomp, v11.stomp, v10.stomp";

/// Opens links to a collector host
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        host: &str,
        port: u16,
        path: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Link>, CloudError>;
}

/// An open bidirectional text link
#[async_trait]
pub trait Link: Send {
    async fn send_text(&mut self, text: String) -> Result<(), CloudError>;

    /// Wait up to `timeout` for one inbound message; `Ok(None)` on timeout
    async fn recv_text(&mut self, timeout: Duration) -> Result<Option<String>, CloudError>;

    async fn close(&mut self) -> Result<(), CloudError>;
}

/// WebSocket connector (`ws://host:port/path`)
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        host: &str,
        port: u16,
        path: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Link>, CloudError> {
        let fail = |reason: String| CloudError::Unreachable {
            host: host.to_string(),
            port,
            reason,
        };

        let url = format!("ws://{host}:{port}{path}");
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| fail(e.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(STOMP_SUBPROTOCOLS),
        );

        let (stream, response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| fail(format!("connect timed out after {timeout:?}")))?
            .map_err(|e| fail(e.to_string()))?;

        debug!(
            url = %url,
            status = %response.status(),
            protocol = ?response.headers().get("Sec-WebSocket-Protocol"),
            "WebSocket upgraded"
        );
        Ok(Box::new(WsLink { stream }))
    }
}

/// WebSocket link
pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send_text(&mut self, text: String) -> Result<(), CloudError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))
    }

    async fn recv_text(&mut self, timeout: Duration) -> Result<Option<String>, CloudError> {
        let next = match tokio::time::timeout(timeout, self.stream.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(None),
        };

        match next {
            None | Some(Ok(Message::Close(_))) => Err(CloudError::ConnectionClosed),
            Some(Err(e)) => Err(CloudError::Transport(e.to_string())),
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Binary(bytes))) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            // Pings are answered by the stream itself
            Some(Ok(_)) => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), CloudError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))
    }
}
