use async_trait::async_trait;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use stomp_codec::{Frame, HEARTBEAT, StompCodec, StompItem};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
        protocol::Message,
    },
};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{NotificationError, Result};
use crate::transport::{Connector, TransportSession};

/// Opens STOMP sessions over a raw WebSocket (the SockJS `/websocket` endpoint).
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    /// Extra headers for the HTTP upgrade request
    headers: Vec<(String, String)>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn TransportSession>> {
        let mut request = url.as_str().into_client_request()?;
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NotificationError::connection(format!("invalid header name: {e}")))?;
            let value = value
                .parse::<HeaderValue>()
                .map_err(|e| NotificationError::connection(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        info!("Connecting to WebSocket: {}", url);
        let (stream, response) = connect_async(request).await?;
        debug!(status = %response.status(), "WebSocket upgrade complete");

        Ok(Box::new(WebSocketSession {
            stream,
            codec: StompCodec::default(),
            buffer: BytesMut::new(),
        }))
    }
}

/// STOMP over one WebSocket connection. Each text or binary message carries
/// whole frames; partial frames are buffered until completed.
struct WebSocketSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    codec: StompCodec,
    buffer: BytesMut,
}

#[async_trait]
impl TransportSession for WebSocketSession {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        trace!(command = %frame.command, "Sending frame");
        let mut dst = BytesMut::new();
        self.codec.encode(frame, &mut dst)?;
        let text = String::from_utf8(dst.to_vec())
            .map_err(|e| NotificationError::connection(format!("non UTF-8 frame: {e}")))?;
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        let text = String::from_utf8_lossy(HEARTBEAT).into_owned();
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    async fn next_item(&mut self) -> Option<Result<StompItem>> {
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => {}
                Err(e) => {
                    let skipped = StompCodec::skip_frame(&mut self.buffer);
                    trace!(skipped, "Skipped undecodable frame");
                    return Some(Err(e.into()));
                }
            }

            match self.stream.next().await? {
                Ok(Message::Text(text)) => self.buffer.extend_from_slice(text.as_bytes()),
                Ok(Message::Binary(data)) => self.buffer.extend_from_slice(&data),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(reason)) => {
                    warn!(?reason, "WebSocket closed by server");
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("WebSocket close failed: {}", e);
        }
    }
}
