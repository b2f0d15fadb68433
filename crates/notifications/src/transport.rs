//! Transport abstraction: a framed, bidirectional STOMP session.
//!
//! The connection manager only sees frames. [`crate::websocket::WebSocketConnector`]
//! is the production implementation; tests plug in an in-memory one.

use async_trait::async_trait;
use stomp_codec::{Frame, StompItem};
use url::Url;

use crate::error::Result;

/// Opens transport sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &Url) -> Result<Box<dyn TransportSession>>;
}

/// One open transport session.
///
/// Dropping a session must release the underlying connection.
#[async_trait]
pub trait TransportSession: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;

    async fn send_heartbeat(&mut self) -> Result<()>;

    /// Next inbound item. `None` once the peer has closed the session.
    ///
    /// A `NotificationError::Stomp` error affects only the offending frame; any
    /// other error means the session is unusable.
    async fn next_item(&mut self) -> Option<Result<StompItem>>;

    async fn close(&mut self);
}
