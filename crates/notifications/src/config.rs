//! Notification client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{NotificationError, Result};
use crate::navigation::DEFAULT_ORDER_HISTORY_PATH;
use crate::reconnect::ReconnectPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_ENDPOINT: &str = "/ws";
pub const PRIVATE_DESTINATION: &str = "/user/queue/notifications";
pub const BROADCAST_DESTINATION: &str = "/topic/notifications";

/// Path suffix SockJS servers expose for raw WebSocket clients.
const SOCKJS_WEBSOCKET_SUFFIX: &str = "/websocket";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// HTTP(S) base of the notification service
    pub base_url: String,
    /// SockJS endpoint path under `base_url`
    pub endpoint: String,
    pub private_destination: String,
    pub broadcast_destination: String,
    pub reconnect: ReconnectPolicy,
    /// Client heart-beat offered in CONNECT (0 disables)
    pub heartbeat_ms: u64,
    /// Maximum wait for CONNECTED after the transport opens
    pub handshake_timeout_ms: u64,
    /// Optional cap on stored notifications (unbounded when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_notifications: Option<usize>,
    pub order_history_path: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            private_destination: PRIVATE_DESTINATION.to_string(),
            broadcast_destination: BROADCAST_DESTINATION.to_string(),
            reconnect: ReconnectPolicy::default(),
            heartbeat_ms: 10_000,
            handshake_timeout_ms: 10_000,
            max_notifications: None,
            order_history_path: DEFAULT_ORDER_HISTORY_PATH.to_string(),
        }
    }
}

impl NotificationConfig {
    pub fn validate(&self) -> Result<()> {
        self.websocket_url()?;
        if self.private_destination.is_empty() || self.broadcast_destination.is_empty() {
            return Err(NotificationError::config("destinations must not be empty"));
        }
        if self.private_destination == self.broadcast_destination {
            return Err(NotificationError::config(
                "private and broadcast destinations must differ",
            ));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(NotificationError::config("handshake_timeout_ms must be > 0"));
        }
        Ok(())
    }

    /// WebSocket URL of the SockJS endpoint, e.g. `ws://localhost:8080/ws/websocket`.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| NotificationError::config(format!("invalid base_url: {e}")))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(NotificationError::config(format!(
                    "unsupported base_url scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| NotificationError::config("cannot convert base_url to a WebSocket URL"))?;

        let endpoint = self.endpoint.trim_matches('/');
        let base_path = url.path().trim_end_matches('/').to_string();
        let path = if endpoint.is_empty() {
            format!("{base_path}{SOCKJS_WEBSOCKET_SUFFIX}")
        } else {
            format!("{base_path}/{endpoint}{SOCKJS_WEBSOCKET_SUFFIX}")
        };
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    /// Value for the STOMP `host` header.
    pub fn stomp_host(&self) -> Result<String> {
        let url = self.websocket_url()?;
        url.host_str()
            .map(str::to_string)
            .ok_or_else(|| NotificationError::config("base_url has no host"))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
