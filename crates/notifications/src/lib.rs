//! Storefront notifications: real-time delivery and client-side state.
//!
//! Keeps one authenticated STOMP session to the notification service, subscribes
//! to the per-user queue and the broadcast topic, and folds every arriving event
//! into a deduplicated, newest-first store with a live unread count.
//!
//! ## Core Types
//!
//! - [`NotificationService`] - Per-session facade; create on sign-in, [`NotificationService::shutdown`] on sign-out
//! - [`ConnectionManager`] - Actor owning the transport, subscriptions and reconnect timer
//! - [`NotificationCenter`] - Store and unread count behind one lock, plus change events
//! - [`Notification`] / [`NotificationType`] - The stored record
//!
//! ## Building blocks
//!
//! - [`Session`] - Pure connection state machine (`ConnectionEvent` in, `Action`s out)
//! - [`SubscriptionRouter`] - Private/broadcast subscription pair and MESSAGE routing
//! - [`parser::parse`] - Tolerant JSON payload parsing
//! - [`NotificationStore`] / [`UnreadTracker`] - Ordered unique records and the derived count
//! - [`NavigationResolver`] - Where a click on a notification leads
//!
//! ## Transport
//!
//! - [`Connector`] / [`TransportSession`] - Frame-level transport seam
//! - [`WebSocketConnector`] - STOMP over WebSocket (`wss://` needs the `rustls-tls` feature)

pub mod auth;
pub mod center;
pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod navigation;
pub mod parser;
pub mod reconnect;
pub mod service;
pub mod state;
pub mod store;
pub mod subscription;
pub mod transport;
pub mod unread;
pub mod websocket;

pub use auth::{AuthenticatedUser, CredentialProvider, SessionCredentials};
pub use center::{NotificationCenter, NotificationEvent};
pub use config::NotificationConfig;
pub use connection::{ConnectionManager, StateTransition};
pub use error::{NotificationError, ParseError, Result};
pub use model::{Notification, NotificationType};
pub use navigation::{NavigationResolver, Route};
pub use reconnect::ReconnectPolicy;
pub use service::NotificationService;
pub use state::{Action, ConnectionEvent, ConnectionState, Session};
pub use store::NotificationStore;
pub use subscription::{Channel, SubscriptionRouter};
pub use transport::{Connector, TransportSession};
pub use unread::UnreadTracker;
pub use websocket::WebSocketConnector;

pub use stomp_codec;
