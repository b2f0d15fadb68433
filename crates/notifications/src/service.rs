//! One notification service instance per authenticated session.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::auth::CredentialProvider;
use crate::center::{NotificationCenter, NotificationEvent};
use crate::config::NotificationConfig;
use crate::connection::{ConnectionManager, StateTransition};
use crate::error::Result;
use crate::model::Notification;
use crate::navigation::{NavigationResolver, Route};
use crate::state::ConnectionState;
use crate::transport::Connector;
use crate::websocket::WebSocketConnector;

/// Connection plus client-side notification state.
///
/// Created when a user signs in and torn down with [`NotificationService::shutdown`]
/// when they sign out. Nothing here is global.
pub struct NotificationService {
    config: NotificationConfig,
    center: Arc<NotificationCenter>,
    connection: ConnectionManager,
}

impl NotificationService {
    /// Service over the production WebSocket transport.
    pub fn new(config: NotificationConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(WebSocketConnector::new()))
    }

    pub fn with_connector(config: NotificationConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let center = Arc::new(NotificationCenter::new(
            config.max_notifications,
            NavigationResolver::new(config.order_history_path.clone()),
        ));
        let connection = ConnectionManager::new(&config, connector, center.clone())?;
        Ok(Self {
            config,
            center,
            connection,
        })
    }

    /// Begin delivering notifications for the signed-in user.
    pub fn start(&self, credentials: Arc<dyn CredentialProvider>) {
        self.connection.connect(credentials);
    }

    /// Sign-out: drop the connection, cancel retries and forget every record.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        self.center.clear_all();
        info!("Notification service shut down");
    }

    /// The authentication collaborator reports the user is gone. Closes the
    /// session and drops all stored records.
    pub fn authentication_lost(&self) {
        self.connection.authentication_lost();
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.center.notifications()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.center.get(id)
    }

    pub fn unread_count(&self) -> usize {
        self.center.unread_count()
    }

    pub fn watch_unread(&self) -> watch::Receiver<usize> {
        self.center.watch_unread()
    }

    /// Arrivals and read/clear changes.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.center.subscribe()
    }

    pub fn mark_as_read(&self, id: &str) -> bool {
        self.center.mark_as_read(id)
    }

    pub fn mark_all_as_read(&self) -> usize {
        self.center.mark_all_as_read()
    }

    pub fn clear_all(&self) {
        self.center.clear_all();
    }

    pub fn acknowledge(&self, id: &str) -> Option<Route> {
        self.center.acknowledge(id)
    }

    pub fn resolve(&self, notification: &Notification) -> Option<Route> {
        self.center.resolve(notification)
    }

    pub fn action_label(&self, notification: &Notification) -> Option<String> {
        self.center.action_label(notification)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.connection.subscribe_transitions()
    }

    pub fn center(&self) -> &Arc<NotificationCenter> {
        &self.center
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }
}
