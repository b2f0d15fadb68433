//! Maps acknowledged notifications to navigation targets.

use crate::model::Notification;

/// Default order-history route in the storefront.
pub const DEFAULT_ORDER_HISTORY_PATH: &str = "/orders";

/// Where the UI should navigate after a notification is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `metadata.trackingUrl`, passed through verbatim
    Tracking(String),
    /// The order-history view
    OrderHistory(String),
}

impl Route {
    pub fn target(&self) -> &str {
        match self {
            Self::Tracking(url) => url,
            Self::OrderHistory(path) => path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationResolver {
    order_history_path: String,
}

impl Default for NavigationResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER_HISTORY_PATH)
    }
}

impl NavigationResolver {
    pub fn new(order_history_path: impl Into<String>) -> Self {
        Self {
            order_history_path: order_history_path.into(),
        }
    }

    /// Tracking URL first, then a type-based default, otherwise nothing.
    pub fn resolve(&self, notification: &Notification) -> Option<Route> {
        if let Some(url) = notification.tracking_url() {
            return Some(Route::Tracking(url.to_string()));
        }
        if notification.kind.is_order() || notification.kind.is_payment() {
            return Some(Route::OrderHistory(self.order_history_path.clone()));
        }
        None
    }

    /// Label for the notification's call to action, if it has a route.
    pub fn action_label(&self, notification: &Notification) -> Option<String> {
        if let Some(text) = notification.action_text() {
            return Some(text.to_string());
        }
        match self.resolve(notification)? {
            Route::Tracking(_) => Some("View Details".to_string()),
            Route::OrderHistory(_) => Some("View Orders".to_string()),
        }
    }
}
