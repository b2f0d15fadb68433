//! Notification record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Metadata key holding an absolute navigation target.
pub const TRACKING_URL_KEY: &str = "trackingUrl";
/// Metadata key holding the label for the navigation target.
pub const ACTION_TEXT_KEY: &str = "actionText";

/// Kind of storefront event a notification reports.
///
/// Unknown wire tags map to [`NotificationType::Other`], which keeps the original
/// tag so newer producers do not break older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    OrderCreated,
    OrderStatusUpdate,
    PaymentSuccess,
    PaymentFailure,
    PaymentProcessing,
    RefundProcessed,
    Other(String),
}

impl NotificationType {
    /// Map a wire tag to a type. Matching is exact (tags are upper snake case).
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "ORDER_CREATED" => Self::OrderCreated,
            "ORDER_STATUS_UPDATE" => Self::OrderStatusUpdate,
            "PAYMENT_SUCCESS" => Self::PaymentSuccess,
            "PAYMENT_FAILURE" => Self::PaymentFailure,
            "PAYMENT_PROCESSING" => Self::PaymentProcessing,
            "REFUND_PROCESSED" => Self::RefundProcessed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Self::OrderCreated => "ORDER_CREATED",
            Self::OrderStatusUpdate => "ORDER_STATUS_UPDATE",
            Self::PaymentSuccess => "PAYMENT_SUCCESS",
            Self::PaymentFailure => "PAYMENT_FAILURE",
            Self::PaymentProcessing => "PAYMENT_PROCESSING",
            Self::RefundProcessed => "REFUND_PROCESSED",
            Self::Other(tag) => tag,
        }
    }

    /// True for every tag containing `PAYMENT`, including unknown ones.
    pub fn is_payment(&self) -> bool {
        self.as_tag().contains("PAYMENT")
    }

    pub fn is_order(&self) -> bool {
        matches!(self, Self::OrderCreated | Self::OrderStatusUpdate)
    }

    /// Human-friendly label.
    pub fn label(&self) -> &str {
        match self {
            Self::OrderCreated => "Order Placed",
            Self::OrderStatusUpdate => "Order Update",
            Self::PaymentSuccess => "Payment Successful",
            Self::PaymentFailure => "Payment Failed",
            Self::PaymentProcessing => "Payment Processing",
            Self::RefundProcessed => "Refund Processed",
            Self::Other(_) => "Notification",
        }
    }
}

impl From<String> for NotificationType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<NotificationType> for String {
    fn from(kind: NotificationType) -> Self {
        kind.as_tag().to_string()
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A single notification as held by the store.
///
/// Everything except `read` is fixed once the record is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Producer-supplied ID, or a locally generated UUID
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub read: bool,
    /// Producer timestamp, or local receipt time when absent
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Create an unread notification stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            user_id: None,
            order_id: None,
            metadata: HashMap::new(),
            read: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Add metadata to the notification.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// `metadata.trackingUrl`, when it is a non-empty string.
    pub fn tracking_url(&self) -> Option<&str> {
        self.metadata_str(TRACKING_URL_KEY)
    }

    /// `metadata.actionText`, when it is a non-empty string.
    pub fn action_text(&self) -> Option<&str> {
        self.metadata_str(ACTION_TEXT_KEY)
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}
