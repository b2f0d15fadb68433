use anyhow::Result;
use serde::Serialize;
use storefront_notifications::{Channel, ConnectionState, Notification, Route};

/// Renders notifications either as readable lines or as JSON lines.
pub struct OutputManager {
    json: bool,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonLine<'a> {
    Notification {
        channel: String,
        unread: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<&'a str>,
        notification: &'a Notification,
    },
    State {
        state: String,
    },
}

impl OutputManager {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn format_notification(
        &self,
        notification: &Notification,
        channel: Channel,
        route: Option<&Route>,
        action: Option<&str>,
        unread: usize,
    ) -> Result<String> {
        if self.json {
            let line = JsonLine::Notification {
                channel: channel.to_string(),
                unread,
                target: route.map(Route::target),
                action,
                notification,
            };
            return Ok(serde_json::to_string(&line)?);
        }

        let mut output = format!(
            "[{}] {} ({}) {}",
            notification.timestamp.format("%Y-%m-%d %H:%M:%S"),
            notification.kind.label(),
            channel,
            notification.title,
        );
        output.push_str(&format!("\n  {}", notification.message));
        if let Some(order_id) = &notification.order_id {
            output.push_str(&format!("\n  Order: {order_id}"));
        }
        if let Some(route) = route {
            output.push_str(&format!(
                "\n  {}: {}",
                action.unwrap_or("Open"),
                route.target()
            ));
        }
        output.push_str(&format!("\n  Unread: {unread}"));
        Ok(output)
    }

    pub fn format_state(&self, state: ConnectionState) -> Result<String> {
        if self.json {
            return Ok(serde_json::to_string(&JsonLine::State {
                state: state.to_string(),
            })?);
        }
        Ok(format!("-- {state}"))
    }
}
