//! Binds a live session to the private and broadcast channels.

use stomp_codec::{Command, Frame};
use tracing::{debug, info};

use crate::config::NotificationConfig;
use crate::error::{NotificationError, Result};

/// Logical channel a notification arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Per-user queue
    Private,
    /// Shared topic delivered to every client
    Broadcast,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Broadcast => write!(f, "broadcast"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub channel: Channel,
    pub destination: String,
}

/// Tracks the subscription pair of the current session.
///
/// Subscription ids are never reused, so a MESSAGE addressed to a subscription
/// from an earlier session is not routed.
#[derive(Debug)]
pub struct SubscriptionRouter {
    private_destination: String,
    broadcast_destination: String,
    next_id: u64,
    active: Vec<Subscription>,
}

impl SubscriptionRouter {
    pub fn new(private_destination: impl Into<String>, broadcast_destination: impl Into<String>) -> Self {
        Self {
            private_destination: private_destination.into(),
            broadcast_destination: broadcast_destination.into(),
            next_id: 0,
            active: Vec::with_capacity(2),
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(
            config.private_destination.clone(),
            config.broadcast_destination.clone(),
        )
    }

    /// Create the subscription pair and return the SUBSCRIBE frames to send.
    ///
    /// Fails if a pair is already bound; it must be released first.
    pub fn bind(&mut self, user: Option<&str>) -> Result<Vec<Frame>> {
        if !self.active.is_empty() {
            return Err(NotificationError::subscription(
                "subscriptions already bound for this session",
            ));
        }

        for (channel, destination) in [
            (Channel::Private, self.private_destination.clone()),
            (Channel::Broadcast, self.broadcast_destination.clone()),
        ] {
            let id = format!("sub-{}", self.next_id);
            self.next_id += 1;
            self.active.push(Subscription {
                id,
                channel,
                destination,
            });
        }

        info!(
            user = user.unwrap_or("<anonymous>"),
            private = %self.private_destination,
            broadcast = %self.broadcast_destination,
            "Binding notification subscriptions"
        );

        Ok(self
            .active
            .iter()
            .map(|s| Frame::subscribe(s.id.clone(), s.destination.clone()))
            .collect())
    }

    /// Release the current pair, returning the UNSUBSCRIBE frames to send.
    pub fn unbind(&mut self) -> Vec<Frame> {
        self.active
            .drain(..)
            .map(|s| {
                debug!(id = %s.id, destination = %s.destination, "Releasing subscription");
                Frame::unsubscribe(s.id)
            })
            .collect()
    }

    /// Forget the current pair without telling the server (transport is gone).
    pub fn invalidate(&mut self) {
        if !self.active.is_empty() {
            debug!(count = self.active.len(), "Invalidating subscriptions");
        }
        self.active.clear();
    }

    /// Channel for an inbound MESSAGE, matched on its `subscription` header.
    pub fn route(&self, frame: &Frame) -> Option<Channel> {
        if frame.command != Command::Message {
            return None;
        }
        let id = frame.header("subscription")?;
        self.active
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.channel)
    }

    pub fn is_bound(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BROADCAST_DESTINATION, PRIVATE_DESTINATION};

    fn router() -> SubscriptionRouter {
        SubscriptionRouter::from_config(&NotificationConfig::default())
    }

    fn message(subscription: &str) -> Frame {
        Frame::new(Command::Message).with_header("subscription", subscription)
    }

    #[test]
    fn test_bind_creates_two_subscriptions() {
        let mut router = router();
        let frames = router.bind(Some("reader")).unwrap();

        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.command == Command::Subscribe));
        let destinations: Vec<_> = frames.iter().filter_map(|f| f.header("destination")).collect();
        assert_eq!(destinations, [PRIVATE_DESTINATION, BROADCAST_DESTINATION]);
        assert!(router.is_bound());
    }

    #[test]
    fn test_double_bind_is_an_error() {
        let mut router = router();
        router.bind(None).unwrap();
        assert!(matches!(
            router.bind(None),
            Err(NotificationError::Subscription(_))
        ));
        assert_eq!(router.subscriptions().len(), 2);
    }

    #[test]
    fn test_route_by_subscription_id() {
        let mut router = router();
        router.bind(None).unwrap();

        assert_eq!(router.route(&message("sub-0")), Some(Channel::Private));
        assert_eq!(router.route(&message("sub-1")), Some(Channel::Broadcast));
        assert_eq!(router.route(&message("sub-9")), None);
        assert_eq!(router.route(&Frame::new(Command::Receipt)), None);
    }

    #[test]
    fn test_rebind_uses_fresh_ids() {
        let mut router = router();
        router.bind(None).unwrap();

        let frames = router.unbind();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.command == Command::Unsubscribe));
        assert!(!router.is_bound());

        router.bind(None).unwrap();
        assert_eq!(router.route(&message("sub-0")), None);
        assert_eq!(router.route(&message("sub-2")), Some(Channel::Private));
    }

    #[test]
    fn test_invalidate_sends_nothing() {
        let mut router = router();
        router.bind(None).unwrap();
        router.invalidate();
        assert!(router.unbind().is_empty());
        assert!(router.bind(None).is_ok());
    }
}
