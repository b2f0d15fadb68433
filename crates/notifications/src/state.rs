//! Connection state machine.
//!
//! Transport callbacks are reduced to a closed set of [`ConnectionEvent`]s and fed
//! through [`Session::handle`], which updates the state and returns the side
//! effects the connection actor must perform, in order. Nothing here touches a
//! socket or a clock.

use std::fmt;
use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectRequested { authenticated: bool },
    /// Transport open and CONNECTED frame received
    Established,
    TransportFailed,
    CredentialRejected,
    /// The transport went away without being asked to
    TransportClosed,
    SubscriptionFailed,
    RetryTimerFired { authenticated: bool },
    AuthenticationLost,
    DisconnectRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenTransport,
    CloseTransport,
    BindSubscriptions,
    ReleaseSubscriptions,
    ScheduleReconnect(Duration),
    CancelReconnect,
}

#[derive(Debug, Clone)]
pub struct Session {
    state: ConnectionState,
    reconnect_attempts: u32,
    reconnect_pending: bool,
    policy: ReconnectPolicy,
}

impl Session {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            reconnect_pending: false,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Failed attempts since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Action> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self.state, event) {
            (S::Connecting | S::Connected, E::ConnectRequested { .. }) => vec![],
            (_, E::ConnectRequested { authenticated: false }) => vec![],
            (S::Disconnected | S::Error, E::ConnectRequested { authenticated: true }) => {
                let mut actions = Vec::with_capacity(2);
                if self.reconnect_pending {
                    self.reconnect_pending = false;
                    actions.push(Action::CancelReconnect);
                }
                self.state = S::Connecting;
                actions.push(Action::OpenTransport);
                actions
            }

            (S::Connecting, E::Established) => {
                self.state = S::Connected;
                self.reconnect_attempts = 0;
                vec![Action::BindSubscriptions]
            }
            // A late handshake result for a session we no longer want.
            (_, E::Established) => vec![Action::CloseTransport],

            (
                S::Connecting,
                E::TransportFailed | E::CredentialRejected | E::TransportClosed,
            ) => {
                self.state = S::Error;
                vec![Action::CloseTransport, self.schedule_reconnect()]
            }

            (S::Connected, E::TransportClosed | E::TransportFailed | E::CredentialRejected) => {
                self.state = S::Disconnected;
                vec![
                    Action::ReleaseSubscriptions,
                    Action::CloseTransport,
                    self.schedule_reconnect(),
                ]
            }

            (S::Connected, E::SubscriptionFailed) => {
                self.state = S::Error;
                vec![
                    Action::ReleaseSubscriptions,
                    Action::CloseTransport,
                    self.schedule_reconnect(),
                ]
            }

            (_, E::RetryTimerFired { authenticated }) => {
                if !self.reconnect_pending {
                    return vec![];
                }
                self.reconnect_pending = false;
                if !authenticated {
                    self.state = S::Disconnected;
                    self.reconnect_attempts = 0;
                    return vec![];
                }
                match self.state {
                    S::Disconnected | S::Error => {
                        self.state = S::Connecting;
                        vec![Action::OpenTransport]
                    }
                    S::Connecting | S::Connected => vec![],
                }
            }

            (state, E::DisconnectRequested | E::AuthenticationLost) => {
                let mut actions = Vec::with_capacity(3);
                if self.reconnect_pending {
                    actions.push(Action::CancelReconnect);
                }
                if state == S::Connected {
                    actions.push(Action::ReleaseSubscriptions);
                }
                if matches!(state, S::Connecting | S::Connected) {
                    actions.push(Action::CloseTransport);
                }
                self.state = S::Disconnected;
                self.reconnect_attempts = 0;
                self.reconnect_pending = false;
                actions
            }

            // Failures reported for a session that is already down.
            (
                S::Disconnected | S::Error,
                E::TransportFailed
                | E::CredentialRejected
                | E::TransportClosed
                | E::SubscriptionFailed,
            )
            | (S::Connecting, E::SubscriptionFailed) => vec![],
        }
    }

    fn schedule_reconnect(&mut self) -> Action {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.reconnect_pending = true;
        Action::ScheduleReconnect(self.policy.delay(self.reconnect_attempts))
    }
}
