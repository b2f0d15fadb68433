//! Connection manager for the notification service.
//!
//! A single actor task owns the transport session, the subscription router and
//! the reconnect timer. Commands from the public handle, handshake results,
//! timer firings and inbound frames are all processed by that one task, in
//! order, so no two callbacks ever run concurrently.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use stomp_codec::{Command, Frame, HeartBeat, StompItem};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::auth::CredentialProvider;
use crate::center::NotificationCenter;
use crate::config::NotificationConfig;
use crate::error::{NotificationError, Result};
use crate::reconnect::ReconnectTimer;
use crate::state::{Action, ConnectionEvent, ConnectionState, Session};
use crate::subscription::SubscriptionRouter;
use crate::transport::{Connector, TransportSession};

/// Upper bound on a graceful close before the transport is simply dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Broadcast channel capacity for state transitions.
const TRANSITION_BROADCAST_CAPACITY: usize = 64;

/// A change of connection state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub reconnect_attempts: u32,
}

enum ManagerCommand {
    Connect(Arc<dyn CredentialProvider>),
    Disconnect(oneshot::Sender<()>),
    AuthenticationLost,
}

enum Internal {
    Handshake {
        generation: u64,
        result: Result<Established>,
    },
    RetryTimerFired {
        generation: u64,
    },
}

struct Established {
    transport: Box<dyn TransportSession>,
    server_heart_beat: HeartBeat,
}

/// Handle to the connection actor.
///
/// Connection failures are never returned from these methods; they show up only
/// as state changes while the actor keeps retrying.
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<ManagerCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    transition_tx: broadcast::Sender<StateTransition>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the actor. Must be called within a tokio runtime.
    pub fn new(
        config: &NotificationConfig,
        connector: Arc<dyn Connector>,
        center: Arc<NotificationCenter>,
    ) -> Result<Self> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (transition_tx, _) = broadcast::channel(TRANSITION_BROADCAST_CAPACITY);

        let actor = ConnectionActor {
            url: config.websocket_url()?,
            host: config.stomp_host()?,
            heart_beat: HeartBeat::new(config.heartbeat_ms, 0),
            handshake_timeout: config.handshake_timeout(),
            connector,
            center,
            session: Session::new(config.reconnect),
            router: SubscriptionRouter::from_config(config),
            credentials: None,
            transport: None,
            heartbeat: None,
            handshake: None,
            generation: 0,
            timer: ReconnectTimer::default(),
            internal_tx,
            state_tx,
            transition_tx: transition_tx.clone(),
        };
        let task = tokio::spawn(actor.run(cmd_rx, internal_rx));

        Ok(Self {
            cmd_tx,
            state_rx,
            transition_tx,
            task,
        })
    }

    /// Request a connection. Returns immediately; watch the state for the outcome.
    ///
    /// No-op while connecting or connected, or when `credentials` reports the user
    /// as not authenticated.
    pub fn connect(&self, credentials: Arc<dyn CredentialProvider>) {
        if self.cmd_tx.send(ManagerCommand::Connect(credentials)).is_err() {
            warn!("Connection manager stopped; connect ignored");
        }
    }

    /// Tear down the session and cancel any pending reconnect.
    ///
    /// Resolves once the actor has processed the request; after that no further
    /// connection attempt is made until [`ConnectionManager::connect`] is called again.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(ManagerCommand::Disconnect(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// The authentication collaborator reports the user signed out.
    pub fn authentication_lost(&self) {
        let _ = self.cmd_tx.send(ManagerCommand::AuthenticationLost);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transition_tx.subscribe()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ConnectionActor {
    url: Url,
    host: String,
    /// Heart-beat offered in CONNECT
    heart_beat: HeartBeat,
    handshake_timeout: Duration,
    connector: Arc<dyn Connector>,
    center: Arc<NotificationCenter>,

    session: Session,
    router: SubscriptionRouter,
    credentials: Option<Arc<dyn CredentialProvider>>,

    transport: Option<Box<dyn TransportSession>>,
    heartbeat: Option<Interval>,
    /// In-flight open + STOMP handshake
    handshake: Option<JoinHandle<()>>,
    generation: u64,
    timer: ReconnectTimer,

    internal_tx: mpsc::UnboundedSender<Internal>,
    state_tx: watch::Sender<ConnectionState>,
    transition_tx: broadcast::Sender<StateTransition>,
}

impl ConnectionActor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<ManagerCommand>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.apply(ConnectionEvent::DisconnectRequested).await;
                        break;
                    }
                },

                Some(internal) = internal_rx.recv() => {
                    self.handle_internal(internal).await;
                }

                item = next_item(&mut self.transport) => {
                    self.handle_item(item).await;
                }

                _ = next_heartbeat(&mut self.heartbeat) => {
                    self.send_heartbeat().await;
                }
            }
        }
        debug!("Connection manager task stopped");
    }

    async fn handle_command(&mut self, cmd: ManagerCommand) {
        match cmd {
            ManagerCommand::Connect(credentials) => {
                let authenticated = credentials.is_authenticated();
                if !authenticated {
                    debug!("Connect ignored: user is not authenticated");
                } else if matches!(
                    self.session.state(),
                    ConnectionState::Disconnected | ConnectionState::Error
                ) {
                    self.credentials = Some(credentials);
                }
                self.apply(ConnectionEvent::ConnectRequested { authenticated })
                    .await;
            }
            ManagerCommand::Disconnect(ack) => {
                self.apply(ConnectionEvent::DisconnectRequested).await;
                self.credentials = None;
                let _ = ack.send(());
            }
            ManagerCommand::AuthenticationLost => {
                self.end_authenticated_session();
                self.apply(ConnectionEvent::AuthenticationLost).await;
            }
        }
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Handshake { generation, result } => {
                if generation != self.generation || self.handshake.is_none() {
                    // Superseded attempt; make sure its transport does not linger.
                    if let Ok(mut stale) = result {
                        close_quietly(stale.transport.as_mut()).await;
                    }
                    return;
                }
                self.handshake = None;

                match result {
                    Ok(established) => {
                        self.install_transport(established);
                        self.apply(ConnectionEvent::Established).await;
                    }
                    Err(NotificationError::CredentialRejected(reason)) => {
                        warn!(%reason, "Notification service rejected the credential");
                        self.apply(ConnectionEvent::CredentialRejected).await;
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            attempt = self.session.reconnect_attempts() + 1,
                            "Notification connection attempt failed"
                        );
                        self.apply(ConnectionEvent::TransportFailed).await;
                    }
                }
            }
            Internal::RetryTimerFired { generation } => {
                if !self.timer.take_fired(generation) {
                    trace!(generation, "Ignoring stale reconnect timer");
                    return;
                }
                let authenticated = self
                    .credentials
                    .as_ref()
                    .is_some_and(|c| c.is_authenticated());
                self.apply(ConnectionEvent::RetryTimerFired { authenticated })
                    .await;
                if !authenticated {
                    info!("User no longer authenticated; giving up reconnecting");
                    self.end_authenticated_session();
                }
            }
        }
    }

    async fn handle_item(&mut self, item: Option<Result<StompItem>>) {
        match item {
            Some(Ok(StompItem::Frame(frame))) => self.handle_frame(frame).await,
            Some(Ok(StompItem::Heartbeat)) => trace!("Heart-beat received"),
            Some(Err(e)) if !e.is_fatal_to_session() => {
                warn!(error = %e, "Dropping undecodable frame");
            }
            Some(Err(e)) => {
                warn!(error = %e, "Notification transport error");
                self.drop_transport();
                self.apply(ConnectionEvent::TransportClosed).await;
            }
            None => {
                warn!("Notification transport closed unexpectedly");
                self.drop_transport();
                self.apply(ConnectionEvent::TransportClosed).await;
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) {
        match frame.command {
            Command::Message => {
                let Some(channel) = self.router.route(&frame) else {
                    debug!(
                        subscription = frame.header("subscription").unwrap_or("-"),
                        "Message for unknown subscription ignored"
                    );
                    return;
                };
                match frame.body_str() {
                    // Parse failures are logged by the center; the stream carries on.
                    Ok(body) => {
                        let _ = self.center.ingest(channel, body);
                    }
                    Err(e) => warn!(%channel, error = %e, "Dropping message with non UTF-8 body"),
                }
            }
            Command::Error => {
                warn!(
                    message = frame.header("message").unwrap_or(""),
                    "Notification service sent ERROR"
                );
                if let Some(mut transport) = self.transport.take() {
                    close_quietly(transport.as_mut()).await;
                }
                self.drop_transport();
                self.apply(ConnectionEvent::TransportClosed).await;
            }
            Command::Receipt => trace!(receipt = frame.header("receipt-id"), "Receipt"),
            other => debug!(command = %other, "Ignoring unexpected frame"),
        }
    }

    async fn send_heartbeat(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(e) = transport.send_heartbeat().await {
            warn!(error = %e, "Failed to send heart-beat");
            self.drop_transport();
            self.apply(ConnectionEvent::TransportClosed).await;
        } else {
            trace!("Sent heart-beat");
        }
    }

    /// Feed an event through the state machine and carry out its actions.
    async fn apply(&mut self, event: ConnectionEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let from = self.session.state();
            let actions = self.session.handle(event);
            self.publish(from);

            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    fn publish(&self, from: ConnectionState) {
        let to = self.session.state();
        if from == to {
            return;
        }
        let reconnect_attempts = self.session.reconnect_attempts();
        debug!(%from, %to, reconnect_attempts, "Connection state changed");
        self.state_tx.send_replace(to);
        let _ = self.transition_tx.send(StateTransition {
            from,
            to,
            reconnect_attempts,
        });
    }

    async fn execute(&mut self, action: Action) -> Option<ConnectionEvent> {
        match action {
            Action::OpenTransport => self.open_transport(),
            Action::CloseTransport => {
                self.close_transport().await;
                None
            }
            Action::BindSubscriptions => self.bind_subscriptions().await,
            Action::ReleaseSubscriptions => {
                self.release_subscriptions().await;
                None
            }
            Action::ScheduleReconnect(delay) => {
                info!(
                    delay_ms = delay.as_millis() as u64,
                    attempt = self.session.reconnect_attempts(),
                    "Scheduling reconnect"
                );
                self.timer
                    .schedule(delay, self.internal_tx.clone(), |generation| {
                        Internal::RetryTimerFired { generation }
                    });
                None
            }
            Action::CancelReconnect => {
                self.timer.cancel();
                None
            }
        }
    }

    fn open_transport(&mut self) -> Option<ConnectionEvent> {
        self.abort_handshake();
        self.drop_transport();

        let Some(token) = self.credentials.as_ref().and_then(|c| c.token()) else {
            warn!("No bearer token available for the notification service");
            return Some(ConnectionEvent::CredentialRejected);
        };

        self.generation += 1;
        let generation = self.generation;
        let connector = self.connector.clone();
        let url = self.url.clone();
        let timeout = self.handshake_timeout;
        let tx = self.internal_tx.clone();
        let connect_frame = Frame::connect(self.host.clone(), self.heart_beat)
            .with_header("Authorization", format!("Bearer {token}"));

        info!(url = %self.url, generation, "Opening notification transport");
        self.handshake = Some(tokio::spawn(async move {
            let result = establish(connector.as_ref(), &url, connect_frame, timeout).await;
            let _ = tx.send(Internal::Handshake { generation, result });
        }));
        None
    }

    fn install_transport(&mut self, established: Established) {
        let Established {
            transport,
            server_heart_beat,
        } = established;

        self.heartbeat = self
            .heart_beat
            .negotiate_outgoing(&server_heart_beat)
            .map(|period| {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval
            });
        self.transport = Some(transport);
        info!(url = %self.url, "Connected to notification service");
    }

    async fn close_transport(&mut self) {
        self.abort_handshake();
        self.heartbeat = None;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.send(Frame::disconnect(None)).await {
                debug!(error = %e, "Failed to send DISCONNECT");
            }
            close_quietly(transport.as_mut()).await;
            info!("Notification transport closed");
        }
    }

    /// Records belong to the signed-in user and go with their session.
    fn end_authenticated_session(&mut self) {
        self.credentials = None;
        self.center.clear_all();
    }

    /// Forget a transport that is already gone.
    fn drop_transport(&mut self) {
        self.heartbeat = None;
        self.transport = None;
    }

    fn abort_handshake(&mut self) {
        if let Some(handle) = self.handshake.take() {
            handle.abort();
        }
    }

    async fn bind_subscriptions(&mut self) -> Option<ConnectionEvent> {
        let user = self.credentials.as_ref().and_then(|c| c.user());
        let frames = match self.router.bind(user.as_ref().map(|u| u.username.as_str())) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "Failed to bind subscriptions");
                return Some(ConnectionEvent::SubscriptionFailed);
            }
        };

        let Some(transport) = self.transport.as_mut() else {
            self.router.invalidate();
            return Some(ConnectionEvent::SubscriptionFailed);
        };
        for frame in frames {
            if let Err(e) = transport.send(frame).await {
                warn!(error = %e, "Failed to send SUBSCRIBE");
                return Some(ConnectionEvent::SubscriptionFailed);
            }
        }
        None
    }

    async fn release_subscriptions(&mut self) {
        match self.transport.as_mut() {
            Some(transport) => {
                for frame in self.router.unbind() {
                    if transport.send(frame).await.is_err() {
                        break;
                    }
                }
            }
            None => self.router.invalidate(),
        }
    }
}

impl Drop for ConnectionActor {
    fn drop(&mut self) {
        self.abort_handshake();
    }
}

/// Open the transport and run the STOMP CONNECT handshake.
async fn establish(
    connector: &dyn Connector,
    url: &Url,
    connect_frame: Frame,
    timeout: Duration,
) -> Result<Established> {
    let mut transport = connector.open(url).await?;
    transport.send(connect_frame).await?;

    let reply = match tokio::time::timeout(timeout, first_frame(transport.as_mut())).await {
        Ok(reply) => reply?,
        Err(_) => {
            close_quietly(transport.as_mut()).await;
            return Err(NotificationError::connection(
                "timed out waiting for CONNECTED",
            ));
        }
    };

    match reply.command {
        Command::Connected => {
            debug!(
                version = reply.header("version").unwrap_or("?"),
                server = reply.header("server").unwrap_or("?"),
                "STOMP session established"
            );
            let server_heart_beat = reply.heart_beat().ok().flatten().unwrap_or_default();
            Ok(Established {
                transport,
                server_heart_beat,
            })
        }
        Command::Error => {
            let reason = reply
                .header("message")
                .map(str::to_string)
                .unwrap_or_else(|| reply.body_str().unwrap_or_default().to_string());
            close_quietly(transport.as_mut()).await;
            Err(NotificationError::credential_rejected(reason))
        }
        other => {
            close_quietly(transport.as_mut()).await;
            Err(NotificationError::connection(format!(
                "expected CONNECTED, got {other}"
            )))
        }
    }
}

async fn first_frame(transport: &mut dyn TransportSession) -> Result<Frame> {
    loop {
        match transport.next_item().await {
            Some(Ok(StompItem::Frame(frame))) => return Ok(frame),
            Some(Ok(StompItem::Heartbeat)) => continue,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(NotificationError::connection(
                    "transport closed during handshake",
                ));
            }
        }
    }
}

async fn close_quietly(transport: &mut dyn TransportSession) {
    if tokio::time::timeout(CLOSE_TIMEOUT, transport.close())
        .await
        .is_err()
    {
        debug!("Transport close timed out");
    }
}

async fn next_item(transport: &mut Option<Box<dyn TransportSession>>) -> Option<Result<StompItem>> {
    match transport {
        Some(transport) => transport.next_item().await,
        None => std::future::pending().await,
    }
}

async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
