//! In-memory STOMP broker used to drive the connection manager in tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use storefront_notifications::stomp_codec::{Command, Frame, StompItem};
use storefront_notifications::{
    AuthenticatedUser, ConnectionState, Connector, NotificationConfig, NotificationError,
    NotificationService, Result, SessionCredentials, TransportSession,
};
use tokio::sync::{mpsc, watch};
use url::Url;

pub const TOKEN: &str = "token-1";

enum ServerEvent {
    Item(StompItem),
    Close,
}

struct LiveSession {
    id: usize,
    tx: mpsc::UnboundedSender<ServerEvent>,
    subscriptions: Vec<(String, String)>,
}

#[derive(Default)]
struct ServerState {
    accepted_token: Option<String>,
    fail_opens: usize,
    server_heart_beat: Option<String>,

    opens: usize,
    next_session: usize,
    live: Vec<LiveSession>,
    max_live: usize,
    received: Vec<Frame>,
    heartbeats: usize,
}

/// Fake notification service. Cloning shares the broker.
#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        let server = Self::default();
        server.state.lock().accepted_token = Some(TOKEN.to_string());
        server
    }

    /// Accept any token, or only `token`.
    pub fn accept_token(&self, token: Option<&str>) {
        self.state.lock().accepted_token = token.map(str::to_string);
    }

    /// Fail the next `n` transport opens.
    pub fn fail_next_opens(&self, n: usize) {
        self.state.lock().fail_opens = n;
    }

    pub fn advertise_heart_beat(&self, value: &str) {
        self.state.lock().server_heart_beat = Some(value.to_string());
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn max_live_sessions(&self) -> usize {
        self.state.lock().max_live
    }

    pub fn heartbeats(&self) -> usize {
        self.state.lock().heartbeats
    }

    pub fn received(&self, command: Command) -> Vec<Frame> {
        self.state
            .lock()
            .received
            .iter()
            .filter(|f| f.command == command)
            .cloned()
            .collect()
    }

    /// Destinations subscribed on the live sessions.
    pub fn subscribed_destinations(&self) -> Vec<String> {
        self.state
            .lock()
            .live
            .iter()
            .flat_map(|s| s.subscriptions.iter().map(|(_, d)| d.clone()))
            .collect()
    }

    /// Publish a JSON body to every live subscriber of `destination`.
    pub fn deliver(&self, destination: &str, body: &str) -> usize {
        let state = self.state.lock();
        let mut delivered = 0;
        for session in &state.live {
            for (id, dest) in &session.subscriptions {
                if dest != destination {
                    continue;
                }
                let frame = Frame::new(Command::Message)
                    .with_header("destination", dest.clone())
                    .with_header("subscription", id.clone())
                    .with_header("message-id", format!("m-{delivered}"))
                    .with_body(body.to_string());
                if session
                    .tx
                    .send(ServerEvent::Item(StompItem::Frame(frame)))
                    .is_ok()
                {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Simulate the server dropping every connection.
    pub fn drop_connections(&self) {
        let mut state = self.state.lock();
        for session in state.live.drain(..) {
            let _ = session.tx.send(ServerEvent::Close);
        }
    }

    fn on_client_frame(&self, session_id: usize, frame: Frame) {
        let mut state = self.state.lock();
        state.received.push(frame.clone());

        let accepted_token = state.accepted_token.clone();
        let heart_beat = state
            .server_heart_beat
            .clone()
            .unwrap_or_else(|| "0,0".to_string());
        let Some(session) = state.live.iter_mut().find(|s| s.id == session_id) else {
            return;
        };

        match frame.command {
            Command::Connect | Command::Stomp => {
                let authorized = match &accepted_token {
                    None => true,
                    Some(token) => {
                        frame.header("Authorization") == Some(format!("Bearer {token}").as_str())
                    }
                };
                let reply = if authorized {
                    Frame::new(Command::Connected)
                        .with_header("version", "1.2")
                        .with_header("heart-beat", heart_beat)
                } else {
                    Frame::new(Command::Error).with_header("message", "Invalid token")
                };
                let _ = session.tx.send(ServerEvent::Item(StompItem::Frame(reply)));
            }
            Command::Subscribe => {
                if let (Some(id), Some(dest)) = (frame.header("id"), frame.header("destination")) {
                    session.subscriptions.push((id.to_string(), dest.to_string()));
                }
            }
            Command::Unsubscribe => {
                if let Some(id) = frame.header("id") {
                    session.subscriptions.retain(|(sub, _)| sub != id);
                }
            }
            _ => {}
        }
    }

    fn release(&self, session_id: usize) {
        self.state.lock().live.retain(|s| s.id != session_id);
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn open(&self, _url: &Url) -> Result<Box<dyn TransportSession>> {
        let mut state = self.state.lock();
        state.opens += 1;
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(NotificationError::connection("connection refused"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.next_session;
        state.next_session += 1;
        state.live.push(LiveSession {
            id,
            tx,
            subscriptions: Vec::new(),
        });
        state.max_live = state.max_live.max(state.live.len());

        Ok(Box::new(MockSession {
            id,
            server: self.clone(),
            rx,
        }))
    }
}

struct MockSession {
    id: usize,
    server: MockServer,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

#[async_trait]
impl TransportSession for MockSession {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.server.on_client_frame(self.id, frame);
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        self.server.state.lock().heartbeats += 1;
        Ok(())
    }

    async fn next_item(&mut self) -> Option<Result<StompItem>> {
        match self.rx.recv().await? {
            ServerEvent::Item(item) => Some(Ok(item)),
            ServerEvent::Close => None,
        }
    }

    async fn close(&mut self) {
        self.server.release(self.id);
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.server.release(self.id);
    }
}

pub fn credentials() -> Arc<SessionCredentials> {
    Arc::new(SessionCredentials::new(
        TOKEN,
        Some(AuthenticatedUser {
            id: "7".to_string(),
            username: "reader".to_string(),
        }),
    ))
}

pub fn service(server: &MockServer) -> NotificationService {
    NotificationService::with_connector(NotificationConfig::default(), Arc::new(server.clone()))
        .expect("default config is valid")
}

pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .expect("connection manager stopped");
}

/// Poll `cond` until it holds, letting the actor run in between.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

/// Let spawned tasks run without moving the clock far.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn payload(id: Option<&str>, kind: &str, message: &str) -> String {
    let mut value = serde_json::json!({
        "type": kind,
        "title": "Update",
        "message": message,
    });
    if let Some(id) = id {
        value["id"] = serde_json::Value::String(id.to_string());
    }
    value.to_string()
}
