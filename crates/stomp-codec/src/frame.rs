use bytes::Bytes;
use std::fmt;
use std::time::Duration;

use crate::error::StompError;

/// STOMP 1.2 frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED frames carry raw header values (no escaping).
    pub(crate) fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl TryFrom<&str> for Command {
    type Error = StompError;

    fn try_from(value: &str) -> Result<Self, StompError> {
        Ok(match value {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(StompError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order. When a header is repeated only the first
/// occurrence is significant, which is what [`Frame::header`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Build a CONNECT frame for STOMP 1.2.
    pub fn connect(host: impl Into<String>, heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", heart_beat.to_string())
    }

    pub fn subscribe(id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: impl Into<String>) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect(receipt: Option<String>) -> Self {
        let frame = Self::new(Command::Disconnect);
        match receipt {
            Some(receipt) => frame.with_header("receipt", receipt),
            None => frame,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `name`, if any.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> Result<&str, StompError> {
        Ok(std::str::from_utf8(&self.body)?)
    }

    /// Server heart-beat settings, if advertised on this frame.
    pub fn heart_beat(&self) -> Result<Option<HeartBeat>, StompError> {
        self.header("heart-beat").map(str::parse).transpose()
    }
}

/// Heart-beat settings in milliseconds, as carried by the `heart-beat` header.
///
/// The first number is what the sender can emit, the second what it wants to receive.
/// Zero means "not supported / not wanted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub const DISABLED: HeartBeat = HeartBeat {
        outgoing_ms: 0,
        incoming_ms: 0,
    };

    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    /// Interval at which the client must send heart-beats, given what the server
    /// advertised in CONNECTED. `None` when either side opted out.
    pub fn negotiate_outgoing(&self, server: &HeartBeat) -> Option<Duration> {
        if self.outgoing_ms == 0 || server.incoming_ms == 0 {
            return None;
        }
        Some(Duration::from_millis(self.outgoing_ms.max(server.incoming_ms)))
    }

    /// Interval at which the server will send heart-beats to the client.
    pub fn negotiate_incoming(&self, server: &HeartBeat) -> Option<Duration> {
        if self.incoming_ms == 0 || server.outgoing_ms == 0 {
            return None;
        }
        Some(Duration::from_millis(self.incoming_ms.max(server.outgoing_ms)))
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing_ms, self.incoming_ms)
    }
}

impl std::str::FromStr for HeartBeat {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StompError::InvalidHeartBeat(s.to_string());
        let (out, inc) = s.split_once(',').ok_or_else(invalid)?;
        let outgoing_ms = out.trim().parse().map_err(|_| invalid())?;
        let incoming_ms = inc.trim().parse().map_err(|_| invalid())?;
        Ok(Self {
            outgoing_ms,
            incoming_ms,
        })
    }
}
