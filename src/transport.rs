//! Transport facade boundary.
//!
//! The wire protocol, key exchange, and multi-device sync live behind these
//! traits. Implement [`Connector`]/[`Transport`] to plug in a real protocol
//! client; the bridge consumes them as opaque capabilities: a connect
//! handshake, a raw inbound event stream, and send/query calls.

use crate::store::Credentials;
use crate::types::{Jid, MessageId};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use sha2::Digest;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Raw event stream capacity. Lagging consumers drop old events rather than
/// applying backpressure to the protocol client.
pub const EVENT_STREAM_CAPACITY: usize = 256;

/// Async trait for a live protocol connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to the raw inbound event stream. Each call returns a fresh
    /// subscription that only observes events published after this point.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Send a message to a chat.
    async fn send_message(
        &self,
        to: &Jid,
        content: OutgoingContent,
        extra: Option<SendRequestExtra>,
    ) -> Result<SendResponse>;

    /// Request a pairing code for phone-number linking. Valid once the
    /// transport has issued its first link challenge.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String>;

    /// Gracefully unpair and close.
    async fn logout(&self) -> Result<()>;

    /// Identity of the linked account, if authenticated.
    async fn identity(&self) -> Option<Identity>;
}

/// Opens transport handshakes. One connector is held per bridge; every
/// (re)connect yields a brand-new handle.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credentials: Option<Credentials>) -> Result<Arc<dyn Transport>>;
}

/// Identity of the linked account.
#[derive(Clone, Debug, Serialize)]
pub struct Identity {
    pub id: Jid,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

/// Raw inbound events published by a transport handle.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// Link challenge, open, or close notifications.
    ConnectionUpdate(ConnectionUpdate),
    /// A batch of inbound messages.
    MessagesUpsert { batch: MessageBatch },
    /// In-place updates to known messages (poll-vote deltas).
    MessagesUpdate { updates: Vec<MessageUpdate> },
    /// Credential rotation; the new material must be persisted.
    CredentialsUpdate(Credentials),
}

/// Connection phase reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    Open,
    Close,
}

/// One `ConnectionUpdate` notification. Fields are independent: a QR
/// challenge can arrive with no phase change, a close carries a status code.
#[derive(Clone, Debug, Default)]
pub struct ConnectionUpdate {
    pub connection: Option<ConnectionPhase>,
    /// Link challenge payload; recurs roughly every sixty seconds until
    /// consumed.
    pub qr: Option<String>,
    /// Status code on close.
    pub status: Option<u32>,
}

/// Whether a message batch is a live notification or replayed history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchKind {
    Notify,
    Replay,
}

#[derive(Clone, Debug)]
pub struct MessageBatch {
    pub kind: BatchKind,
    pub messages: Vec<RawMessage>,
}

/// Heterogeneous protocol notification, decrypted but otherwise uninterpreted.
/// Retained by canonical messages for quoting/forwarding through the facade.
#[derive(Clone, Debug, Default)]
pub struct RawMessage {
    pub key: MessageKey,
    pub push_name: Option<String>,
    pub content: RawContent,
}

#[derive(Clone, Debug, Default)]
pub struct MessageKey {
    pub remote_jid: Option<String>,
    pub from_me: bool,
    pub id: MessageId,
}

/// The content families a protocol message can carry. A single message may
/// populate several of them (e.g. an attachment plus caption text).
#[derive(Clone, Debug, Default)]
pub struct RawContent {
    pub conversation: Option<String>,
    pub extended_text: Option<String>,
    pub location: Option<RawLocation>,
    pub image: Option<RawAttachment>,
    pub document: Option<RawAttachment>,
    pub audio: Option<RawAttachment>,
    /// Set when the message is itself a poll-vote-update envelope.
    pub poll_update: bool,
    /// Display label of a pressed quick-reply button.
    pub buttons_response: Option<String>,
    /// Title of a selected list row.
    pub list_response: Option<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RawLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct RawAttachment {
    pub mimetype: Option<String>,
    pub url: Option<String>,
    pub caption: Option<String>,
}

/// In-place update to a known message.
#[derive(Clone, Debug)]
pub struct MessageUpdate {
    pub key: MessageKey,
    pub poll_updates: Vec<PollVote>,
}

/// One voter's current poll selection.
#[derive(Clone, Debug)]
pub struct PollVote {
    pub voter: String,
    pub selected: Vec<String>,
}

/// Poll creation content resolved through a message lookup.
#[derive(Clone, Debug, Default)]
pub struct PollMessage {
    pub question: String,
    pub options: Vec<String>,
}

/// Content families the bridge can send through the facade.
#[derive(Clone, Debug)]
pub enum OutgoingContent {
    Text { body: String },
    Poll { name: String, options: Vec<String> },
}

/// Response from sending a message.
#[derive(Clone, Debug)]
pub struct SendResponse {
    pub id: MessageId,
    pub timestamp: std::time::SystemTime,
    pub sender: Option<Jid>,
}

/// Optional parameters for send_message.
#[derive(Clone, Debug, Default)]
pub struct SendRequestExtra {
    pub id: Option<MessageId>,
    pub timeout: Option<std::time::Duration>,
}

/// Generate a message ID (3EB0 + hex of hash).
pub fn generate_message_id() -> MessageId {
    use std::time::{SystemTime, UNIX_EPOCH};
    let mut data = Vec::with_capacity(8 + 5 + 16);
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    data.extend_from_slice(&t.to_be_bytes());
    data.extend_from_slice(b"@c.us");
    data.extend_from_slice(&rand::random::<[u8; 16]>());
    let hash = sha2::Sha256::digest(&data);
    format!("3EB0{}", hex::encode(&hash[..9]).to_uppercase())
}

/// Close status codes reported by the transport (reason subset of the
/// multidevice protocol's connect-failure codes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum DisconnectReason {
    Generic = 400,
    LoggedOut = 401,
    TempBanned = 402,
    MainDeviceGone = 403,
    ClientOutdated = 405,
    UnknownLogout = 406,
    BadUserAgent = 409,
    NotFound = 415,
    InternalServerError = 500,
    ServiceUnavailable = 503,
    RestartRequired = 515,
}

impl DisconnectReason {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            400 => Some(Self::Generic),
            401 => Some(Self::LoggedOut),
            402 => Some(Self::TempBanned),
            403 => Some(Self::MainDeviceGone),
            405 => Some(Self::ClientOutdated),
            406 => Some(Self::UnknownLogout),
            409 => Some(Self::BadUserAgent),
            415 => Some(Self::NotFound),
            500 => Some(Self::InternalServerError),
            503 => Some(Self::ServiceUnavailable),
            515 => Some(Self::RestartRequired),
            _ => None,
        }
    }

    /// Whether this close means the session was explicitly logged out and
    /// the stored credentials are no longer valid.
    pub fn is_logged_out(&self) -> bool {
        matches!(
            self,
            Self::LoggedOut | Self::MainDeviceGone | Self::UnknownLogout
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::LoggedOut => "logged out from another device",
            Self::TempBanned => "account temporarily banned",
            Self::MainDeviceGone => "primary device was logged out",
            Self::UnknownLogout => "logged out for unknown reason",
            Self::ClientOutdated => "client is out of date",
            Self::BadUserAgent => "client user agent was rejected",
            Self::RestartRequired => "server requested a stream restart",
            _ => "connection failure",
        };
        write!(f, "{} (code {})", msg, *self as u32)
    }
}

/// Stub transport for demos and offline runs: issues a single QR challenge
/// when the credentials are unregistered, opens immediately otherwise, and
/// acknowledges sends without putting anything on a wire. Tests use richer
/// scripted mocks.
pub struct StubTransport {
    events: broadcast::Sender<TransportEvent>,
    identity: Option<Identity>,
}

#[async_trait]
impl Transport for StubTransport {
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn send_message(
        &self,
        _to: &Jid,
        _content: OutgoingContent,
        extra: Option<SendRequestExtra>,
    ) -> Result<SendResponse> {
        let id = extra
            .and_then(|e| e.id)
            .unwrap_or_else(generate_message_id);
        Ok(SendResponse {
            id,
            timestamp: std::time::SystemTime::now(),
            sender: self.identity.as_ref().map(|i| i.id.clone()),
        })
    }

    async fn request_pairing_code(&self, _phone_number: &str) -> Result<String> {
        Ok("STUB-CODE".to_string())
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    async fn identity(&self) -> Option<Identity> {
        self.identity.clone()
    }
}

/// Connector producing [`StubTransport`] handles.
#[derive(Default)]
pub struct StubConnector;

#[async_trait]
impl Connector for StubConnector {
    async fn connect(&self, credentials: Option<Credentials>) -> Result<Arc<dyn Transport>> {
        let (events, _) = broadcast::channel(EVENT_STREAM_CAPACITY);
        let registered = credentials.as_ref().is_some_and(|c| c.is_registered());
        let identity = credentials.and_then(|c| {
            c.id.map(|id| Identity {
                id,
                display_name: c.display_name,
                phone: None,
                avatar_url: None,
            })
        });
        let transport = Arc::new(StubTransport { events, identity });

        // Emit the first lifecycle signal once the caller has had a chance
        // to subscribe.
        let events = transport.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let update = if registered {
                ConnectionUpdate {
                    connection: Some(ConnectionPhase::Open),
                    ..Default::default()
                }
            } else {
                ConnectionUpdate {
                    qr: Some("STUB_QR_CODE".to_string()),
                    ..Default::default()
                }
            };
            let _ = events.send(TransportEvent::ConnectionUpdate(update));
        });

        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_message_id_format() {
        let id = generate_message_id();
        assert!(id.starts_with("3EB0"));
        assert_eq!(id.len(), 4 + 18);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn disconnect_reason_codes() {
        assert_eq!(
            DisconnectReason::from_code(401),
            Some(DisconnectReason::LoggedOut)
        );
        assert!(DisconnectReason::LoggedOut.is_logged_out());
        assert!(DisconnectReason::MainDeviceGone.is_logged_out());
        assert!(!DisconnectReason::RestartRequired.is_logged_out());
        assert!(DisconnectReason::from_code(999).is_none());
    }

    #[tokio::test]
    async fn stub_connector_challenges_unregistered_sessions() {
        let transport = StubConnector.connect(None).await.unwrap();
        let mut rx = transport.subscribe();
        let event = rx.recv().await.unwrap();
        match event {
            TransportEvent::ConnectionUpdate(update) => {
                assert_eq!(update.qr.as_deref(), Some("STUB_QR_CODE"));
                assert!(update.connection.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stub_connector_opens_registered_sessions() {
        let mut creds = Credentials::default();
        creds.id = Some(Jid::new("628123", "s.whatsapp.net"));
        let transport = StubConnector.connect(Some(creds)).await.unwrap();
        let mut rx = transport.subscribe();
        match rx.recv().await.unwrap() {
            TransportEvent::ConnectionUpdate(update) => {
                assert_eq!(update.connection, Some(ConnectionPhase::Open));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(transport.identity().await.is_some());
    }
}
