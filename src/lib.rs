//! # wabridge
//!
//! REST bridge and webhook dispatcher for the WhatsApp web multidevice API.
//!
//! The protocol handshake, end-to-end encryption, and multi-device sync are
//! delegated to an external client consumed through [`transport::Transport`];
//! this crate supplies everything around it:
//!
//! - Session lifecycle: QR/pairing linking, disconnect recovery, credential
//!   persistence and wipe
//! - Inbound event normalization into one canonical message shape
//! - Signed, filtered, at-most-once webhook egress
//! - A thin REST control surface for operators
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wabridge::{EventBus, MemoryStore, SessionManager, SessionOptions};
//! use wabridge::pipeline::NullMessageLookup;
//! use wabridge::transport::StubConnector;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = SessionManager::new(
//!         SessionOptions::default(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(StubConnector),
//!         Arc::new(NullMessageLookup),
//!         EventBus::new(),
//!     );
//!     session.start().await;
//!     // Handle QR or existing session...
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod events;
pub mod http;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;
pub mod webhook;

pub use error::{Error, Result};
pub use events::{CanonicalMessage, Event, EventBus, MessageKind, UpdateReason};
pub use session::{ConnectionState, LinkMode, SessionManager, SessionOptions};
pub use store::{CredStore, CredentialStore, Credentials, FsStore, MemoryStore};
pub use transport::{Connector, Transport};
pub use types::{Jid, MessageId};
pub use webhook::WebhookDispatcher;
