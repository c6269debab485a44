//! Common types.

mod jid;

pub use jid::{
    display_sender, validate_sender, Jid, JidParseError, BROADCAST_SERVER, DEFAULT_USER_SERVER,
    GROUP_SERVER, LEGACY_USER_SERVER, STATUS_BROADCAST_ADDR,
};

/// Message ID (server-assigned or generated).
pub type MessageId = String;
