//! Inbound event normalization.
//!
//! Consumes the raw transport stream once a connection is live and turns
//! heterogeneous protocol notifications into [`CanonicalMessage`]s on the
//! internal bus, filtering noise (history replays, broadcast/status chatter,
//! self-echo, malformed senders). This stage never fails: anything it cannot
//! classify falls back to the default text classification, and anything it
//! cannot accept is silently dropped.

use crate::events::{CanonicalMessage, Event, EventBus, MessageKind};
use crate::transport::{
    BatchKind, MessageBatch, MessageKey, MessageUpdate, PollMessage, PollVote, RawMessage,
    TransportEvent,
};
use crate::types::{self, STATUS_BROADCAST_ADDR};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Resolves a previously seen message by key. Poll-vote aggregation needs the
/// original poll creation to recover option labels.
#[async_trait]
pub trait MessageLookup: Send + Sync {
    async fn get_message(&self, key: &MessageKey) -> Option<PollMessage>;
}

/// Message lookup with no backing store: always resolves an empty poll.
/// Vote aggregation over it can never recover real option labels, so the
/// emitted poll body degrades to an empty string.
pub struct NullMessageLookup;

#[async_trait]
impl MessageLookup for NullMessageLookup {
    async fn get_message(&self, _key: &MessageKey) -> Option<PollMessage> {
        Some(PollMessage::default())
    }
}

/// The normalization pipeline. One instance is attached per live connection.
pub struct Normalizer {
    bus: EventBus,
    lookup: Arc<dyn MessageLookup>,
    /// Embedded-plugin mode: changes the display form of user senders.
    embedded: bool,
}

impl Normalizer {
    pub fn new(bus: EventBus, lookup: Arc<dyn MessageLookup>, embedded: bool) -> Self {
        Self {
            bus,
            lookup,
            embedded,
        }
    }

    /// Drive the pipeline over a raw event subscription until the transport
    /// handle goes away.
    pub async fn run(self, mut events: broadcast::Receiver<TransportEvent>) {
        loop {
            match events.recv().await {
                Ok(TransportEvent::MessagesUpsert { batch }) => self.handle_upsert(batch),
                Ok(TransportEvent::MessagesUpdate { updates }) => {
                    self.handle_updates(updates).await
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "raw event stream lagged, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Inbound message batches. Only live notifications are considered, and
    /// only the first message of a batch is examined; the tail is ignored
    /// for compatibility with the upstream behavior.
    fn handle_upsert(&self, batch: MessageBatch) {
        if batch.kind != BatchKind::Notify {
            return;
        }
        let Some(raw) = batch.messages.into_iter().next() else {
            return;
        };
        if let Some(message) = self.normalize(raw) {
            debug!(from = %message.from, kind = message.kind.as_str(), "message accepted");
            self.bus.publish(Event::Message(message));
        }
    }

    /// Normalize one raw message, or drop it.
    ///
    /// Classification is a fixed sequence of unconditional overwrites with
    /// no early exit, so a message matching several media predicates takes
    /// the last matching kind in this order, not the most specific one.
    fn normalize(&self, raw: RawMessage) -> Option<CanonicalMessage> {
        let content = &raw.content;

        // Default: literal text when present, stub body otherwise.
        let mut body = content
            .extended_text
            .clone()
            .or_else(|| content.conversation.clone())
            .unwrap_or_default();
        let mut kind = MessageKind::Text;

        // Poll-vote envelopes travel through the update stream instead.
        if content.poll_update {
            return None;
        }

        let from_raw = raw.key.remote_jid.clone().unwrap_or_default();

        // Status feed chatter.
        if from_raw == STATUS_BROADCAST_ADDR {
            return None;
        }

        // Our own echo.
        if raw.key.from_me {
            return None;
        }

        if let Some(location) = &content.location {
            if location.latitude.is_some() && location.longitude.is_some() {
                kind = MessageKind::Location;
                body = event_ref("_event_location_");
            }
        }
        if content.image.is_some() {
            kind = MessageKind::Image;
            body = event_ref("_event_media_");
        }
        if content.document.is_some() {
            kind = MessageKind::File;
            body = event_ref("_event_document_");
        }
        if content.audio.is_some() {
            kind = MessageKind::Voice;
            body = event_ref("_event_voice_note_");
        }

        // Sender must be a user or group chat address.
        let sender = types::validate_sender(&from_raw)?;

        // Interactive responses replace whatever the classification chose.
        if let Some(label) = &content.buttons_response {
            body = label.clone();
        }
        if let Some(label) = &content.list_response {
            body = label.clone();
        }

        let from = types::display_sender(&sender, self.embedded);
        Some(CanonicalMessage {
            from,
            body,
            kind,
            raw: Arc::new(raw),
        })
    }

    /// Poll-vote deltas: resolve the original poll, tally, and emit the
    /// currently-voted option label.
    async fn handle_updates(&self, updates: Vec<MessageUpdate>) {
        for update in updates {
            if update.poll_updates.is_empty() {
                continue;
            }
            let Some(poll) = self.lookup.get_message(&update.key).await else {
                continue;
            };
            let tallies = aggregate_votes(&poll, &update.poll_updates);
            let body = tallies
                .iter()
                .find(|tally| !tally.voters.is_empty())
                .map(|tally| tally.name.clone())
                .unwrap_or_default();

            let from_raw = update.key.remote_jid.clone().unwrap_or_default();
            let from = types::validate_sender(&from_raw)
                .map(|jid| types::display_sender(&jid, self.embedded))
                .unwrap_or_default();

            let raw = RawMessage {
                key: update.key,
                ..Default::default()
            };
            self.bus.publish(Event::Message(CanonicalMessage {
                from,
                body,
                kind: MessageKind::Poll,
                raw: Arc::new(raw),
            }));
        }
    }
}

/// Per-option vote tally.
#[derive(Clone, Debug)]
pub struct PollTally {
    pub name: String,
    pub voters: Vec<String>,
}

/// Aggregate vote deltas against a poll's option list.
pub fn aggregate_votes(poll: &PollMessage, votes: &[PollVote]) -> Vec<PollTally> {
    poll.options
        .iter()
        .map(|name| PollTally {
            name: name.clone(),
            voters: votes
                .iter()
                .filter(|vote| vote.selected.iter().any(|s| s == name))
                .map(|vote| vote.voter.clone())
                .collect(),
        })
        .collect()
}

/// Synthetic marker body: a well-known prefix plus a unique ref, so button
/// flows can match on the prefix while each event stays distinguishable.
fn event_ref(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}
