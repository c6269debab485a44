//! Connection lifecycle.
//!
//! Owns the state machine that brings the transport up, survives
//! disconnects, and recovers or wipes credentials depending on the close
//! cause:
//!
//! INIT -> AWAITING_QR | AWAITING_PAIRING -> CONNECTED
//!      -> CLOSED_RECOVERABLE | CLOSED_LOGGED_OUT -> INIT
//!
//! Transitions are driven by the transport's raw event stream; everything
//! observable leaves through the internal bus. Background failures never
//! propagate to callers; they surface as `auth.failure` events.

use crate::error::PairingError;
use crate::events::{Event, EventBus, UpdateReason};
use crate::pipeline::{MessageLookup, Normalizer};
use crate::store::CredStore;
use crate::transport::{
    ConnectionPhase, ConnectionUpdate, Connector, DisconnectReason, Identity, OutgoingContent,
    SendResponse, Transport, TransportEvent,
};
use crate::types::Jid;
use crate::{error::SendError, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Device-linking mechanism for the unauthenticated phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkMode {
    Qr,
    Pairing,
}

/// Options for one bot session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Store key for this bot identity.
    pub session_name: String,
    pub link_mode: LinkMode,
    /// Required for pairing mode.
    pub phone_number: Option<String>,
    /// Running embedded inside a host bot framework; affects sender display
    /// formatting. Supplied explicitly by the embedding caller.
    pub embedded: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            session_name: "bot".to_string(),
            link_mode: LinkMode::Qr,
            phone_number: None,
            embedded: false,
        }
    }
}

/// Observable connection state. Mutated only by the manager; everyone else
/// reads snapshots.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub connected: bool,
    pub qr_code: Option<String>,
    pub qr_issued_at: Option<DateTime<Utc>>,
    pub pairing_code: Option<String>,
    pub pairing_issued_at: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub identity: Option<Identity>,
}

/// The lifecycle manager. Held in an `Arc`; close handling re-enters INIT
/// from spawned tasks.
pub struct SessionManager {
    options: RwLock<SessionOptions>,
    store: CredStore,
    connector: Arc<dyn Connector>,
    lookup: Arc<dyn MessageLookup>,
    bus: EventBus,
    state: RwLock<ConnectionState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl SessionManager {
    pub fn new(
        options: SessionOptions,
        store: CredStore,
        connector: Arc<dyn Connector>,
        lookup: Arc<dyn MessageLookup>,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            options: RwLock::new(options),
            store,
            connector,
            lookup,
            bus,
            state: RwLock::new(ConnectionState::default()),
            transport: RwLock::new(None),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Snapshot of the connection state.
    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// INIT: load credentials and open a transport handshake.
    ///
    /// A synchronous handshake failure emits `auth.failure` and halts this
    /// attempt; recovery is up to the operator. There is deliberately no
    /// mutual exclusion here: a close arriving while a prior attempt is
    /// still suspended on I/O can run a second INIT concurrently.
    // Returns a boxed future with an explicit `Send` bound rather than an
    // `async fn`'s opaque return type. This breaks the auto-trait inference
    // cycle introduced by the recursive restart
    // (start -> run -> handle_connection_update -> spawn -> start).
    pub fn start(self: &Arc<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        let this = Arc::clone(self);
        Box::pin(async move {
            let options = this.options.read().await.clone();

            let credentials = match this.store.load(&options.session_name).await {
                Ok(credentials) => credentials,
                Err(e) => {
                    this.auth_failure(format!("credential load failed: {e}")).await;
                    return;
                }
            };

            let transport = match this.connector.connect(credentials).await {
                Ok(transport) => transport,
                Err(e) => {
                    this.auth_failure(e.to_string()).await;
                    return;
                }
            };
            let events = transport.subscribe();
            *this.transport.write().await = Some(Arc::clone(&transport));

            if options.link_mode == LinkMode::Pairing {
                let phone = options.phone_number.clone().unwrap_or_default();
                if phone.is_empty() {
                    this.auth_failure(PairingError::MissingPhoneNumber.to_string())
                        .await;
                    return;
                }
                this.state.write().await.phone_number = Some(phone);
            }

            info!(session = %options.session_name, mode = ?options.link_mode, "session initializing");
            let manager = Arc::clone(&this);
            tokio::spawn(manager.run(transport, events));
        })
    }

    /// Event loop for one transport handle. Ends when the handle closes or
    /// its stream goes away.
    async fn run(
        self: Arc<Self>,
        transport: Arc<dyn Transport>,
        mut events: broadcast::Receiver<TransportEvent>,
    ) {
        let mut pairing_requested = false;
        let mut pipeline_attached = false;
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "lifecycle event stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                TransportEvent::ConnectionUpdate(update) => {
                    let keep_running = self
                        .handle_connection_update(
                            &transport,
                            update,
                            &mut pairing_requested,
                            &mut pipeline_attached,
                        )
                        .await;
                    if !keep_running {
                        break;
                    }
                }
                TransportEvent::CredentialsUpdate(credentials) => {
                    let session = self.options.read().await.session_name.clone();
                    if let Err(e) = self.store.save(&session, &credentials).await {
                        warn!(error = %e, "failed to persist rotated credentials");
                    }
                }
                // Message streams are consumed by the pipeline subscription.
                TransportEvent::MessagesUpsert { .. } | TransportEvent::MessagesUpdate { .. } => {}
            }
        }
    }

    /// One `connection.update` notification. Returns false when the handle
    /// is done and a re-INIT has been scheduled.
    async fn handle_connection_update(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        update: ConnectionUpdate,
        pairing_requested: &mut bool,
        pipeline_attached: &mut bool,
    ) -> bool {
        if let Some(code) = update.qr {
            let options = self.options.read().await.clone();
            match options.link_mode {
                // The first challenge signal is the cue that the transport
                // is ready to hand out a pairing code.
                LinkMode::Pairing if !*pairing_requested => {
                    *pairing_requested = true;
                    let phone = options.phone_number.clone().unwrap_or_default();
                    match transport.request_pairing_code(&phone).await {
                        Ok(pairing) => {
                            info!("pairing code issued");
                            {
                                let mut state = self.state.write().await;
                                state.pairing_code = Some(pairing.clone());
                                state.pairing_issued_at = Some(Utc::now());
                            }
                            self.bus.publish(Event::PairingCode { code: pairing });
                        }
                        Err(e) => {
                            self.auth_failure(PairingError::RequestFailed(e.to_string()).to_string())
                                .await;
                        }
                    }
                }
                LinkMode::Pairing => {}
                LinkMode::Qr => {
                    info!("qr challenge received");
                    {
                        let mut state = self.state.write().await;
                        state.qr_code = Some(code.clone());
                        state.qr_issued_at = Some(Utc::now());
                    }
                    self.bus.publish(Event::Qr { code });
                }
            }
        }

        match update.connection {
            Some(ConnectionPhase::Open) => {
                // Attach the normalization pipeline on the first open of
                // this handle; messages delivered earlier are not observed.
                if !*pipeline_attached {
                    *pipeline_attached = true;
                    let embedded = self.options.read().await.embedded;
                    let normalizer =
                        Normalizer::new(self.bus.clone(), Arc::clone(&self.lookup), embedded);
                    tokio::spawn(normalizer.run(transport.subscribe()));
                }
                let identity = transport.identity().await;
                {
                    let mut state = self.state.write().await;
                    state.connected = true;
                    state.qr_code = None;
                    state.qr_issued_at = None;
                    state.pairing_code = None;
                    state.pairing_issued_at = None;
                    state.identity = identity;
                }
                info!("session ready");
                self.bus.publish(Event::Ready);
                true
            }
            Some(ConnectionPhase::Close) => {
                let reason = update.status.and_then(DisconnectReason::from_code);
                let logged_out = reason.is_some_and(|r| r.is_logged_out());
                self.state.write().await.connected = false;
                warn!(status = ?update.status, logged_out, "transport closed");

                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    if logged_out {
                        let session = manager.options.read().await.session_name.clone();
                        if let Err(e) = manager.store.wipe(&session).await {
                            error!(error = %e, "credential wipe failed");
                        }
                    }
                    // Immediate re-entry, no backoff: a persistent failure
                    // loops tightly through INIT.
                    manager.start().await;
                });
                false
            }
            None => true,
        }
    }

    /// Operator-initiated logout. Clears the volatile state, attempts a
    /// graceful transport logout (failures are logged, not propagated), and
    /// emits `connection.update` with reason `manual_logout`. The automatic
    /// logged-out close path never emits this.
    pub async fn logout(&self) {
        {
            let mut state = self.state.write().await;
            state.connected = false;
            state.identity = None;
            state.qr_code = None;
            state.qr_issued_at = None;
            state.pairing_code = None;
            state.pairing_issued_at = None;
        }
        let transport = self.transport.read().await.clone();
        if let Some(transport) = transport {
            if let Err(e) = transport.logout().await {
                warn!(error = %e, "graceful transport logout failed");
            }
        }
        info!("manual logout");
        self.bus.publish(Event::ConnectionUpdate {
            reason: UpdateReason::ManualLogout,
        });
    }

    /// Replace the current transport handle entirely and re-enter INIT,
    /// optionally under a new link mode. Not a state within the primary
    /// machine, a forced re-entry.
    pub async fn reconnect(self: &Arc<Self>, mode: Option<LinkMode>, phone_number: Option<String>) {
        {
            let mut options = self.options.write().await;
            if let Some(mode) = mode {
                options.link_mode = mode;
            }
            if phone_number.is_some() {
                options.phone_number = phone_number;
            }
        }
        *self.transport.write().await = None;
        {
            let mut state = self.state.write().await;
            state.qr_code = None;
            state.qr_issued_at = None;
            state.pairing_code = None;
            state.pairing_issued_at = None;
        }
        info!("manual reconnect");
        self.start().await;
    }

    /// Send a text message through the current transport.
    ///
    /// The handle is captured at call time; a reconnect that swaps it while
    /// this call is suspended silently targets the stale handle.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<SendResponse> {
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or(Error::NotConnected)?;
        let jid = Jid::from_phone(to)
            .ok_or_else(|| SendError::InvalidRecipient(to.to_string()))?;
        transport
            .send_message(
                &jid,
                OutgoingContent::Text {
                    body: body.to_string(),
                },
                None,
            )
            .await
    }

    async fn auth_failure(&self, message: String) {
        error!(%message, "auth failure");
        self.state.write().await.connected = false;
        self.bus.publish(Event::AuthFailure { message });
    }
}
