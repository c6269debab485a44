//! Basic example: boot the bridge with the in-memory store and the stub
//! transport, print bus events, and expose the control surface.
//!
//! Run with: `cargo run --example basic`

use std::net::SocketAddr;
use std::sync::Arc;
use wabridge::http::{serve, AppState};
use wabridge::pipeline::NullMessageLookup;
use wabridge::service::spawn_event_relay;
use wabridge::transport::StubConnector;
use wabridge::{Event, EventBus, MemoryStore, SessionManager, SessionOptions, WebhookDispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Qr { code } => {
                    println!("[Event] QR challenge (scan with WhatsApp Linked Devices): {code}");
                }
                Event::PairingCode { code } => println!("[Event] Pairing code: {code}"),
                Event::Ready => println!("[Event] Connected and logged in."),
                Event::AuthFailure { message } => println!("[Event] Auth failure: {message}"),
                Event::Message(msg) => println!("[Event] {}: {}", msg.from, msg.body),
                _ => {}
            }
        }
    });

    let webhook = Arc::new(WebhookDispatcher::new());
    let session = SessionManager::new(
        SessionOptions::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(StubConnector),
        Arc::new(NullMessageLookup),
        bus.clone(),
    );
    let _relay = spawn_event_relay(&bus, Arc::clone(&webhook));

    println!("Connecting...");
    session.start().await;

    let addr: SocketAddr = "127.0.0.1:3000".parse()?;
    println!("Control surface on http://{addr}");
    serve(
        AppState {
            session,
            webhook,
            api_key: std::env::var("API_KEY").ok(),
        },
        addr,
    )
    .await
}
