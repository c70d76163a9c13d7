//! framebridge integration test harness.
//!
//! Every test pairs a real initiator with a real responder over an
//! in-process [`LocalHost`]. Time is paused, so retry spacing and slow
//! model members run on tokio's virtual clock:
//!
//!   cargo test --test integration
//!
//! Each test builds its own host; nothing is shared between tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

pub use framebridge::{
    BridgeConfig, Context, HandshakeError, Host, Initiator, InitiatorApi, LocalHost, Member,
    Model, Origin, Responder, ResponderApi, RpcError, TargetOrigin,
};
pub use framebridge_core::Envelope;

mod handshake;
mod security;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Origin of the initiator's document.
pub const PARENT: &str = "https://parent.example";
/// Address the responder is served at, and its origin.
pub const CHILD_ADDRESS: &str = "https://child.example/frame.html";
pub const CHILD: &str = "https://child.example";

pub fn host() -> LocalHost {
    LocalHost::new(Origin::parse(PARENT))
}

/// Arguments seen by the responder's `double` member, in arrival order.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<Value>>>);

impl Calls {
    pub fn seen(&self) -> Vec<Value> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// The responder model used by most tests.
pub fn example_model(calls: &Calls) -> Model {
    let calls = calls.clone();
    Model::new()
        .with("greeting", json!("hi"))
        .with(
            "double",
            Member::function(move |x: Value| {
                if let Ok(mut seen) = calls.0.lock() {
                    seen.push(x.clone());
                }
                json!(x.as_i64().unwrap_or(0) * 2)
            }),
        )
        .with(
            "slow",
            Member::async_function(|_| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                json!("eventually")
            }),
        )
}

/// Serve a responder built from `model` at `address`. Every load of the
/// address yields one pairing outcome on the returned channel.
pub fn serve_responder<F>(
    host: &LocalHost,
    address: &str,
    config: &BridgeConfig,
    model: F,
) -> mpsc::UnboundedReceiver<Result<ResponderApi, HandshakeError>>
where
    F: Fn() -> Model + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let config = config.clone();
    host.serve(address, move |ctx| {
        let responder = Responder::new(ctx, model(), &config);
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(responder.accept().await);
        });
    });
    rx
}

/// Both ends of a completed pairing.
pub struct Paired {
    pub host: LocalHost,
    pub parent: InitiatorApi<LocalHost>,
    pub child: ResponderApi,
}

/// Pair an initiator offering `defaults` with a responder serving `model`.
pub async fn pair<F>(config: &BridgeConfig, defaults: Map<String, Value>, model: F) -> Result<Paired>
where
    F: Fn() -> Model + Send + Sync + 'static,
{
    let host = host();
    let mut outcomes = serve_responder(&host, CHILD_ADDRESS, config, model);

    let parent = Initiator::new(config)
        .model(defaults)
        .connect(&host, CHILD_ADDRESS)
        .await
        .context("initiator failed to pair")?;
    let child = outcomes
        .recv()
        .await
        .context("responder never finished")?
        .context("responder failed to pair")?;

    Ok(Paired { host, parent, child })
}

/// Let spawned tasks drain on the paused clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Build a JSON object map from a `json!` literal.
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
