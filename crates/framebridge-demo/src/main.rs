//! framebridge-demo: pairs an initiator with an embedded responder over the
//! in-process host and walks through `get`, `call` and event emission.
//!
//! Usage: framebridge-demo [ADDRESS]

use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use framebridge::{BridgeConfig, Initiator, LocalHost, Member, Model, Origin, Responder};

const PARENT_ORIGIN: &str = "https://parent.example";
const DEFAULT_ADDRESS: &str = "https://child.example/frame.html";

#[derive(Debug, Serialize, Deserialize)]
struct Ready {
    count: u32,
}

fn responder_model() -> Model {
    Model::new()
        .with("greeting", json!("hi"))
        .with(
            "double",
            Member::function(|x: Value| {
                let doubled = x.as_i64().unwrap_or(0) * 2;
                tracing::info!(input = %x, doubled, "responder: double invoked");
                json!(doubled)
            }),
        )
        .with(
            "slow_answer",
            Member::async_function(|_| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                json!(42)
            }),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let written = BridgeConfig::write_default_if_missing();
    let loaded = BridgeConfig::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = &written {
        tracing::warn!(error = %e, "failed to write default config");
    }
    if let Err(e) = &loaded {
        tracing::warn!(error = %e, "failed to load config, using defaults");
    }

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    tracing::info!(%address, "framebridge demo starting");

    // Embedded page script: build the responder and hand its API back.
    let host = LocalHost::with_capacity(Origin::parse(PARENT_ORIGIN), config.channel.inbox_capacity, true);
    let (child_tx, mut child_rx) = mpsc::unbounded_channel();
    {
        let config = config.clone();
        host.serve(address.clone(), move |ctx| {
            let responder = Responder::new(ctx, responder_model(), &config);
            let child_tx = child_tx.clone();
            tokio::spawn(async move {
                match responder.accept().await {
                    Ok(api) => {
                        let _ = child_tx.send(api);
                    }
                    Err(e) => tracing::error!(error = %e, "responder failed to pair"),
                }
            });
        });
    }

    let parent = Initiator::new(&config)
        .default_value("theme", "dark")?
        .connect(&host, &address)
        .await
        .context("handshake failed")?;
    tracing::info!(child = %parent.child_origin(), "paired");

    let child = child_rx.recv().await.context("responder never paired")?;

    let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
    parent.on("ready", move |ready: Ready| {
        let _ = ready_tx.send(ready);
    });

    let greeting: String = parent.get("greeting").await?;
    tracing::info!(%greeting, "get greeting");

    parent.call("double", 21)?;

    let answer: u32 = parent.get("slow_answer").await?;
    tracing::info!(answer, "get slow_answer");

    let theme: String = parent.get("theme").await?;
    tracing::info!(%theme, "get theme (initiator default)");

    child.emit("ready", Ready { count: 3 })?;
    let ready = ready_rx.recv().await.context("ready event never arrived")?;
    tracing::info!(count = ready.count, "received ready event");

    parent.destroy();
    tracing::info!(attached = host.attached(), "demo finished");
    Ok(())
}
