use crate::*;

use std::time::Duration;

use framebridge_core::model::MergePolicy;
use serde_json::json;
use tokio::time::Instant;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn pairs_and_merges_defaults() -> Result<()> {
    let calls = Calls::default();
    let config = BridgeConfig::default();
    let defaults = object(json!({"greeting": "hello", "theme": "dark"}));

    let Paired { parent, child, .. } = pair(&config, defaults, move || example_model(&calls)).await?;

    assert_eq!(*parent.child_origin(), Origin::parse(CHILD));
    assert_eq!(*child.parent_origin(), Origin::parse(PARENT));

    // The responder's own member survives; the missing one is filled in.
    assert_eq!(parent.get::<String>("greeting").await?, "hi");
    assert_eq!(parent.get::<String>("theme").await?, "dark");
    assert!(child.model().get("theme").is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn initiator_wins_merge_overwrites_responder_members() -> Result<()> {
    let calls = Calls::default();
    let mut config = BridgeConfig::default();
    config.model.merge = MergePolicy::InitiatorWins;
    let defaults = object(json!({"greeting": "hello"}));

    let Paired { parent, .. } = pair(&config, defaults, move || example_model(&calls)).await?;

    assert_eq!(parent.get::<String>("greeting").await?, "hello");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unanswered_offers_stop_after_five_and_detach() -> Result<()> {
    let host = host();
    let start = Instant::now();
    let offers: Arc<Mutex<Vec<Duration>>> = Arc::default();

    // A page that loads but never runs a responder; it only watches.
    {
        let offers = offers.clone();
        host.serve(CHILD_ADDRESS, move |ctx| {
            let mut inbox = ctx.subscribe();
            let offers = offers.clone();
            tokio::spawn(async move {
                while let Ok(msg) = inbox.recv().await {
                    if msg.data["postmate"] == "handshake" {
                        if let Ok(mut seen) = offers.lock() {
                            seen.push(start.elapsed());
                        }
                    }
                }
            });
        });
    }

    let result = Initiator::new(&BridgeConfig::default())
        .connect(&host, CHILD_ADDRESS)
        .await;

    assert!(matches!(result, Err(HandshakeError::Exhausted { attempts: 5 })));
    assert!(start.elapsed() >= Duration::from_millis(2500));
    assert_eq!(host.attached(), 0, "failed pairing must detach the frame");

    let seen = offers.lock().map(|o| o.clone()).unwrap_or_default();
    let expected: Vec<Duration> = (0..5).map(|i| Duration::from_millis(500 * i)).collect();
    assert_eq!(seen, expected);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn configured_retry_budget_is_honoured() -> Result<()> {
    let host = host();
    host.serve(CHILD_ADDRESS, |_| {});

    let mut config = BridgeConfig::default();
    config.handshake.interval_ms = 100;
    config.handshake.max_attempts = 2;

    let start = Instant::now();
    let result = Initiator::new(&config).connect(&host, CHILD_ADDRESS).await;

    assert!(matches!(result, Err(HandshakeError::Exhausted { attempts: 2 })));
    assert!(start.elapsed() < Duration::from_millis(500));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn late_responder_pairs_on_a_later_offer() -> Result<()> {
    let host = host();
    let config = BridgeConfig::default();
    let (tx, mut outcomes) = tokio::sync::mpsc::unbounded_channel();

    {
        let config = config.clone();
        host.serve(CHILD_ADDRESS, move |ctx| {
            let (tx, config) = (tx.clone(), config.clone());
            tokio::spawn(async move {
                // Page script starts well after load.
                tokio::time::sleep(Duration::from_millis(1200)).await;
                let responder = Responder::new(ctx, Model::new().with("greeting", json!("late")), &config);
                let _ = tx.send(responder.accept().await);
            });
        });
    }

    let start = Instant::now();
    let parent = Initiator::new(&config).connect(&host, CHILD_ADDRESS).await?;
    let paired_after = start.elapsed();

    assert!(paired_after >= Duration::from_millis(1500));
    assert!(paired_after < Duration::from_millis(2000));
    let _child = outcomes.recv().await.context("responder never finished")??;
    assert_eq!(parent.get::<String>("greeting").await?, "late");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn waits_for_host_document_before_embedding() -> Result<()> {
    let host = LocalHost::loading(Origin::parse(PARENT));
    let config = BridgeConfig::default();
    let mut outcomes = serve_responder(&host, CHILD_ADDRESS, &config, Model::new);

    let connecting = {
        let (host, config) = (host.clone(), config.clone());
        tokio::spawn(async move {
            Initiator::new(&config)
                .connect(&host, CHILD_ADDRESS)
                .await
                .map(|api| api.child_origin().clone())
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(host.attached(), 0, "nothing is embedded before the host is ready");

    host.mark_ready();
    let child_origin = connecting.await??;
    assert_eq!(child_origin, Origin::parse(CHILD));
    assert!(outcomes.recv().await.context("responder never finished")?.is_ok());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn redirected_content_is_never_paired() -> Result<()> {
    let host = host();
    let config = BridgeConfig::default();
    let (tx, mut outcomes) = tokio::sync::mpsc::unbounded_channel();

    {
        let config = config.clone();
        host.serve_from(CHILD_ADDRESS, Origin::parse("https://elsewhere.example"), move |ctx| {
            let responder = Responder::new(ctx, Model::new(), &config);
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(responder.accept().await);
            });
        });
    }

    let result = Initiator::new(&config).connect(&host, CHILD_ADDRESS).await;

    assert!(matches!(result, Err(HandshakeError::Exhausted { attempts: 5 })));
    assert!(outcomes.try_recv().is_err(), "offers must not reach another origin");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhaustion_without_rejection_stays_pending() -> Result<()> {
    let host = host();
    host.serve(CHILD_ADDRESS, |_| {});

    let mut config = BridgeConfig::default();
    config.handshake.reject_on_exhaustion = false;

    let pending = tokio::time::timeout(
        Duration::from_secs(10),
        Initiator::new(&config).connect(&host, CHILD_ADDRESS),
    )
    .await;

    assert!(pending.is_err(), "pairing should still be pending");
    Ok(())
}
