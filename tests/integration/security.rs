use crate::*;

use serde_json::json;

const IMPOSTOR: &str = "https://impostor.example";

fn impostor() -> Context {
    Context::new(Origin::parse(IMPOSTOR))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn forged_reply_from_third_party_is_ignored() -> Result<()> {
    let calls = Calls::default();
    let Paired { host, parent, child: _child } =
        pair(&BridgeConfig::default(), Map::new(), move || example_model(&calls)).await?;
    let impostor = impostor();

    // First request on a fresh host context carries id 1.
    let forged = Envelope::reply(1, Some("slow".into()), json!("forged")).to_value();
    let (value, ()) = tokio::join!(parent.get::<String>("slow"), async {
        settle().await;
        host.context().post_message(&impostor, forged, &TargetOrigin::Any);
    });

    assert_eq!(value?, "eventually");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn same_origin_reply_with_wrong_tag_is_ignored() -> Result<()> {
    let calls = Calls::default();
    let Paired { host, parent, child: _child } =
        pair(&BridgeConfig::default(), Map::new(), move || example_model(&calls)).await?;
    let lookalike = Context::new(Origin::parse(CHILD));

    let forged = json!({
        "postmate": "reply",
        "type": "application/x-not-postmate",
        "uid": 1,
        "value": "forged",
    });
    let (value, ()) = tokio::join!(parent.get::<String>("slow"), async {
        settle().await;
        host.context().post_message(&lookalike, forged, &TargetOrigin::Any);
    });

    assert_eq!(value?, "eventually");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn forged_emit_is_ignored() -> Result<()> {
    let Paired { host, parent, child } = pair(&BridgeConfig::default(), Map::new(), Model::new).await?;
    let impostor = impostor();

    let (tx, mut events) = mpsc::unbounded_channel();
    parent.on("ready", move |n: u32| {
        let _ = tx.send(n);
    });

    host.context()
        .post_message(&impostor, Envelope::emit("ready", json!(9)).to_value(), &TargetOrigin::Any);
    child.emit("ready", 1)?;

    assert_eq!(events.recv().await, Some(1));
    settle().await;
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn third_party_cannot_drive_the_responder() -> Result<()> {
    let calls = Calls::default();
    let recorded = calls.clone();
    let Paired { parent, child: _child, .. } =
        pair(&BridgeConfig::default(), Map::new(), move || example_model(&recorded)).await?;
    let impostor = impostor();
    let mut impostor_inbox = impostor.subscribe();
    let embedded = parent.frame().context();

    embedded.post_message(&impostor, Envelope::request(1, "greeting").to_value(), &TargetOrigin::Any);
    embedded.post_message(&impostor, Envelope::call("double", json!(5)).to_value(), &TargetOrigin::Any);
    settle().await;

    assert!(impostor_inbox.try_recv().is_err(), "no reply may reach a third party");
    assert!(calls.seen().is_empty());

    // The legitimate peer is still served.
    parent.call("double", 4)?;
    settle().await;
    assert_eq!(calls.seen(), vec![json!(4)]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unrelated_traffic_does_not_disturb_the_session() -> Result<()> {
    let calls = Calls::default();
    let Paired { host, parent, child: _child } =
        pair(&BridgeConfig::default(), Map::new(), move || example_model(&calls)).await?;
    let embedded = parent.frame().context().clone();
    let own = host.context();

    own.post_message(&embedded, json!({"hello": "world"}), &TargetOrigin::Any);
    own.post_message(&embedded, json!("plain"), &TargetOrigin::Any);
    embedded.post_message(&own, json!({"postmate": "request", "uid": 99}), &TargetOrigin::Any);

    assert_eq!(parent.get::<String>("greeting").await?, "hi");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn messages_are_only_delivered_to_the_named_origin() -> Result<()> {
    let embedded = Context::new(Origin::parse(CHILD));
    let sender = impostor();
    let mut inbox = embedded.subscribe();

    let wrong = TargetOrigin::Exact(Origin::parse("https://elsewhere.example"));
    assert!(!embedded.post_message(&sender, json!(1), &wrong));

    let right = TargetOrigin::Exact(Origin::parse(CHILD));
    assert!(embedded.post_message(&sender, json!(2), &right));

    assert_eq!(inbox.recv().await?.data, json!(2));
    Ok(())
}
