//! Orderbook sequence gap: a message whose `seq` doesn't extend the last
//! one tracked for its ticker is dropped rather than forwarded, and the
//! client re-subscribes to resync.

mod support;

use std::sync::Arc;
use std::time::Duration;

use kalshid::core::domain::Environment;
use kalshid::core::kalshi::KalshiWebSocketClient;

#[tokio::test]
async fn gap_in_orderbook_sequence_is_dropped_not_forwarded() {
    let script = vec![
        r#"{"type":"orderbook_delta","msg":{"market_ticker":"BTC-X","seq":1,"yes":[[40,100]],"no":[]}}"#.to_string(),
        r#"{"type":"orderbook_delta","msg":{"market_ticker":"BTC-X","seq":3,"yes":[[41,50]],"no":[]}}"#.to_string(),
    ];
    let server = support::ScriptedWsServer::start(script, false).await;

    let client = Arc::new(KalshiWebSocketClient::with_url(Environment::Demo, server.url.clone()));
    client.configure("api-key".into(), support::test_key());

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let running = client.clone();
    tokio::spawn(async move { running.run(tx).await });

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("first in-sequence message arrives")
        .expect("queue still open");
    match first.event {
        kalshid::core::kalshi::messages::WsEvent::OrderbookDelta { msg } => assert_eq!(msg.seq, 1),
        other => panic!("expected orderbook_delta, got {other:?}"),
    }

    // seq=3 is a gap (expected 2): it must never reach the dispatcher queue.
    let second = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(second.is_err(), "gapped message should not be forwarded");

    client.stop();
}
