//! Happy path: an agent's trade intent is submitted, tracked as an open
//! order, and cleared once Kalshi reports a fill.

mod support;

use std::sync::Arc;
use std::time::Duration;

use kalshid::core::broadcast::{Event, EventBroadcaster};
use kalshid::core::domain::{Action, AgentId, Environment, MarketTicker, OrderType, Side, TradeIntent};
use kalshid::core::execution::ExecutionEngine;
use kalshid::core::kalshi::messages::UserFillMsg;
use kalshid::core::kalshi::RestClient;
use kalshid::core::persistence::NullStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn happy_path_order_is_submitted_tracked_and_filled() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trade-api/v2/portfolio/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "order": { "order_id": "O-1", "status": "resting" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let rest = Arc::new(RestClient::with_base_url(Environment::Demo, mock_server.uri()));
    rest.configure("api-key".into(), support::test_key());

    let broadcaster = EventBroadcaster::new();
    let mut events = broadcaster.subscribe();
    let engine = ExecutionEngine::new(
        rest,
        Arc::new(NullStore::new()),
        broadcaster,
        Environment::Demo,
    );

    let intent = TradeIntent::new(
        AgentId::generate(),
        MarketTicker::from("BTC-X"),
        Action::Buy,
        Side::Yes,
        OrderType::Limit,
        41,
        1,
        0.9,
        0,
    );
    engine.execute(intent).await;

    let open = engine.get_open_orders();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].order_id().as_str(), "O-1");

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("OrderSubmitted broadcast within timeout")
        .expect("broadcast channel still open");
    assert!(matches!(event, Event::OrderSubmitted { .. }));

    engine
        .handle_fill(&UserFillMsg {
            fill_id: "F-1".into(),
            order_id: "O-1".into(),
            market_ticker: "BTC-X".into(),
            side: "yes".into(),
            action: "buy".into(),
            price: 41,
            count: 1,
            is_taker: true,
            ts: 0,
        })
        .await;

    assert!(engine.get_open_orders().is_empty());
}
