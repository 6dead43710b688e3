//! Typed convenience wrappers over [`RestClient`] for the endpoints this
//! system actually calls.

use reqwest::Method;
use serde_json::Value;

use super::rest::RestClient;
use crate::error::Result;

/// One page of `/markets`, opaque-cursor paginated.
#[derive(Debug, serde::Deserialize)]
pub struct MarketsPage {
    pub markets: Vec<Value>,
    pub cursor: Option<String>,
}

impl RestClient {
    pub async fn get_markets(&self, limit: u32, cursor: Option<&str>) -> Result<MarketsPage> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }
        self.request(Method::GET, "/markets", &query, None).await
    }

    pub async fn get_market(&self, ticker: &str) -> Result<Value> {
        self.request(Method::GET, &format!("/markets/{ticker}"), &[], None)
            .await
    }

    pub async fn get_balance(&self) -> Result<Value> {
        self.request(Method::GET, "/portfolio/balance", &[], None)
            .await
    }

    pub async fn get_positions(&self) -> Result<Value> {
        self.request(Method::GET, "/portfolio/positions", &[], None)
            .await
    }

    pub async fn get_orders(&self, status: Option<&str>, cursor: Option<&str>) -> Result<Value> {
        let mut query: Vec<(&str, String)> = status
            .map(|s| vec![("status", s.to_string())])
            .unwrap_or_default();
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }
        self.request(Method::GET, "/portfolio/orders", &query, None)
            .await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Value> {
        self.request(
            Method::GET,
            &format!("/portfolio/orders/{order_id}"),
            &[],
            None,
        )
        .await
    }

    pub async fn create_order(&self, body: Value) -> Result<Value> {
        self.request(Method::POST, "/portfolio/orders", &[], Some(body))
            .await
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<Value> {
        self.request(
            Method::DELETE,
            &format!("/portfolio/orders/{order_id}"),
            &[],
            None,
        )
        .await
    }

    pub async fn get_fills(&self, limit: u32) -> Result<Value> {
        self.request(
            Method::GET,
            "/portfolio/fills",
            &[("limit", limit.to_string())],
            None,
        )
        .await
    }
}

/// Build the `POST /portfolio/orders` request body described in the
/// external interfaces section: `yes_price` is populated for `Side::Yes`,
/// `no_price` for `Side::No`.
#[must_use]
pub fn order_body(
    ticker: &str,
    client_order_id: &str,
    order_type: &str,
    action: &str,
    side: &str,
    count: u32,
    price: u8,
) -> Value {
    let price_field = if side == "yes" { "yes_price" } else { "no_price" };
    serde_json::json!({
        "ticker": ticker,
        "client_order_id": client_order_id,
        "type": order_type,
        "action": action,
        "side": side,
        "count": count,
        price_field: price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_body_uses_yes_price_for_yes_side() {
        let body = order_body("BTC-X", "abc", "limit", "buy", "yes", 1, 41);
        assert_eq!(body["yes_price"], 41);
        assert!(body.get("no_price").is_none());
    }

    #[test]
    fn order_body_uses_no_price_for_no_side() {
        let body = order_body("BTC-X", "abc", "limit", "buy", "no", 1, 60);
        assert_eq!(body["no_price"], 60);
        assert!(body.get("yes_price").is_none());
    }
}
