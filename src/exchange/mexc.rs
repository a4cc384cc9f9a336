//! MEXC spot REST API adapter (blocking).
//!
//! Implements `ExchangeClient` over the v3 endpoints: `/api/v3/account` for
//! balances, `/api/v3/ticker/price` for the market price, and `/api/v3/order`
//! for market orders. Signed requests use the exchange server time as the
//! timestamp, matching MEXC's signature validation window.

use std::fmt;

use chrono::Utc;
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer};

use super::auth;
use super::{BalanceSnapshot, Credentials, ExchangeClient, OrderResult, QuantitySpec, Side};
use crate::config::Pair;
use crate::error::{Error, Result};

/// Blocking MEXC REST client.
pub struct MexcClient {
    client: Client,
    credentials: Credentials,
    base_url: String,
}

impl MexcClient {
    /// Create a new client against the given host (e.g. "https://api.mexc.com").
    pub fn new(credentials: Credentials, host: &str) -> Self {
        Self {
            client: Client::new(),
            credentials,
            base_url: host.trim_end_matches('/').to_string(),
        }
    }

    /// Test connectivity (GET /api/v3/ping).
    pub fn ping(&self) -> Result<()> {
        let url = format!("{}/api/v3/ping", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::Transport(format!("ping failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "ping returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Exchange server time in milliseconds (GET /api/v3/time).
    fn server_time(&self) -> Result<u64> {
        let url = format!("{}/api/v3/time", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::Transport(format!("time request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "time returned {}",
                resp.status()
            )));
        }

        let t: ServerTime = resp
            .json()
            .map_err(|e| Error::Transport(format!("failed to parse server time: {e}")))?;
        Ok(t.server_time)
    }

    /// Build a signed query string: `<params>&timestamp=<ts>&signature=<sig>`.
    fn signed_query(&self, params: &str) -> Result<String> {
        let timestamp = self.server_time()?;
        let to_sign = if params.is_empty() {
            format!("timestamp={timestamp}")
        } else {
            format!("{params}&timestamp={timestamp}")
        };
        let signature = auth::sign(&to_sign, &self.credentials.secret_key);
        Ok(format!("{to_sign}&signature={signature}"))
    }
}

impl ExchangeClient for MexcClient {
    fn balances(&self, pair: &Pair) -> Result<BalanceSnapshot> {
        let query = self.signed_query("")?;
        let url = format!("{}/api/v3/account?{query}", self.base_url);

        let resp = self
            .client
            .get(&url)
            .header("x-mexc-apikey", &self.credentials.api_key)
            .send()
            .map_err(|e| Error::Transport(format!("account request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(auth_or_transport(
                status,
                format!("account returned {status}: {body}"),
            ));
        }

        let info: AccountInfo = resp
            .json()
            .map_err(|e| Error::Transport(format!("failed to parse account: {e}")))?;

        Ok(BalanceSnapshot {
            base_free: free_balance(&info, &pair.base)?,
            quote_free: free_balance(&info, &pair.quote)?,
            taken_at: Utc::now(),
        })
    }

    fn market_price(&self, pair: &Pair) -> Result<f64> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            pair.api_symbol()
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::Transport(format!("ticker request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Error::Transport(format!(
                "ticker returned {status}: {body}"
            )));
        }

        let ticker: TickerPrice = resp
            .json()
            .map_err(|e| Error::Transport(format!("failed to parse ticker: {e}")))?;
        ticker
            .price
            .parse()
            .map_err(|e| Error::Transport(format!("unparseable price '{}': {e}", ticker.price)))
    }

    fn place_market_order(
        &self,
        pair: &Pair,
        side: Side,
        quantity: QuantitySpec,
    ) -> Result<OrderResult> {
        let qty_param = match quantity {
            QuantitySpec::QuoteNotional(amount) => format!("quoteOrderQty={amount}"),
            QuantitySpec::BaseQuantity(qty) => format!("quantity={qty}"),
        };
        let params = format!(
            "symbol={}&side={side}&type=MARKET&{qty_param}",
            pair.api_symbol()
        );
        let query = self.signed_query(&params)?;
        let url = format!("{}/api/v3/order", self.base_url);

        debug!("submitting order: {params}");

        let resp = self
            .client
            .post(&url)
            .header("x-mexc-apikey", &self.credentials.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(query)
            .send()
            .map_err(|e| Error::Transport(format!("order request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(order_error(
                status,
                format!("order returned {status}: {body}"),
            ));
        }

        let order: OrderResponse = resp
            .json()
            .map_err(|e| Error::Transport(format!("failed to parse order response: {e}")))?;

        Ok(OrderResult {
            order_id: order.order_id,
            status: order.status,
            executed_qty: qty_field(&order.executed_qty),
            quote_spent: qty_field(&order.cummulative_quote_qty),
            timestamp: Utc::now(),
        })
    }
}

/// Free balance for one asset; missing entries mean a zero balance.
fn free_balance(info: &AccountInfo, asset: &str) -> Result<f64> {
    match info
        .balances
        .iter()
        .find(|b| b.asset.eq_ignore_ascii_case(asset))
    {
        Some(b) => b
            .free
            .parse()
            .map_err(|e| Error::Transport(format!("unparseable balance '{}': {e}", b.free))),
        None => Ok(0.0),
    }
}

fn auth_or_transport(status: StatusCode, msg: String) -> Error {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Error::Auth(msg)
    } else {
        Error::Transport(msg)
    }
}

fn order_error(status: StatusCode, msg: String) -> Error {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Error::Auth(msg)
    } else if status.is_client_error() {
        Error::RejectedOrder(msg)
    } else {
        Error::Transport(msg)
    }
}

// === Response types ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTime {
    server_time: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceInfo {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<BalanceInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(deserialize_with = "order_id_string")]
    order_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    executed_qty: String,
    #[serde(default)]
    cummulative_quote_qty: String,
}

/// Fill quantities arrive as string numerics and are empty until filled.
fn qty_field(value: &str) -> f64 {
    value.parse().unwrap_or(0.0)
}

// MEXC returns string order ids for spot; tolerate numeric ids too.
fn order_id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl serde::de::Visitor<'_> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a string or integer order id")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
