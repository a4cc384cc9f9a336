//! Exchange client trait and shared types.
//!
//! The rebalance loop only depends on the `ExchangeClient` trait. The MEXC
//! REST adapter lives in `mexc`; `mock` provides a scripted client for tests.

pub mod auth;
pub mod mexc;
pub mod mock;

use std::env;
use std::fmt;

use chrono::{DateTime, Utc};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::Pair;
use crate::error::{Error, Result};

/// Free balances for both legs of the pair, sampled in one call.
#[derive(Debug, Clone, Copy)]
pub struct BalanceSnapshot {
    pub base_free: f64,
    pub quote_free: f64,
    pub taken_at: DateTime<Utc>,
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// How a market order quantity is denominated.
///
/// Market buys spend a quote amount (`quoteOrderQty` on MEXC), market sells
/// give up a base quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantitySpec {
    QuoteNotional(f64),
    BaseQuantity(f64),
}

/// Exchange acknowledgement for a placed order. Append-only record.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order_id: String,
    pub status: String,
    /// Base quantity filled so far (0 until the exchange reports a fill).
    pub executed_qty: f64,
    /// Quote spent or received so far.
    pub quote_spent: f64,
    pub timestamp: DateTime<Utc>,
}

/// The two capabilities the rebalance loop needs from an exchange, plus the
/// price source used to convert quote deficits into base quantities.
///
/// Implementations own their transport concerns (timeouts, rate limiting).
/// Every method is fallible; a timeout is reported as `Error::Transport`.
pub trait ExchangeClient {
    /// Fetch free balances for both legs of the pair.
    fn balances(&self, pair: &Pair) -> Result<BalanceSnapshot>;

    /// Current market price, quote per base unit.
    fn market_price(&self, pair: &Pair) -> Result<f64>;

    /// Place a market order. One call maps to at most one exchange order.
    fn place_market_order(
        &self,
        pair: &Pair,
        side: Side,
        quantity: QuantitySpec,
    ) -> Result<OrderResult>;
}

/// API credentials. Wiped from memory on drop, never logged.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl Credentials {
    /// Read credentials from `MEXC_API_KEY` / `MEXC_SECRET_KEY`, prompting
    /// interactively for whichever is missing.
    pub fn from_env_or_prompt() -> Result<Self> {
        let api_key = match env::var("MEXC_API_KEY") {
            Ok(k) if !k.trim().is_empty() => k,
            _ => dialoguer::Input::<String>::new()
                .with_prompt("MEXC API key")
                .interact_text()
                .map_err(|e| Error::Credentials(format!("API key prompt failed: {e}")))?,
        };
        let secret_key = match env::var("MEXC_SECRET_KEY") {
            Ok(s) if !s.trim().is_empty() => s,
            _ => dialoguer::Password::new()
                .with_prompt("MEXC secret key")
                .interact()
                .map_err(|e| Error::Credentials(format!("secret key prompt failed: {e}")))?,
        };

        if api_key.trim().is_empty() {
            return Err(Error::Credentials("API key must not be empty".into()));
        }
        if secret_key.trim().is_empty() {
            return Err(Error::Credentials("secret key must not be empty".into()));
        }

        Ok(Self {
            api_key,
            secret_key,
        })
    }
}
