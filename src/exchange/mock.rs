//! Mock exchange client for testing — scripted responses, records orders.
//!
//! ```ignore
//! use mexc_rebalancer::exchange::mock::{BalanceStep, MockExchange, OrderMode};
//!
//! let client = MockExchange::builder()
//!     .balances(100.0, 45.0)
//!     .price(2.0)
//!     .build();
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;

use super::{BalanceSnapshot, ExchangeClient, OrderResult, QuantitySpec, Side};
use crate::config::Pair;
use crate::error::{Error, Result};

/// One scripted response for `balances()`. Steps are consumed in order;
/// once exhausted, the builder's steady-state balances answer.
#[derive(Debug, Clone, Copy)]
pub enum BalanceStep {
    Balances { base_free: f64, quote_free: f64 },
    TransportError,
    AuthError,
}

/// How the mock handles submitted orders.
#[derive(Debug, Clone, Copy)]
pub enum OrderMode {
    Accept,
    Reject,
    TransportError,
}

/// A recorded order submission for assertion in tests.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub symbol: String,
    pub side: Side,
    pub quantity: QuantitySpec,
}

/// Builder for `MockExchange`.
pub struct MockExchangeBuilder {
    steps: VecDeque<BalanceStep>,
    default_balances: Option<(f64, f64)>,
    price: f64,
    order_mode: OrderMode,
}

impl MockExchangeBuilder {
    /// Steady-state balances returned once all scripted steps are consumed.
    pub fn balances(mut self, base_free: f64, quote_free: f64) -> Self {
        self.default_balances = Some((base_free, quote_free));
        self
    }

    /// Queue a scripted response for the next `balances()` call.
    pub fn step(mut self, step: BalanceStep) -> Self {
        self.steps.push_back(step);
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn order_mode(mut self, mode: OrderMode) -> Self {
        self.order_mode = mode;
        self
    }

    pub fn build(self) -> MockExchange {
        MockExchange {
            steps: Mutex::new(self.steps),
            default_balances: self.default_balances,
            price: self.price,
            order_mode: self.order_mode,
            next_order_id: Mutex::new(1),
            placed: Mutex::new(Vec::new()),
        }
    }
}

/// A mock exchange that records submitted orders and replays scripted
/// balance responses.
pub struct MockExchange {
    steps: Mutex<VecDeque<BalanceStep>>,
    default_balances: Option<(f64, f64)>,
    price: f64,
    order_mode: OrderMode,
    next_order_id: Mutex<u64>,
    placed: Mutex<Vec<PlacedOrder>>,
}

impl MockExchange {
    pub fn builder() -> MockExchangeBuilder {
        MockExchangeBuilder {
            steps: VecDeque::new(),
            default_balances: None,
            price: 1.0,
            order_mode: OrderMode::Accept,
        }
    }

    /// All orders placed so far (for assertion in tests).
    pub fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.placed.lock().unwrap().clone()
    }
}

impl ExchangeClient for MockExchange {
    fn balances(&self, _pair: &Pair) -> Result<BalanceSnapshot> {
        let step = self.steps.lock().unwrap().pop_front();
        let step = match step {
            Some(s) => s,
            None => match self.default_balances {
                Some((base_free, quote_free)) => BalanceStep::Balances {
                    base_free,
                    quote_free,
                },
                None => return Err(Error::Transport("mock: no balances configured".into())),
            },
        };

        match step {
            BalanceStep::Balances {
                base_free,
                quote_free,
            } => Ok(BalanceSnapshot {
                base_free,
                quote_free,
                taken_at: Utc::now(),
            }),
            BalanceStep::TransportError => {
                Err(Error::Transport("mock: transport failure".into()))
            }
            BalanceStep::AuthError => Err(Error::Auth("mock: invalid credentials".into())),
        }
    }

    fn market_price(&self, _pair: &Pair) -> Result<f64> {
        Ok(self.price)
    }

    fn place_market_order(
        &self,
        pair: &Pair,
        side: Side,
        quantity: QuantitySpec,
    ) -> Result<OrderResult> {
        self.placed.lock().unwrap().push(PlacedOrder {
            symbol: pair.api_symbol(),
            side,
            quantity,
        });

        match self.order_mode {
            OrderMode::Accept => {
                // Full immediate fill at the configured price.
                let (executed_qty, quote_spent) = match quantity {
                    QuantitySpec::QuoteNotional(amount) if self.price > 0.0 => {
                        (amount / self.price, amount)
                    }
                    QuantitySpec::QuoteNotional(amount) => (0.0, amount),
                    QuantitySpec::BaseQuantity(qty) => (qty, qty * self.price),
                };
                let mut id = self.next_order_id.lock().unwrap();
                let order_id = id.to_string();
                *id += 1;
                Ok(OrderResult {
                    order_id,
                    status: "FILLED".into(),
                    executed_qty,
                    quote_spent,
                    timestamp: Utc::now(),
                })
            }
            OrderMode::Reject => Err(Error::RejectedOrder("mock: order rejected".into())),
            OrderMode::TransportError => {
                Err(Error::Transport("mock: order send failed".into()))
            }
        }
    }
}
