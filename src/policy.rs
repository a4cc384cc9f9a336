//! Pure rebalance decision: balances + price → trade instruction.
//!
//! Given a fresh balance snapshot and the current market price, decides
//! whether the free quote balance has drifted past the threshold and, if so,
//! what corrective market order to place. No I/O, fully deterministic.

use std::fmt;

use crate::config::RebalanceConfig;
use crate::exchange::BalanceSnapshot;

/// The one decision a cycle produces. `Hold` carries the reason no order is
/// placed so the loop can log it rather than dropping it silently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeInstruction {
    /// Spend excess quote to acquire base.
    BuyBase { quote_to_spend: f64 },
    /// Sell base to raise the quote balance back to target.
    SellBase { base_qty: f64 },
    /// No order this cycle.
    Hold { reason: HoldReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    WithinThreshold,
    RoundedToZero,
    BelowMinQuantity,
    InsufficientBase,
    PriceUnavailable,
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldReason::WithinThreshold => write!(f, "within threshold"),
            HoldReason::RoundedToZero => write!(f, "amount rounded to zero"),
            HoldReason::BelowMinQuantity => write!(f, "below minimum quantity"),
            HoldReason::InsufficientBase => write!(f, "insufficient base balance"),
            HoldReason::PriceUnavailable => write!(f, "price unavailable"),
        }
    }
}

impl fmt::Display for TradeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeInstruction::BuyBase { quote_to_spend } => {
                write!(f, "BUY base for {quote_to_spend} quote")
            }
            TradeInstruction::SellBase { base_qty } => write!(f, "SELL {base_qty} base"),
            TradeInstruction::Hold { reason } => write!(f, "no action ({reason})"),
        }
    }
}

/// Fractional deviation of the quote balance from target.
pub fn deviation(snapshot: &BalanceSnapshot, config: &RebalanceConfig) -> f64 {
    (snapshot.quote_free - config.target_quote) / config.target_quote
}

/// Decide the corrective trade for one cycle.
///
/// `price` is quote per base unit, used only when base must be sold. All
/// quantities are floored toward zero at the asset's precision so an
/// instruction never requests more than is held or intended.
pub fn decide(
    snapshot: &BalanceSnapshot,
    price: f64,
    config: &RebalanceConfig,
) -> TradeInstruction {
    let dev = deviation(snapshot, config);
    if dev.abs() <= config.threshold {
        return TradeInstruction::Hold {
            reason: HoldReason::WithinThreshold,
        };
    }

    if dev > 0.0 {
        // Excess quote: spend the surplus on base.
        let spend = floor_dp(
            snapshot.quote_free - config.target_quote,
            config.quote_precision,
        );
        if spend <= 0.0 {
            return TradeInstruction::Hold {
                reason: HoldReason::RoundedToZero,
            };
        }
        return TradeInstruction::BuyBase {
            quote_to_spend: spend,
        };
    }

    // Deficit quote: sell base to raise it.
    if !price.is_finite() || price <= 0.0 {
        return TradeInstruction::Hold {
            reason: HoldReason::PriceUnavailable,
        };
    }

    let needed_quote = config.target_quote - snapshot.quote_free;
    let mut qty = floor_dp(needed_quote / price, config.base_qty_precision);

    if qty > snapshot.base_free {
        // Cannot sell more than held; fall back to everything available.
        qty = floor_dp(snapshot.base_free, config.base_qty_precision);
        if qty <= 0.0 {
            return TradeInstruction::Hold {
                reason: HoldReason::InsufficientBase,
            };
        }
    }

    if qty < config.min_base_qty {
        return TradeInstruction::Hold {
            reason: HoldReason::BelowMinQuantity,
        };
    }
    if qty <= 0.0 {
        // Only reachable with min_base_qty == 0
        return TradeInstruction::Hold {
            reason: HoldReason::RoundedToZero,
        };
    }

    TradeInstruction::SellBase { base_qty: qty }
}

/// Round toward zero at `dp` decimal places. Never rounds up.
pub fn floor_dp(value: f64, dp: u32) -> f64 {
    let scale = 10f64.powi(dp as i32);
    (value * scale).trunc() / scale
}
