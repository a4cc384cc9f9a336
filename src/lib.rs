//! mexc-rebalancer: periodic quote-balance rebalancer for a MEXC spot pair.
//!
//! Samples free balances on a fixed cadence, compares the quote balance
//! against a configured target, and places market orders to correct drift
//! beyond a threshold. Every sample, decision, order, and error is appended
//! to a JSONL audit trail.

pub mod audit;
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod policy;
