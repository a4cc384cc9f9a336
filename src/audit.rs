//! JSONL audit trail logging.
//!
//! Every cycle appends events to an audit.jsonl file, one JSON object per
//! line: sampled balances, the computed deviation, the chosen instruction,
//! and the order result or error. Human-auditable, append-only.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::exchange::{BalanceSnapshot, OrderResult};
use crate::policy::TradeInstruction;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log loop start with the effective settings.
pub fn log_run_started(audit: &mut AuditLog, config: &crate::config::Config) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "pair": config.rebalance.pair.to_string(),
            "target_quote": config.rebalance.target_quote,
            "threshold": config.rebalance.threshold,
            "poll_interval_secs": config.schedule.poll_interval_secs,
        }),
    )
}

/// Convenience: log one cycle's sample and decision.
pub fn log_cycle(
    audit: &mut AuditLog,
    snapshot: &BalanceSnapshot,
    price: f64,
    deviation: f64,
    instruction: &TradeInstruction,
) -> Result<()> {
    audit.log(
        "cycle",
        serde_json::json!({
            "base_free": snapshot.base_free,
            "quote_free": snapshot.quote_free,
            "price": price,
            "deviation": deviation,
            "decision": instruction.to_string(),
        }),
    )
}

/// Convenience: log a successful order submission.
pub fn log_order_submitted(
    audit: &mut AuditLog,
    instruction: &TradeInstruction,
    result: &OrderResult,
) -> Result<()> {
    audit.log(
        "order_submitted",
        serde_json::json!({
            "instruction": instruction.to_string(),
            "order_id": result.order_id,
            "status": result.status,
            "executed_qty": result.executed_qty,
            "quote_spent": result.quote_spent,
        }),
    )
}

/// Convenience: log a failed order with enough context to reconstruct it.
pub fn log_order_failed(
    audit: &mut AuditLog,
    instruction: &TradeInstruction,
    snapshot: &BalanceSnapshot,
    error: &crate::error::Error,
) -> Result<()> {
    audit.log(
        "order_failed",
        serde_json::json!({
            "instruction": instruction.to_string(),
            "base_free": snapshot.base_free,
            "quote_free": snapshot.quote_free,
            "error": error.to_string(),
        }),
    )
}

/// Convenience: log a cycle skipped after sampling retries were exhausted.
pub fn log_cycle_skipped(audit: &mut AuditLog, attempts: u32) -> Result<()> {
    audit.log(
        "cycle_skipped",
        serde_json::json!({ "sample_attempts": attempts }),
    )
}

/// Convenience: log a low base-balance warning.
pub fn log_low_balance(audit: &mut AuditLog, base_free: f64, warn_below: f64) -> Result<()> {
    audit.log(
        "low_base_balance",
        serde_json::json!({
            "base_free": base_free,
            "warn_below": warn_below,
        }),
    )
}
