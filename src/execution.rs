//! The rebalance loop: sample → decide → execute → sleep.
//!
//! One loop instance owns one trading pair and runs its cycles strictly in
//! sequence. Balance sampling retries on transport failures with a bounded
//! backoff; exhausting the retries skips the cycle, not the process. Only
//! authentication failures stop the loop. The stop flag is checked between
//! cycles and inside every sleep, never mid-submission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exchange::{
    BalanceSnapshot, ExchangeClient, OrderResult, QuantitySpec, Side,
};
use crate::exchange::mexc::MexcClient;
use crate::policy::{self, HoldReason, TradeInstruction};

/// Options for a rebalance run.
pub struct RunOptions {
    /// Log decisions without placing orders.
    pub dry_run: bool,
}

/// What one cycle did, for tests and logging.
#[derive(Debug)]
pub enum CycleOutcome {
    /// An order was submitted and acknowledged.
    Traded(OrderResult),
    /// The policy held; no order was needed.
    Held(HoldReason),
    /// An order was attempted and failed; logged, loop continues.
    OrderFailed,
    /// Sampling retries were exhausted; cycle skipped.
    SamplingFailed,
    /// Dry run: the instruction that would have been executed.
    DryRun(TradeInstruction),
}

/// Run the rebalance loop until the stop flag is set.
///
/// Cadence is anchored to loop start: tick n fires at `start + n * interval`,
/// so slow cycles do not accumulate drift.
pub fn run(
    client: &dyn ExchangeClient,
    config: &Config,
    opts: &RunOptions,
    stop: &AtomicBool,
) -> Result<()> {
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(&mut audit, config)?;

    info!(
        "rebalance loop started: pair {}, target {} {}, threshold {:.1}%, every {}s{}",
        config.rebalance.pair,
        config.rebalance.target_quote,
        config.rebalance.pair.quote,
        config.rebalance.threshold * 100.0,
        config.schedule.poll_interval_secs,
        if opts.dry_run { " [DRY RUN]" } else { "" },
    );

    let interval = Duration::from_secs(config.schedule.poll_interval_secs);
    let start = Instant::now();
    let mut tick: u32 = 0;

    while !stop.load(Ordering::SeqCst) {
        if let Err(e) = run_cycle(client, config, &mut audit, opts, stop) {
            error!("fatal error, stopping loop: {e}");
            // Best effort: the original error must not be masked by a failed
            // audit write.
            if let Err(audit_err) =
                audit.log("run_aborted", serde_json::json!({ "error": e.to_string() }))
            {
                warn!("failed to record abort in audit log: {audit_err}");
            }
            return Err(e);
        }

        // Next tick on the fixed grid; skip slots the cycle overran.
        tick += 1;
        let mut next = start + interval * tick;
        let now = Instant::now();
        while next <= now {
            tick += 1;
            next = start + interval * tick;
        }
        sleep_until(next, stop);
    }

    info!("stop signal received, exiting");
    audit.log_simple("run_stopped")?;
    Ok(())
}

/// One sample → decide → execute pass.
///
/// Returns `Err` only for unrecoverable failures (bad credentials, audit I/O);
/// everything else is logged and folded into the outcome.
pub fn run_cycle(
    client: &dyn ExchangeClient,
    config: &Config,
    audit: &mut AuditLog,
    opts: &RunOptions,
    stop: &AtomicBool,
) -> Result<CycleOutcome> {
    let pair = &config.rebalance.pair;

    let snapshot = match sample_with_backoff(client, config, stop)? {
        Some(s) => s,
        None => {
            audit::log_cycle_skipped(audit, config.schedule.max_sample_attempts)?;
            return Ok(CycleOutcome::SamplingFailed);
        }
    };

    let warn_below = config.rebalance.warn_base_balance;
    if warn_below > 0.0 && snapshot.base_free < warn_below {
        warn!(
            "low {} balance: {} (below {warn_below})",
            pair.base, snapshot.base_free
        );
        audit::log_low_balance(audit, snapshot.base_free, warn_below)?;
    }

    let price = match client.market_price(pair) {
        Ok(p) => p,
        Err(e) => {
            warn!("price fetch failed for {pair}: {e}");
            0.0
        }
    };

    let deviation = policy::deviation(&snapshot, &config.rebalance);
    let instruction = policy::decide(&snapshot, price, &config.rebalance);

    info!(
        "{}: {:.2} free (target {:.2}), {}: {} free, deviation {:+.1}% -> {}",
        pair.quote,
        snapshot.quote_free,
        config.rebalance.target_quote,
        pair.base,
        snapshot.base_free,
        deviation * 100.0,
        instruction,
    );
    audit::log_cycle(audit, &snapshot, price, deviation, &instruction)?;

    let (side, quantity) = match instruction {
        TradeInstruction::Hold { reason } => return Ok(CycleOutcome::Held(reason)),
        TradeInstruction::BuyBase { quote_to_spend } => {
            (Side::Buy, QuantitySpec::QuoteNotional(quote_to_spend))
        }
        TradeInstruction::SellBase { base_qty } => {
            (Side::Sell, QuantitySpec::BaseQuantity(base_qty))
        }
    };

    if opts.dry_run {
        info!("[DRY RUN] would submit: {instruction}");
        return Ok(CycleOutcome::DryRun(instruction));
    }

    match client.place_market_order(pair, side, quantity) {
        Ok(result) => {
            info!(
                "order {} submitted ({}): {instruction}",
                result.order_id, result.status
            );
            audit::log_order_submitted(audit, &instruction, &result)?;
            Ok(CycleOutcome::Traded(result))
        }
        Err(e @ Error::Auth(_)) => Err(e),
        Err(e) => {
            // Rejected or transport failure: no retry this cycle.
            error!("order failed ({instruction}): {e}");
            audit::log_order_failed(audit, &instruction, &snapshot, &e)?;
            Ok(CycleOutcome::OrderFailed)
        }
    }
}

/// Fetch balances with a bounded fixed-cooldown retry.
///
/// `Ok(None)` means the cycle should be skipped: either the attempts were
/// exhausted or the stop flag was raised during a cooldown.
fn sample_with_backoff(
    client: &dyn ExchangeClient,
    config: &Config,
    stop: &AtomicBool,
) -> Result<Option<BalanceSnapshot>> {
    let pair = &config.rebalance.pair;
    let cooldown = Duration::from_secs(config.schedule.backoff_secs);
    let attempts = config.schedule.max_sample_attempts;

    for attempt in 1..=attempts {
        match client.balances(pair) {
            Ok(snapshot) => return Ok(Some(snapshot)),
            Err(e @ Error::Auth(_)) => return Err(e),
            Err(e) => {
                warn!("balance fetch failed (attempt {attempt}/{attempts}): {e}");
                if attempt < attempts {
                    sleep_interruptible(cooldown, stop);
                    if stop.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    error!("sampling failed after {attempts} attempts, skipping cycle");
    Ok(None)
}

/// Show current balances, price, and deviation.
pub fn show_balances(client: &dyn ExchangeClient, config: &Config) -> Result<()> {
    let pair = &config.rebalance.pair;
    let snapshot = client.balances(pair)?;
    let price = client.market_price(pair)?;
    let deviation = policy::deviation(&snapshot, &config.rebalance);

    println!(
        "{}: {} free (~{:.2} {})",
        pair.base,
        snapshot.base_free,
        snapshot.base_free * price,
        pair.quote,
    );
    println!(
        "{}: {:.2} free (target {:.2})",
        pair.quote, snapshot.quote_free, config.rebalance.target_quote,
    );
    println!("price: {price} {} per {}", pair.quote, pair.base);
    println!(
        "deviation: {:+.2}% (threshold ±{:.1}%)",
        deviation * 100.0,
        config.rebalance.threshold * 100.0,
    );
    Ok(())
}

/// Check exchange connectivity and credentials.
pub fn check_status(client: &MexcClient, config: &Config) -> Result<()> {
    print!("Pinging {}... ", config.exchange.host);
    client.ping()?;
    println!("OK");

    let snapshot = client.balances(&config.rebalance.pair)?;
    println!(
        "Authenticated. {} {} / {:.2} {} free.",
        snapshot.base_free,
        config.rebalance.pair.base,
        snapshot.quote_free,
        config.rebalance.pair.quote,
    );
    Ok(())
}

fn sleep_until(deadline: Instant, stop: &AtomicBool) {
    const STEP: Duration = Duration::from_millis(250);
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STEP.min(deadline - now));
    }
}

fn sleep_interruptible(duration: Duration, stop: &AtomicBool) {
    sleep_until(Instant::now() + duration, stop);
}
