//! Integration tests for the rebalance loop against a scripted mock exchange.

use std::sync::atomic::AtomicBool;

use mexc_rebalancer::audit::AuditLog;
use mexc_rebalancer::config::Config;
use mexc_rebalancer::error::Error;
use mexc_rebalancer::exchange::mock::{BalanceStep, MockExchange, OrderMode};
use mexc_rebalancer::exchange::{QuantitySpec, Side};
use mexc_rebalancer::execution::{self, CycleOutcome, RunOptions};
use mexc_rebalancer::policy::{HoldReason, TradeInstruction};

/// Test config: target 40 USDT, 5% threshold, no backoff sleeping.
fn test_config(log_dir: &std::path::Path) -> Config {
    let mut config: Config = toml::from_str("").unwrap();
    config.schedule.backoff_secs = 0;
    config.schedule.max_sample_attempts = 3;
    config.logging.dir = log_dir.display().to_string();
    config.validate().unwrap();
    config
}

fn no_stop() -> AtomicBool {
    AtomicBool::new(false)
}

fn opts() -> RunOptions {
    RunOptions { dry_run: false }
}

#[test]
fn excess_quote_places_quote_notional_buy() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder().balances(100.0, 45.0).price(2.0).build();
    let mut audit = AuditLog::open(&config.audit_path()).unwrap();

    let outcome =
        execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop()).unwrap();

    assert!(matches!(outcome, CycleOutcome::Traded(_)));
    let placed = client.placed_orders();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side, Side::Buy);
    assert_eq!(placed[0].quantity, QuantitySpec::QuoteNotional(5.0));
}

#[test]
fn deficit_quote_places_base_quantity_sell() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder().balances(50.0, 20.0).price(2.0).build();
    let mut audit = AuditLog::open(&config.audit_path()).unwrap();

    let outcome =
        execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop()).unwrap();

    assert!(matches!(outcome, CycleOutcome::Traded(_)));
    let placed = client.placed_orders();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side, Side::Sell);
    assert_eq!(placed[0].quantity, QuantitySpec::BaseQuantity(10.0));
}

#[test]
fn within_threshold_places_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder().balances(100.0, 39.0).price(2.0).build();
    let mut audit = AuditLog::open(&config.audit_path()).unwrap();

    let outcome =
        execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop()).unwrap();

    assert!(matches!(
        outcome,
        CycleOutcome::Held(HoldReason::WithinThreshold)
    ));
    assert!(client.placed_orders().is_empty());
}

#[test]
fn transport_failures_exhaust_retries_and_skip_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    // Three consecutive transport errors eat the whole retry budget.
    let client = MockExchange::builder()
        .step(BalanceStep::TransportError)
        .step(BalanceStep::TransportError)
        .step(BalanceStep::TransportError)
        .balances(100.0, 45.0)
        .price(2.0)
        .build();
    let mut audit = AuditLog::open(&config.audit_path()).unwrap();

    let outcome =
        execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop()).unwrap();
    assert!(matches!(outcome, CycleOutcome::SamplingFailed));
    assert!(client.placed_orders().is_empty());

    // Loop is still alive: the next cycle trades normally.
    let outcome =
        execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop()).unwrap();
    assert!(matches!(outcome, CycleOutcome::Traded(_)));
}

#[test]
fn transient_failure_recovers_within_budget() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder()
        .step(BalanceStep::TransportError)
        .balances(100.0, 45.0)
        .price(2.0)
        .build();
    let mut audit = AuditLog::open(&config.audit_path()).unwrap();

    let outcome =
        execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop()).unwrap();
    assert!(matches!(outcome, CycleOutcome::Traded(_)));
}

#[test]
fn rejected_order_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder()
        .balances(100.0, 45.0)
        .price(2.0)
        .order_mode(OrderMode::Reject)
        .build();
    let mut audit = AuditLog::open(&config.audit_path()).unwrap();

    let outcome =
        execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop()).unwrap();
    assert!(matches!(outcome, CycleOutcome::OrderFailed));

    // Exactly one submission attempt, no in-cycle retry.
    assert_eq!(client.placed_orders().len(), 1);
}

#[test]
fn auth_error_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder()
        .step(BalanceStep::AuthError)
        .balances(100.0, 45.0)
        .build();
    let mut audit = AuditLog::open(&config.audit_path()).unwrap();

    let result = execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop());
    assert!(matches!(result, Err(Error::Auth(_))));
    assert!(client.placed_orders().is_empty());
}

#[test]
fn dry_run_places_no_orders() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder().balances(100.0, 45.0).price(2.0).build();
    let mut audit = AuditLog::open(&config.audit_path()).unwrap();

    let outcome = execution::run_cycle(
        &client,
        &config,
        &mut audit,
        &RunOptions { dry_run: true },
        &no_stop(),
    )
    .unwrap();

    match outcome {
        CycleOutcome::DryRun(TradeInstruction::BuyBase { quote_to_spend }) => {
            assert_eq!(quote_to_spend, 5.0);
        }
        other => panic!("expected dry-run buy, got {other:?}"),
    }
    assert!(client.placed_orders().is_empty());
}

#[test]
fn run_propagates_fatal_auth_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder()
        .step(BalanceStep::AuthError)
        .balances(100.0, 45.0)
        .price(2.0)
        .build();

    // The loop must surface the auth failure itself, not a follow-on error.
    let result = execution::run(&client, &config, &opts(), &no_stop());
    assert!(matches!(result, Err(Error::Auth(_))));
    assert!(client.placed_orders().is_empty());

    let contents = std::fs::read_to_string(config.audit_path()).unwrap();
    let events: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(events.iter().any(|e| e["event"] == "run_aborted"));
}

#[test]
fn run_honors_stop_flag() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder().balances(100.0, 45.0).price(2.0).build();

    let stop = AtomicBool::new(true);
    execution::run(&client, &config, &opts(), &stop).unwrap();

    // Stop was raised before the first cycle: clean exit, nothing placed.
    assert!(client.placed_orders().is_empty());
}

#[test]
fn cycle_events_land_in_audit_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = MockExchange::builder().balances(100.0, 45.0).price(2.0).build();

    {
        let mut audit = AuditLog::open(&config.audit_path()).unwrap();
        execution::run_cycle(&client, &config, &mut audit, &opts(), &no_stop()).unwrap();
    }

    let contents = std::fs::read_to_string(config.audit_path()).unwrap();
    let events: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(events.iter().any(|e| e["event"] == "cycle"));

    // Buy of 5 USDT at price 2.0 fills 2.5 base in the mock.
    let submitted = events
        .iter()
        .find(|e| e["event"] == "order_submitted")
        .expect("order_submitted event");
    assert_eq!(submitted["executed_qty"], 2.5);
    assert_eq!(submitted["quote_spent"], 5.0);
}
