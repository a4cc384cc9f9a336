//! TOML configuration loading and validation.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Top-level configuration. Loaded once at startup and treated as read-only
/// for the process lifetime.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "https://api.mexc.com".into()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceConfig {
    /// Quote balance the loop tries to hold.
    #[serde(default = "default_target_quote")]
    pub target_quote: f64,
    /// Maximum tolerated fractional deviation before a corrective trade.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_pair")]
    pub pair: Pair,
    /// Smallest base quantity the exchange accepts for this pair.
    #[serde(default = "default_min_base_qty")]
    pub min_base_qty: f64,
    /// Decimal places for base quantities (0 = whole units only).
    #[serde(default)]
    pub base_qty_precision: u32,
    #[serde(default = "default_quote_precision")]
    pub quote_precision: u32,
    /// Warn when the free base balance drops below this (0 = disabled).
    #[serde(default)]
    pub warn_base_balance: f64,
}

fn default_target_quote() -> f64 {
    40.0
}
fn default_threshold() -> f64 {
    0.05
}
fn default_pair() -> Pair {
    Pair {
        base: "MNTL".into(),
        quote: "USDT".into(),
    }
}
fn default_min_base_qty() -> f64 {
    1.0
}
fn default_quote_precision() -> u32 {
    2
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            target_quote: default_target_quote(),
            threshold: default_threshold(),
            pair: default_pair(),
            min_base_qty: default_min_base_qty(),
            base_qty_precision: 0,
            quote_precision: default_quote_precision(),
            warn_base_balance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between rebalance cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Cooldown between balance fetch retries within a cycle.
    #[serde(default = "default_backoff")]
    pub backoff_secs: u64,
    /// Balance fetch attempts per cycle before the cycle is skipped.
    #[serde(default = "default_max_attempts")]
    pub max_sample_attempts: u32,
}

fn default_poll_interval() -> u64 {
    120
}
fn default_backoff() -> u64 {
    15
}
fn default_max_attempts() -> u32 {
    3
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            backoff_secs: default_backoff(),
            max_sample_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if self.exchange.host.is_empty() {
            return Err(Error::Config("exchange host must not be empty".into()));
        }
        if self.rebalance.target_quote <= 0.0 {
            return Err(Error::Config("target_quote must be > 0".into()));
        }
        if self.rebalance.threshold <= 0.0 || self.rebalance.threshold >= 1.0 {
            return Err(Error::Config("threshold must be in (0.0, 1.0)".into()));
        }
        if self.rebalance.min_base_qty < 0.0 {
            return Err(Error::Config("min_base_qty must be >= 0".into()));
        }
        if self.rebalance.warn_base_balance < 0.0 {
            return Err(Error::Config("warn_base_balance must be >= 0".into()));
        }
        if self.schedule.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be > 0".into()));
        }
        if self.schedule.max_sample_attempts == 0 {
            return Err(Error::Config("max_sample_attempts must be >= 1".into()));
        }
        Ok(())
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> std::path::PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}

/// A base/quote symbol pair, written `BASE/QUOTE` in config (e.g. "MNTL/USDT").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    /// Concatenated symbol as the exchange API expects it ("MNTLUSDT").
    pub fn api_symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => Ok(Pair {
                base: base.to_uppercase(),
                quote: quote.to_uppercase(),
            }),
            _ => Err(Error::Config(format!(
                "invalid pair '{s}', expected BASE/QUOTE"
            ))),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl<'de> Deserialize<'de> for Pair {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[exchange]
host = "https://api.mexc.com"

[rebalance]
target_quote = 40.0
threshold = 0.05
pair = "MNTL/USDT"
min_base_qty = 1.0
base_qty_precision = 0
quote_precision = 2
warn_base_balance = 100000.0

[schedule]
poll_interval_secs = 120
backoff_secs = 15
max_sample_attempts = 3

[logging]
dir = "./logs"
audit_file = "audit.jsonl"
"#
    }

    #[test]
    fn parse_example_config() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        assert_eq!(config.rebalance.target_quote, 40.0);
        assert_eq!(config.rebalance.threshold, 0.05);
        assert_eq!(config.rebalance.pair.base, "MNTL");
        assert_eq!(config.rebalance.pair.quote, "USDT");
        assert_eq!(config.schedule.poll_interval_secs, 120);
        assert_eq!(config.rebalance.warn_base_balance, 100000.0);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.rebalance.target_quote, 40.0);
        assert_eq!(config.rebalance.threshold, 0.05);
        assert_eq!(config.rebalance.min_base_qty, 1.0);
        assert_eq!(config.rebalance.base_qty_precision, 0);
        assert_eq!(config.rebalance.quote_precision, 2);
        assert_eq!(config.schedule.poll_interval_secs, 120);
        assert_eq!(config.schedule.max_sample_attempts, 3);
        assert_eq!(config.exchange.host, "https://api.mexc.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_catches_bad_target() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.rebalance.target_quote = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_threshold_bounds() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.rebalance.threshold = 0.0;
        assert!(config.validate().is_err());
        config.rebalance.threshold = 1.0;
        assert!(config.validate().is_err());
        config.rebalance.threshold = 0.999;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_catches_zero_interval() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.schedule.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_zero_attempts() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.schedule.max_sample_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn pair_parsing() {
        let pair: Pair = "mntl/usdt".parse().unwrap();
        assert_eq!(pair.base, "MNTL");
        assert_eq!(pair.quote, "USDT");
        assert_eq!(pair.api_symbol(), "MNTLUSDT");
        assert_eq!(pair.to_string(), "MNTL/USDT");
    }

    #[test]
    fn pair_rejects_malformed() {
        assert!("MNTLUSDT".parse::<Pair>().is_err());
        assert!("/USDT".parse::<Pair>().is_err());
        assert!("MNTL/".parse::<Pair>().is_err());
    }

    #[test]
    fn audit_path() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        assert_eq!(
            config.audit_path(),
            std::path::PathBuf::from("./logs/audit.jsonl")
        );
    }
}
