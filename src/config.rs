//! Matcher configuration

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use tracing::debug;

use crate::types::{ReconcileError, ReconcileResult};

pub const DEFAULT_MATCHING_WINDOW_DAYS: u32 = 7;
pub const DEFAULT_AMOUNT_TOLERANCE: f64 = 0.01;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.70;
pub const DEFAULT_PAYMENT_PREFIX: &str = "PAY-";

/// Tunable matcher parameters
///
/// Every field has a default, so a TOML file only needs the keys it overrides:
///
/// ```toml
/// matching_window_days = 14
/// amount_tolerance = 0.02
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// How far back to look for unmatched transactions; invoices are
    /// considered when due within twice this window
    pub matching_window_days: u32,
    /// Relative amount difference still counted as a near match
    pub amount_tolerance: f64,
    /// Minimum score required to commit a match
    pub min_confidence: f64,
    /// Prefix for generated payment numbers
    pub payment_prefix: String,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            matching_window_days: DEFAULT_MATCHING_WINDOW_DAYS,
            amount_tolerance: DEFAULT_AMOUNT_TOLERANCE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            payment_prefix: DEFAULT_PAYMENT_PREFIX.to_string(),
        }
    }
}

impl MatcherConfig {
    /// Invoice due-date window, twice the transaction window
    pub fn invoice_window_days(&self) -> u32 {
        self.matching_window_days.saturating_mul(2)
    }

    /// Check value ranges
    pub fn validate(&self) -> ReconcileResult<()> {
        crate::utils::validation::validate_config(self)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> ReconcileResult<Self> {
        let config: MatcherConfig = toml::from_str(contents)
            .map_err(|e| ReconcileError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Load matcher configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> ReconcileResult<MatcherConfig> {
    let path_ref = path.as_ref();
    debug!("Loading matcher configuration from {:?}", path_ref);
    let contents = fs::read_to_string(path_ref).map_err(|e| {
        ReconcileError::Config(format!("Failed to read config file {:?}: {}", path_ref, e))
    })?;
    MatcherConfig::from_toml_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatcherConfig::default();
        assert_eq!(config.matching_window_days, 7);
        assert_eq!(config.invoice_window_days(), 14);
        assert_eq!(config.min_confidence, 0.70);
        assert_eq!(config.payment_prefix, "PAY-");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MatcherConfig::from_toml_str("matching_window_days = 14\n").unwrap();
        assert_eq!(config.matching_window_days, 14);
        assert_eq!(config.amount_tolerance, DEFAULT_AMOUNT_TOLERANCE);
        assert_eq!(config.min_confidence, DEFAULT_MIN_CONFIDENCE);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            MatcherConfig::from_toml_str("matching_window_days = \"soon\""),
            Err(ReconcileError::Config(_))
        ));
        assert!(matches!(
            MatcherConfig::from_toml_str("min_confidence = 1.5"),
            Err(ReconcileError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/reconciliation.toml");
        assert!(matches!(result, Err(ReconcileError::Config(_))));
    }
}
