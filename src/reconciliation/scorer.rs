//! Confidence scoring for (transaction, invoice) pairs
//!
//! Five independent signals are summed and capped at 1.0:
//!
//! | Signal    | Max  |
//! |-----------|------|
//! | Amount    | 0.40 |
//! | Date      | 0.20 |
//! | Reference | 0.30 |
//! | Name      | 0.20 |
//! | Account   | 0.10 |
//!
//! Contributions are kept in basis points so that sums compare exactly
//! against the confidence floor.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_AMOUNT_TOLERANCE;
use crate::reconciliation::similarity::Similarity;
use crate::types::*;

/// One whole score in basis points
pub const SCORE_SCALE: u32 = 10_000;

/// Convert a `[0.0, 1.0]` score to basis points
pub fn to_basis_points(score: f64) -> u32 {
    (score.clamp(0.0, 1.0) * SCORE_SCALE as f64).round() as u32
}

/// Convert basis points back to a `[0.0, 1.0]` score
pub fn from_basis_points(points: u32) -> f64 {
    points.min(SCORE_SCALE) as f64 / SCORE_SCALE as f64
}

/// Percentage with one decimal place for a score in basis points
pub fn confidence_percent(points: u32) -> f64 {
    (points.min(SCORE_SCALE) as f64 / 10.0).round() / 10.0
}

/// Weight table for the scorer, in basis points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub amount_exact: u32,
    pub amount_near: u32,
    /// Date score on the same day; decreases by `date_step` per day up to 3 days
    pub date_max: u32,
    pub date_step: u32,
    /// Flat date score for 4 to 7 days
    pub date_week: u32,
    pub reference_full: u32,
    pub reference_partial: u32,
    /// (minimum similarity percent, points), strongest first
    pub name_tiers: Vec<(usize, u32)>,
    pub account: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            amount_exact: 4_000,
            amount_near: 3_500,
            date_max: 2_000,
            date_step: 500,
            date_week: 1_000,
            reference_full: 3_000,
            reference_partial: 1_500,
            name_tiers: vec![(80, 2_000), (60, 1_500), (40, 1_000)],
            account: 1_000,
        }
    }
}

/// Per-signal contributions of a score, in basis points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub amount: u32,
    pub date: u32,
    pub reference: u32,
    pub name: u32,
    pub account: u32,
}

impl ScoreBreakdown {
    /// Sum of all signals capped at [`SCORE_SCALE`]
    pub fn total_points(&self) -> u32 {
        (self.amount + self.date + self.reference + self.name + self.account).min(SCORE_SCALE)
    }

    /// Total score in `[0.0, 1.0]`
    pub fn total(&self) -> f64 {
        from_basis_points(self.total_points())
    }

    /// Total score as a percentage with one decimal place
    pub fn confidence_percent(&self) -> f64 {
        confidence_percent(self.total_points())
    }
}

/// Weighted multi-signal scorer
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceScorer {
    weights: ScoreWeights,
    amount_tolerance: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(ScoreWeights::default(), DEFAULT_AMOUNT_TOLERANCE)
    }
}

impl ConfidenceScorer {
    /// Create a scorer with custom weights and amount tolerance
    pub fn new(weights: ScoreWeights, amount_tolerance: f64) -> Self {
        Self {
            weights,
            amount_tolerance,
        }
    }

    /// Score a pair, in `[0.0, 1.0]`
    pub fn score(&self, transaction: &BankTransaction, invoice: &Invoice) -> f64 {
        self.breakdown(transaction, invoice).total()
    }

    /// Score a pair and keep the per-signal contributions
    pub fn breakdown(&self, transaction: &BankTransaction, invoice: &Invoice) -> ScoreBreakdown {
        ScoreBreakdown {
            amount: self.amount_points(&transaction.amount, &invoice.total),
            date: self.date_points(transaction, invoice),
            reference: self.reference_points(transaction, &invoice.invoice_number),
            name: self.name_points(transaction, invoice),
            account: self.account_points(transaction, invoice),
        }
    }

    fn amount_points(&self, amount: &BigDecimal, total: &BigDecimal) -> u32 {
        if amount == total {
            return self.weights.amount_exact;
        }

        if *total <= BigDecimal::zero() {
            return 0;
        }

        let relative = ((amount - total).abs() / total)
            .to_f64()
            .unwrap_or(f64::MAX);

        if relative <= self.amount_tolerance {
            self.weights.amount_near
        } else {
            0
        }
    }

    fn date_points(&self, transaction: &BankTransaction, invoice: &Invoice) -> u32 {
        let days_from = |date: chrono::NaiveDate| {
            (transaction.transaction_date - date).num_days().unsigned_abs()
        };

        let min_days = match invoice.due_date {
            Some(due) => days_from(invoice.invoice_date).min(days_from(due)),
            None => days_from(invoice.invoice_date),
        };

        if min_days <= 3 {
            self.weights
                .date_max
                .saturating_sub(self.weights.date_step * min_days as u32)
        } else if min_days <= 7 {
            self.weights.date_week
        } else {
            0
        }
    }

    fn reference_points(&self, transaction: &BankTransaction, invoice_number: &str) -> u32 {
        let invoice_number = invoice_number.trim().to_lowercase();
        if invoice_number.is_empty() {
            return 0;
        }

        let haystacks: Vec<String> = [&transaction.description, &transaction.remittance_info]
            .into_iter()
            .flatten()
            .map(|text| text.to_lowercase())
            .collect();

        if haystacks.iter().any(|text| text.contains(&invoice_number)) {
            return self.weights.reference_full;
        }

        let digits: Vec<char> = invoice_number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() >= 4 {
            let last_four: String = digits[digits.len() - 4..].iter().collect();
            if haystacks.iter().any(|text| text.contains(&last_four)) {
                return self.weights.reference_partial;
            }
        }

        0
    }

    fn name_points(&self, transaction: &BankTransaction, invoice: &Invoice) -> u32 {
        let customer_name = match invoice.customer.as_ref() {
            Some(customer) => customer.name.trim().to_lowercase(),
            None => return 0,
        };
        let counterparty = transaction
            .counterparty_name()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        let Some(similarity) = Similarity::between(&customer_name, &counterparty) else {
            return 0;
        };

        self.weights
            .name_tiers
            .iter()
            .find(|(percent, _)| similarity.at_least(*percent))
            .map(|(_, points)| *points)
            .unwrap_or(0)
    }

    fn account_points(&self, transaction: &BankTransaction, invoice: &Invoice) -> u32 {
        let customer_account = invoice
            .customer
            .as_ref()
            .and_then(|c| c.bank_account.as_deref())
            .map(normalize_account)
            .unwrap_or_default();

        if customer_account.is_empty() {
            return 0;
        }

        let matches = [&transaction.debtor_account, &transaction.creditor_account]
            .into_iter()
            .flatten()
            .any(|account| normalize_account(account) == customer_account);

        if matches {
            self.weights.account
        } else {
            0
        }
    }
}

/// Score a pair with the default weights and tolerance
pub fn score(transaction: &BankTransaction, invoice: &Invoice) -> f64 {
    ConfidenceScorer::default().score(transaction, invoice)
}

fn normalize_account(account: &str) -> String {
    account
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn amount(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn invoice(total: &str, number: &str) -> Invoice {
        Invoice::new(
            "inv1".to_string(),
            "c1".to_string(),
            number.to_string(),
            amount(total),
            date(2025, 1, 1),
            Some(date(2025, 1, 15)),
        )
    }

    fn transaction(value: &str, on: NaiveDate) -> BankTransaction {
        BankTransaction::new("t1".to_string(), "c1".to_string(), amount(value), on)
    }

    #[test]
    fn test_exact_match_scenario() {
        let inv = invoice("1500.00", "INV-2025-001");
        let mut txn = transaction("1500.00", date(2025, 1, 15));
        txn.description = Some("Payment for INV-2025-001".to_string());

        let breakdown = ConfidenceScorer::default().breakdown(&txn, &inv);
        assert_eq!(breakdown.amount, 4_000);
        assert_eq!(breakdown.date, 2_000);
        assert_eq!(breakdown.reference, 3_000);
        assert_eq!(breakdown.name, 0);
        assert_eq!(breakdown.account, 0);
        assert_eq!(breakdown.total(), 0.9);
        assert_eq!(breakdown.confidence_percent(), 90.0);
    }

    #[test]
    fn test_amount_within_tolerance() {
        let inv = invoice("1000.00", "X");
        let txn = transaction("999.50", date(2025, 3, 1));

        let breakdown = ConfidenceScorer::default().breakdown(&txn, &inv);
        assert_eq!(breakdown.amount, 3_500);
        assert_eq!(score(&txn, &inv), 0.35);
    }

    #[test]
    fn test_amount_outside_tolerance_and_zero_total() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.amount_points(&amount("980"), &amount("1000")), 0);
        assert_eq!(scorer.amount_points(&amount("10"), &amount("0")), 0);
        assert_eq!(scorer.amount_points(&amount("0"), &amount("0")), 4_000);
    }

    #[test]
    fn test_date_proximity_steps() {
        let scorer = ConfidenceScorer::default();
        let inv = invoice("1", "X");
        let expected = [
            (15, 2_000),
            (16, 1_500),
            (17, 1_000),
            (18, 500),
            (19, 1_000),
            (22, 1_000),
            (23, 0),
        ];
        for (day, points) in expected {
            let txn = transaction("5", date(2025, 1, day));
            assert_eq!(scorer.date_points(&txn, &inv), points, "day {}", day);
        }
    }

    #[test]
    fn test_date_without_due_date_uses_invoice_date() {
        let mut inv = invoice("1", "X");
        inv.due_date = None;
        let txn = transaction("5", date(2025, 1, 2));
        assert_eq!(ConfidenceScorer::default().date_points(&txn, &inv), 1_500);
    }

    #[test]
    fn test_reference_partial_digits() {
        let scorer = ConfidenceScorer::default();
        let mut txn = transaction("5", date(2025, 1, 1));
        txn.remittance_info = Some("uplata po faktura 2025-0042".to_string());

        assert_eq!(scorer.reference_points(&txn, "FAK-2025-0042"), 1_500);
        assert_eq!(scorer.reference_points(&txn, "2025-0042"), 3_000);
        assert_eq!(scorer.reference_points(&txn, "INV-12"), 0);
        assert_eq!(scorer.reference_points(&txn, ""), 0);
    }

    #[test]
    fn test_reference_is_case_insensitive() {
        let mut txn = transaction("5", date(2025, 1, 1));
        txn.description = Some("PAYMENT inv-2025-001".to_string());
        assert_eq!(
            ConfidenceScorer::default().reference_points(&txn, "INV-2025-001"),
            3_000
        );
    }

    #[test]
    fn test_name_tiers() {
        let scorer = ConfidenceScorer::default();
        let inv = invoice("1", "X").with_customer(Customer::new(
            "cust1".to_string(),
            "Acme Trading".to_string(),
        ));

        let cases = [
            ("ACME TRADING", 2_000),
            ("Acme Tradin", 2_000),
            ("Acme Trade Co", 1_500),
            ("Acme Co", 1_000),
            ("Globex", 0),
        ];
        for (name, points) in cases {
            let mut txn = transaction("5", date(2025, 1, 1));
            txn.debtor_name = Some(name.to_string());
            assert_eq!(scorer.name_points(&txn, &inv), points, "name {}", name);
        }
    }

    #[test]
    fn test_name_uses_creditor_for_outgoing() {
        let scorer = ConfidenceScorer::default();
        let inv = invoice("1", "X").with_customer(Customer::new(
            "cust1".to_string(),
            "Acme".to_string(),
        ));
        let mut txn = transaction("-5", date(2025, 1, 1));
        txn.debtor_name = Some("Acme".to_string());
        assert_eq!(scorer.name_points(&txn, &inv), 0);
        txn.creditor_name = Some("Acme".to_string());
        assert_eq!(scorer.name_points(&txn, &inv), 2_000);
    }

    #[test]
    fn test_missing_names_contribute_nothing() {
        let scorer = ConfidenceScorer::default();
        let inv = invoice("1", "X")
            .with_customer(Customer::new("cust1".to_string(), "".to_string()));
        let mut txn = transaction("5", date(2025, 1, 1));
        txn.debtor_name = Some("Acme".to_string());
        assert_eq!(scorer.name_points(&txn, &inv), 0);
    }

    #[test]
    fn test_account_match_ignores_spacing_and_case() {
        let scorer = ConfidenceScorer::default();
        let inv = invoice("1", "X").with_customer(
            Customer::new("cust1".to_string(), "Acme".to_string())
                .with_bank_account("MK07 1234 5678".to_string()),
        );
        let mut txn = transaction("5", date(2025, 1, 1));
        txn.debtor_account = Some("mk0712345678".to_string());
        assert_eq!(scorer.account_points(&txn, &inv), 1_000);

        txn.debtor_account = Some("MK07999".to_string());
        assert_eq!(scorer.account_points(&txn, &inv), 0);
    }

    #[test]
    fn test_score_is_capped_and_deterministic() {
        let weights = ScoreWeights {
            amount_exact: 9_000,
            ..ScoreWeights::default()
        };
        let scorer = ConfidenceScorer::new(weights, 0.01);
        let inv = invoice("100", "INV-1");
        let mut txn = transaction("100", date(2025, 1, 15));
        txn.description = Some("INV-1".to_string());

        let first = scorer.score(&txn, &inv);
        assert_eq!(first, 1.0);
        assert_eq!(first, scorer.score(&txn, &inv));
    }

    #[test]
    fn test_basis_point_conversion() {
        assert_eq!(to_basis_points(0.7), 7_000);
        assert_eq!(to_basis_points(1.5), SCORE_SCALE);
        assert_eq!(from_basis_points(7_000), 0.7);
        assert_eq!(confidence_percent(7_350), 73.5);
    }
}
