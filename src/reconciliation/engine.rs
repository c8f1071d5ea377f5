//! Invoice matcher orchestrating candidate selection, scoring and commits

use chrono::{Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

use crate::config::MatcherConfig;
use crate::reconciliation::commit;
use crate::reconciliation::rules::{RuleEngine, RuleOutcome};
use crate::reconciliation::scorer::{
    confidence_percent, from_basis_points, to_basis_points, ConfidenceScorer, ScoreWeights,
};
use crate::traits::*;
use crate::types::*;

/// Matches incoming bank transactions of one company to its open invoices
pub struct Matcher<S: ReconciliationStorage> {
    storage: S,
    company_id: String,
    config: MatcherConfig,
    weights: ScoreWeights,
}

/// Invoices awaiting payment keyed by id; iteration order is the tie-break
type InvoicePool = BTreeMap<String, Invoice>;

/// Confidence floor in basis points
fn base_floor(config: &MatcherConfig) -> u32 {
    to_basis_points(config.min_confidence)
}

/// An auto-match threshold can raise the floor but never lower it
fn rule_floor(base: u32, outcome: &RuleOutcome) -> u32 {
    outcome
        .auto_match_threshold()
        .map_or(base, |threshold| base.max(to_basis_points(threshold / 100.0)))
}

fn invoice_pool(invoices: Vec<Invoice>) -> InvoicePool {
    invoices
        .into_iter()
        .map(|invoice| (invoice.id.clone(), invoice))
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    invoice: &'a Invoice,
    points: u32,
}

impl<S: ReconciliationStorage> Matcher<S> {
    /// Create a matcher with the default configuration
    pub fn new(storage: S, company_id: String) -> Self {
        Self {
            storage,
            company_id,
            config: MatcherConfig::default(),
            weights: ScoreWeights::default(),
        }
    }

    /// Create a matcher with a validated custom configuration
    pub fn with_config(
        storage: S,
        company_id: String,
        config: MatcherConfig,
    ) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            company_id,
            config,
            weights: ScoreWeights::default(),
        })
    }

    /// Replace the scoring weights
    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn scorer(&self, config: &MatcherConfig) -> ConfidenceScorer {
        ConfidenceScorer::new(self.weights.clone(), config.amount_tolerance)
    }

    /// Match every eligible transaction of the window and commit the results
    pub async fn run_sweep(&self) -> ReconcileResult<Vec<MatchResult>> {
        self.sweep(&self.config, Utc::now().date_naive()).await
    }

    /// Sweep with a one-off window and amount tolerance
    pub async fn run_sweep_with(
        &self,
        matching_window_days: u32,
        amount_tolerance: f64,
    ) -> ReconcileResult<Vec<MatchResult>> {
        let config = MatcherConfig {
            matching_window_days,
            amount_tolerance,
            ..self.config.clone()
        };
        config.validate()?;
        self.sweep(&config, Utc::now().date_naive()).await
    }

    /// Sweep as if today were `today`
    pub async fn run_sweep_as_of(&self, today: NaiveDate) -> ReconcileResult<Vec<MatchResult>> {
        self.sweep(&self.config, today).await
    }

    #[instrument(skip(self, config), fields(company_id = %self.company_id))]
    async fn sweep(
        &self,
        config: &MatcherConfig,
        today: NaiveDate,
    ) -> ReconcileResult<Vec<MatchResult>> {
        let since = today - Duration::days(i64::from(config.matching_window_days));
        let due_since = today - Duration::days(i64::from(config.invoice_window_days()));

        let transactions = self
            .storage
            .unmatched_transactions(&self.company_id, since)
            .await?;
        if transactions.is_empty() {
            debug!("No unmatched transactions in window");
            return Ok(Vec::new());
        }

        let invoices = self
            .storage
            .awaiting_invoices(&self.company_id, due_since)
            .await?;

        info!(
            transactions = transactions.len(),
            invoices = invoices.len(),
            %since,
            %due_since,
            "Starting matching sweep"
        );

        let rules = match self.storage.active_rules(&self.company_id).await {
            Ok(rules) => RuleEngine::new(rules),
            Err(e) => {
                warn!(error = %e, "Failed to load matching rules, continuing without them");
                RuleEngine::empty()
            }
        };

        let scorer = self.scorer(config);
        let base = base_floor(config);
        let mut pool = invoice_pool(invoices);
        let mut results = Vec::new();

        for transaction in &transactions {
            let outcome = rules.evaluate(transaction);

            if outcome.is_ignored() {
                debug!(transaction_id = %transaction.id, "Transaction ignored by rule");
                if let Err(e) = self.storage.mark_transaction_ignored(&transaction.id).await {
                    warn!(transaction_id = %transaction.id, error = %e, "Failed to mark transaction ignored");
                }
                continue;
            }

            let floor = rule_floor(base, &outcome);
            let candidates = restrict_to_customer(&pool, outcome.customer_id());

            let Some(best) = select_best(&scorer, transaction, &candidates) else {
                debug!(transaction_id = %transaction.id, "No scoring invoice for transaction");
                continue;
            };

            if best.points < floor {
                debug!(
                    transaction_id = %transaction.id,
                    invoice_id = %best.invoice.id,
                    confidence = confidence_percent(best.points),
                    "Best candidate below confidence floor"
                );
                continue;
            }

            let invoice = best.invoice.clone();
            let points = best.points;

            if let Some(payment) = self.commit_with(config, transaction, &invoice).await {
                pool.remove(&invoice.id);
                results.push(match_result(
                    transaction,
                    &invoice,
                    points,
                    floor,
                    Some(payment.id),
                ));
            }
        }

        info!(matched = results.len(), "Matching sweep complete");
        Ok(results)
    }

    /// Score one transaction against the open invoices and commit the best match
    #[instrument(skip(self, transaction), fields(company_id = %self.company_id, transaction_id = %transaction.id))]
    pub async fn match_one(
        &self,
        transaction: &BankTransaction,
    ) -> ReconcileResult<Option<MatchResult>> {
        if !transaction.is_eligible() {
            debug!("Transaction is not eligible for matching");
            return Ok(None);
        }

        let pool = self.open_invoices().await?;
        let floor = base_floor(&self.config);
        let candidates: Vec<&Invoice> = pool.values().collect();

        let Some(best) = select_best(&self.scorer(&self.config), transaction, &candidates) else {
            return Ok(None);
        };

        if best.points < floor {
            debug!(
                invoice_id = %best.invoice.id,
                confidence = confidence_percent(best.points),
                "Best candidate below confidence floor"
            );
            return Ok(None);
        }

        Ok(self
            .commit_with(&self.config, transaction, best.invoice)
            .await
            .map(|payment| match_result(transaction, best.invoice, best.points, floor, Some(payment.id))))
    }

    /// Best candidate for manual review; never commits
    ///
    /// Candidates below the confidence floor are still returned, flagged with
    /// `meets_threshold = false`.
    #[instrument(skip(self, transaction), fields(company_id = %self.company_id, transaction_id = %transaction.id))]
    pub async fn suggest(
        &self,
        transaction: &BankTransaction,
    ) -> ReconcileResult<Option<MatchResult>> {
        if !transaction.is_eligible() {
            debug!("Transaction is not eligible for matching");
            return Ok(None);
        }

        let pool = self.open_invoices().await?;
        let floor = base_floor(&self.config);
        let candidates: Vec<&Invoice> = pool.values().collect();

        Ok(
            select_best(&self.scorer(&self.config), transaction, &candidates)
                .map(|best| match_result(transaction, best.invoice, best.points, floor, None)),
        )
    }

    /// Matching statistics for the company's incoming transactions
    pub async fn get_stats(&self) -> ReconcileResult<MatchingStats> {
        let counts = self.storage.transaction_counts(&self.company_id).await?;
        Ok(MatchingStats::from_counts(counts.total, counts.matched))
    }

    /// Record `transaction` as payment of `invoice`
    ///
    /// Returns `None` when the commit failed; every staged write is rolled back.
    pub async fn commit_match(
        &self,
        transaction: &BankTransaction,
        invoice: &Invoice,
    ) -> Option<Payment> {
        self.commit_with(&self.config, transaction, invoice).await
    }

    async fn commit_with(
        &self,
        config: &MatcherConfig,
        transaction: &BankTransaction,
        invoice: &Invoice,
    ) -> Option<Payment> {
        match commit::commit_match(&self.storage, &config.payment_prefix, transaction, invoice)
            .await
        {
            Ok(payment) => {
                info!(
                    transaction_id = %transaction.id,
                    invoice_id = %invoice.id,
                    payment_number = %payment.payment_number,
                    "Matched transaction to invoice"
                );
                Some(payment)
            }
            Err(e) => {
                error!(
                    transaction_id = %transaction.id,
                    invoice_id = %invoice.id,
                    error = %e,
                    "Failed to commit match"
                );
                None
            }
        }
    }

    async fn open_invoices(&self) -> ReconcileResult<InvoicePool> {
        let today = Utc::now().date_naive();
        let due_since = today - Duration::days(i64::from(self.config.invoice_window_days()));
        let invoices = self
            .storage
            .awaiting_invoices(&self.company_id, due_since)
            .await?;
        Ok(invoice_pool(invoices))
    }
}

/// Invoices of `customer_id` when the pool holds any, else the whole pool
fn restrict_to_customer<'a>(
    pool: &'a InvoicePool,
    customer_id: Option<&str>,
) -> Vec<&'a Invoice> {
    if let Some(customer_id) = customer_id {
        let preferred: Vec<&Invoice> = pool
            .values()
            .filter(|invoice| invoice.customer_id() == Some(customer_id))
            .collect();
        if !preferred.is_empty() {
            return preferred;
        }
    }
    pool.values().collect()
}

/// Highest-scoring candidate; the first one wins ties, zero scores never win
fn select_best<'a>(
    scorer: &ConfidenceScorer,
    transaction: &BankTransaction,
    candidates: &[&'a Invoice],
) -> Option<Candidate<'a>> {
    let mut best: Option<Candidate<'a>> = None;

    for invoice in candidates {
        let points = scorer.breakdown(transaction, invoice).total_points();
        if points == 0 {
            continue;
        }

        if best.map_or(true, |current| points > current.points) {
            best = Some(Candidate { invoice, points });
        }
    }

    best
}

fn match_result(
    transaction: &BankTransaction,
    invoice: &Invoice,
    points: u32,
    floor: u32,
    payment_id: Option<String>,
) -> MatchResult {
    MatchResult {
        transaction_id: transaction.id.clone(),
        invoice_id: invoice.id.clone(),
        amount: transaction.amount.clone(),
        score: from_basis_points(points),
        confidence: confidence_percent(points),
        invoice_number: invoice.invoice_number.clone(),
        invoice_total: invoice.total.clone(),
        payment_id,
        meets_threshold: points >= floor,
    }
}
