//! Traits for storage abstraction

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::reconciliation::rules::MatchingRule;
use crate::types::*;

/// Storage abstraction for the reconciliation system
///
/// The matcher reads candidates through this trait and writes matches only
/// through a [`StorageTransaction`] obtained from [`begin`](Self::begin), so any
/// backend (PostgreSQL, MySQL, SQLite, in-memory, etc.) can be plugged in.
#[async_trait]
pub trait ReconciliationStorage: Send + Sync {
    /// Unit of work type returned by [`begin`](Self::begin)
    type UnitOfWork: StorageTransaction;

    /// Unmatched, non-ignored incoming transactions dated on or after `since`,
    /// newest first
    async fn unmatched_transactions(
        &self,
        company_id: &str,
        since: NaiveDate,
    ) -> ReconcileResult<Vec<BankTransaction>>;

    /// Invoices awaiting payment with a due date on or after `due_since`,
    /// latest due date first
    async fn awaiting_invoices(
        &self,
        company_id: &str,
        due_since: NaiveDate,
    ) -> ReconcileResult<Vec<Invoice>>;

    /// Active matching rules for the company, highest priority first
    async fn active_rules(&self, company_id: &str) -> ReconcileResult<Vec<MatchingRule>>;

    /// Flag a transaction so it is never matched automatically
    async fn mark_transaction_ignored(&self, transaction_id: &str) -> ReconcileResult<()>;

    /// Incoming transaction counts for reporting
    async fn transaction_counts(&self, company_id: &str) -> ReconcileResult<TransactionCounts>;

    /// Start an atomic unit of work.
    ///
    /// Implementations must serialize units of work that touch the same
    /// company, so that re-reads made through the unit of work observe every
    /// previously committed match.
    async fn begin(&self) -> ReconcileResult<Self::UnitOfWork>;
}

/// An atomic unit of work over the reconciliation store
///
/// Writes become visible only after [`commit`](Self::commit). Dropping the unit
/// of work without committing discards every write.
#[async_trait]
pub trait StorageTransaction: Send {
    /// Read an invoice and hold it for update
    async fn invoice_for_update(&mut self, invoice_id: &str) -> ReconcileResult<Option<Invoice>>;

    /// Read a bank transaction and hold it for update
    async fn transaction_for_update(
        &mut self,
        transaction_id: &str,
    ) -> ReconcileResult<Option<BankTransaction>>;

    /// Highest payment number for the company starting with `prefix`
    async fn last_payment_number(
        &mut self,
        company_id: &str,
        prefix: &str,
    ) -> ReconcileResult<Option<String>>;

    /// Stage a new payment
    async fn insert_payment(&mut self, payment: &Payment) -> ReconcileResult<()>;

    /// Stage the invoice transition to paid
    async fn mark_invoice_paid(
        &mut self,
        invoice_id: &str,
        payment_date: NaiveDate,
    ) -> ReconcileResult<()>;

    /// Stage the transaction as consumed by a match
    async fn mark_transaction_matched(
        &mut self,
        transaction_id: &str,
        invoice_id: &str,
        payment_id: &str,
        matched_at: NaiveDateTime,
    ) -> ReconcileResult<()>;

    /// Apply all staged writes atomically
    async fn commit(&mut self) -> ReconcileResult<()>;

    /// Discard all staged writes
    async fn rollback(&mut self) -> ReconcileResult<()>;
}

/// Raw incoming transaction counts for a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCounts {
    pub total: u64,
    pub matched: u64,
}
