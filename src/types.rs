//! Core types and data structures for the reconciliation system

use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Invoice lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Not yet issued to the customer
    Draft,
    /// Issued and awaiting payment
    Sent,
    /// Opened by the customer, not necessarily payable yet
    Viewed,
    /// Closed without payment tracking
    Completed,
    /// Settled by a payment
    Paid,
}

impl InvoiceStatus {
    /// Only sent invoices are candidates for automatic matching
    pub fn is_awaiting_payment(&self) -> bool {
        matches!(self, InvoiceStatus::Sent)
    }
}

/// Payment progress of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaidStatus {
    Unpaid,
    PartiallyPaid,
    Completed,
}

/// How a payment was received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Card,
    Cash,
}

/// Processing state of a bank transaction as far as the matcher is concerned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Eligible for matching
    #[default]
    Pending,
    /// Skipped by a matching rule; never matched automatically
    Ignored,
}

/// Customer an invoice is billed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Unique identifier for the customer
    pub id: String,
    /// Display name, compared against the transaction counterparty
    pub name: String,
    /// Optional bank account identifier (IBAN or similar)
    pub bank_account: Option<String>,
}

impl Customer {
    /// Create a new customer without a bank account
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            bank_account: None,
        }
    }

    /// Attach a bank account identifier
    pub fn with_bank_account(mut self, bank_account: String) -> Self {
        self.bank_account = Some(bank_account);
        self
    }
}

/// A bank feed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Unique identifier for the transaction
    pub id: String,
    /// Company (scope) the transaction belongs to
    pub company_id: String,
    /// Signed amount, positive for incoming money
    pub amount: BigDecimal,
    /// Currency code as reported by the bank
    pub currency: Option<String>,
    /// Booking date
    pub transaction_date: NaiveDate,
    /// Free-text description from the bank
    pub description: Option<String>,
    /// Remittance or payment reference text
    pub remittance_info: Option<String>,
    /// Payer name
    pub debtor_name: Option<String>,
    /// Payee name
    pub creditor_name: Option<String>,
    /// Payer account identifier
    pub debtor_account: Option<String>,
    /// Payee account identifier
    pub creditor_account: Option<String>,
    /// Reference assigned by the bank
    pub external_reference: Option<String>,
    /// Invoice this transaction was matched to
    pub matched_invoice_id: Option<String>,
    /// Payment created by the match
    pub matched_payment_id: Option<String>,
    /// When the match was committed
    pub matched_at: Option<NaiveDateTime>,
    /// Matcher processing state
    #[serde(default)]
    pub processing_status: ProcessingStatus,
}

impl BankTransaction {
    /// Create a new unmatched transaction
    pub fn new(
        id: String,
        company_id: String,
        amount: BigDecimal,
        transaction_date: NaiveDate,
    ) -> Self {
        Self {
            id,
            company_id,
            amount,
            currency: None,
            transaction_date,
            description: None,
            remittance_info: None,
            debtor_name: None,
            creditor_name: None,
            debtor_account: None,
            creditor_account: None,
            external_reference: None,
            matched_invoice_id: None,
            matched_payment_id: None,
            matched_at: None,
            processing_status: ProcessingStatus::Pending,
        }
    }

    /// Incoming transactions carry a positive amount
    pub fn is_incoming(&self) -> bool {
        self.amount > BigDecimal::zero()
    }

    /// Whether the transaction has already been matched to an invoice
    pub fn is_matched(&self) -> bool {
        self.matched_invoice_id.is_some()
    }

    /// Whether the transaction may still be picked up by a sweep
    pub fn is_eligible(&self) -> bool {
        self.is_incoming()
            && !self.is_matched()
            && self.processing_status != ProcessingStatus::Ignored
    }

    /// The other party: the payer for incoming money, the payee otherwise
    pub fn counterparty_name(&self) -> Option<&str> {
        if self.is_incoming() {
            self.debtor_name.as_deref()
        } else {
            self.creditor_name.as_deref()
        }
    }
}

/// An issued invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier for the invoice
    pub id: String,
    /// Company (scope) the invoice belongs to
    pub company_id: String,
    /// Human-readable invoice number, searched for in payment references
    pub invoice_number: String,
    /// Amount due
    pub total: BigDecimal,
    /// Currency code
    pub currency: Option<String>,
    /// Issue date
    pub invoice_date: NaiveDate,
    /// Due date, if any
    pub due_date: Option<NaiveDate>,
    /// Lifecycle state
    pub status: InvoiceStatus,
    /// Payment progress
    pub paid_status: PaidStatus,
    /// Date the invoice was settled
    pub payment_date: Option<NaiveDate>,
    /// Billed customer
    pub customer: Option<Customer>,
}

impl Invoice {
    /// Create a new sent, unpaid invoice
    pub fn new(
        id: String,
        company_id: String,
        invoice_number: String,
        total: BigDecimal,
        invoice_date: NaiveDate,
        due_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            company_id,
            invoice_number,
            total,
            currency: None,
            invoice_date,
            due_date,
            status: InvoiceStatus::Sent,
            paid_status: PaidStatus::Unpaid,
            payment_date: None,
            customer: None,
        }
    }

    /// Attach the billed customer
    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(|c| c.id.as_str())
    }
}

/// A payment recorded against an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier for the payment
    pub id: String,
    /// Company (scope) the payment belongs to
    pub company_id: String,
    /// Settled invoice
    pub invoice_id: String,
    /// Paying customer
    pub customer_id: Option<String>,
    /// Amount received, always the bank transaction amount
    pub amount: BigDecimal,
    /// Currency code copied from the invoice
    pub currency: Option<String>,
    /// Date the money arrived
    pub payment_date: NaiveDate,
    /// Sequential number, e.g. `PAY-202501-0001`
    pub payment_number: String,
    /// How the payment was received
    pub payment_method: PaymentMethod,
    /// Free-text note
    pub notes: String,
    /// Bank reference of the source transaction
    pub reference: Option<String>,
    /// When the payment was recorded
    pub created_at: NaiveDateTime,
}

/// A scored pairing of a transaction with an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub transaction_id: String,
    pub invoice_id: String,
    /// Transaction amount
    pub amount: BigDecimal,
    /// Confidence score in `[0.0, 1.0]`
    pub score: f64,
    /// Score as a percentage with one decimal place
    pub confidence: f64,
    pub invoice_number: String,
    pub invoice_total: BigDecimal,
    /// Payment created for this match, if it was committed
    pub payment_id: Option<String>,
    /// Whether the score cleared the confidence floor
    pub meets_threshold: bool,
}

/// Aggregate matching figures for a company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingStats {
    pub total_transactions: u64,
    pub matched_transactions: u64,
    pub unmatched_transactions: u64,
    /// Matched share in percent with one decimal place
    pub match_rate_percent: f64,
}

impl MatchingStats {
    /// Build stats from raw counts
    pub fn from_counts(total: u64, matched: u64) -> Self {
        let match_rate_percent = if total > 0 {
            round_one_decimal(matched as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        Self {
            total_transactions: total,
            matched_transactions: matched,
            unmatched_transactions: total.saturating_sub(matched),
            match_rate_percent,
        }
    }
}

/// Round to one decimal place for display figures
pub(crate) fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Errors that can occur in the reconciliation system
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Invoice is no longer awaiting payment: {0}")]
    AlreadyPaid(String),
    #[error("Transaction is already matched: {0}")]
    AlreadyMatched(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid matching rule: {0}")]
    InvalidRule(String),
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
