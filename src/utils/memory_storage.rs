//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::reconciliation::commit::payment_sequence;
use crate::reconciliation::rules::MatchingRule;
use crate::traits::*;
use crate::types::*;

/// Step at which a unit of work should fail, for exercising rollbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertPayment,
    MarkInvoicePaid,
    MarkTransactionMatched,
    Commit,
}

#[derive(Debug, Default)]
struct State {
    transactions: HashMap<String, BankTransaction>,
    invoices: HashMap<String, Invoice>,
    payments: HashMap<String, Payment>,
    rules: HashMap<String, MatchingRule>,
}

/// In-memory storage implementation for testing and development
///
/// Units of work are serialized through an async mutex and apply their staged
/// writes in a single write-locked section on commit.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
    commit_lock: Arc<Mutex<()>>,
    fail_point: Arc<RwLock<Option<FailPoint>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            commit_lock: Arc::new(Mutex::new(())),
            fail_point: Arc::new(RwLock::new(None)),
        }
    }

    fn read(&self) -> ReconcileResult<RwLockReadGuard<'_, State>> {
        read_state(&self.state)
    }

    fn write(&self) -> ReconcileResult<RwLockWriteGuard<'_, State>> {
        write_state(&self.state)
    }

    /// Insert or replace a bank transaction
    pub fn add_transaction(&self, transaction: BankTransaction) -> ReconcileResult<()> {
        self.write()?
            .transactions
            .insert(transaction.id.clone(), transaction);
        Ok(())
    }

    /// Insert or replace an invoice
    pub fn add_invoice(&self, invoice: Invoice) -> ReconcileResult<()> {
        self.write()?.invoices.insert(invoice.id.clone(), invoice);
        Ok(())
    }

    /// Insert or replace a payment, e.g. one recorded by hand
    pub fn add_payment(&self, payment: Payment) -> ReconcileResult<()> {
        self.write()?.payments.insert(payment.id.clone(), payment);
        Ok(())
    }

    /// Validate and store a matching rule
    pub fn add_rule(&self, rule: MatchingRule) -> ReconcileResult<()> {
        crate::utils::validation::validate_rule(&rule)?;
        self.write()?.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    pub fn get_transaction(&self, transaction_id: &str) -> ReconcileResult<Option<BankTransaction>> {
        Ok(self.read()?.transactions.get(transaction_id).cloned())
    }

    pub fn get_invoice(&self, invoice_id: &str) -> ReconcileResult<Option<Invoice>> {
        Ok(self.read()?.invoices.get(invoice_id).cloned())
    }

    /// All payments, ordered by payment number
    pub fn payments(&self) -> ReconcileResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.read()?.payments.values().cloned().collect();
        payments.sort_by(|a, b| a.payment_number.cmp(&b.payment_number));
        Ok(payments)
    }

    /// Make every following unit of work fail at `point` (`None` to disarm)
    pub fn set_fail_point(&self, point: Option<FailPoint>) -> ReconcileResult<()> {
        *self
            .fail_point
            .write()
            .map_err(|_| ReconcileError::Storage("fail point lock poisoned".to_string()))? = point;
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn read_state(state: &RwLock<State>) -> ReconcileResult<RwLockReadGuard<'_, State>> {
    state
        .read()
        .map_err(|_| ReconcileError::Storage("state lock poisoned".to_string()))
}

fn write_state(state: &RwLock<State>) -> ReconcileResult<RwLockWriteGuard<'_, State>> {
    state
        .write()
        .map_err(|_| ReconcileError::Storage("state lock poisoned".to_string()))
}

#[async_trait]
impl ReconciliationStorage for MemoryStorage {
    type UnitOfWork = MemoryUnitOfWork;

    async fn unmatched_transactions(
        &self,
        company_id: &str,
        since: NaiveDate,
    ) -> ReconcileResult<Vec<BankTransaction>> {
        let state = self.read()?;
        let mut transactions: Vec<BankTransaction> = state
            .transactions
            .values()
            .filter(|txn| {
                txn.company_id == company_id && txn.is_eligible() && txn.transaction_date >= since
            })
            .cloned()
            .collect();

        transactions.sort_by(|a, b| {
            b.transaction_date
                .cmp(&a.transaction_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(transactions)
    }

    async fn awaiting_invoices(
        &self,
        company_id: &str,
        due_since: NaiveDate,
    ) -> ReconcileResult<Vec<Invoice>> {
        let state = self.read()?;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|invoice| {
                invoice.company_id == company_id
                    && invoice.status.is_awaiting_payment()
                    && invoice.due_date.is_some_and(|due| due >= due_since)
            })
            .cloned()
            .collect();

        invoices.sort_by(|a, b| b.due_date.cmp(&a.due_date).then_with(|| a.id.cmp(&b.id)));
        Ok(invoices)
    }

    async fn active_rules(&self, company_id: &str) -> ReconcileResult<Vec<MatchingRule>> {
        let state = self.read()?;
        let mut rules: Vec<MatchingRule> = state
            .rules
            .values()
            .filter(|rule| rule.company_id == company_id && rule.is_active)
            .cloned()
            .collect();

        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(rules)
    }

    async fn mark_transaction_ignored(&self, transaction_id: &str) -> ReconcileResult<()> {
        let mut state = self.write()?;
        let transaction = state
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| ReconcileError::TransactionNotFound(transaction_id.to_string()))?;
        transaction.processing_status = ProcessingStatus::Ignored;
        Ok(())
    }

    async fn transaction_counts(&self, company_id: &str) -> ReconcileResult<TransactionCounts> {
        let state = self.read()?;
        let incoming = state
            .transactions
            .values()
            .filter(|txn| txn.company_id == company_id && txn.is_incoming());

        let (total, matched) = incoming.fold((0, 0), |(total, matched), txn| {
            (total + 1, matched + u64::from(txn.is_matched()))
        });

        Ok(TransactionCounts { total, matched })
    }

    async fn begin(&self) -> ReconcileResult<MemoryUnitOfWork> {
        let guard = self.commit_lock.clone().lock_owned().await;
        let fail_point = *self
            .fail_point
            .read()
            .map_err(|_| ReconcileError::Storage("fail point lock poisoned".to_string()))?;

        Ok(MemoryUnitOfWork {
            state: Arc::clone(&self.state),
            fail_point,
            _guard: guard,
            payments: Vec::new(),
            paid_invoices: Vec::new(),
            matched_transactions: Vec::new(),
        })
    }
}

struct MatchedTransaction {
    transaction_id: String,
    invoice_id: String,
    payment_id: String,
    matched_at: NaiveDateTime,
}

/// Unit of work over [`MemoryStorage`]; holds the storage commit lock until dropped
pub struct MemoryUnitOfWork {
    state: Arc<RwLock<State>>,
    fail_point: Option<FailPoint>,
    _guard: OwnedMutexGuard<()>,
    payments: Vec<Payment>,
    paid_invoices: Vec<(String, NaiveDate)>,
    matched_transactions: Vec<MatchedTransaction>,
}

impl MemoryUnitOfWork {
    fn check_fail_point(&self, point: FailPoint) -> ReconcileResult<()> {
        if self.fail_point == Some(point) {
            return Err(ReconcileError::Storage(format!(
                "simulated failure at {:?}",
                point
            )));
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.payments.clear();
        self.paid_invoices.clear();
        self.matched_transactions.clear();
    }
}

#[async_trait]
impl StorageTransaction for MemoryUnitOfWork {
    async fn invoice_for_update(&mut self, invoice_id: &str) -> ReconcileResult<Option<Invoice>> {
        Ok(read_state(&self.state)?.invoices.get(invoice_id).cloned())
    }

    async fn transaction_for_update(
        &mut self,
        transaction_id: &str,
    ) -> ReconcileResult<Option<BankTransaction>> {
        Ok(read_state(&self.state)?
            .transactions
            .get(transaction_id)
            .cloned())
    }

    async fn last_payment_number(
        &mut self,
        company_id: &str,
        prefix: &str,
    ) -> ReconcileResult<Option<String>> {
        let state = read_state(&self.state)?;
        let last = state
            .payments
            .values()
            .chain(self.payments.iter())
            .filter(|p| p.company_id == company_id && p.payment_number.starts_with(prefix))
            .max_by_key(|p| payment_sequence(&p.payment_number).unwrap_or(0))
            .map(|p| p.payment_number.clone());
        Ok(last)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> ReconcileResult<()> {
        self.check_fail_point(FailPoint::InsertPayment)?;
        self.payments.push(payment.clone());
        Ok(())
    }

    async fn mark_invoice_paid(
        &mut self,
        invoice_id: &str,
        payment_date: NaiveDate,
    ) -> ReconcileResult<()> {
        self.check_fail_point(FailPoint::MarkInvoicePaid)?;
        if !read_state(&self.state)?.invoices.contains_key(invoice_id) {
            return Err(ReconcileError::InvoiceNotFound(invoice_id.to_string()));
        }
        self.paid_invoices
            .push((invoice_id.to_string(), payment_date));
        Ok(())
    }

    async fn mark_transaction_matched(
        &mut self,
        transaction_id: &str,
        invoice_id: &str,
        payment_id: &str,
        matched_at: NaiveDateTime,
    ) -> ReconcileResult<()> {
        self.check_fail_point(FailPoint::MarkTransactionMatched)?;
        if !read_state(&self.state)?
            .transactions
            .contains_key(transaction_id)
        {
            return Err(ReconcileError::TransactionNotFound(
                transaction_id.to_string(),
            ));
        }
        self.matched_transactions.push(MatchedTransaction {
            transaction_id: transaction_id.to_string(),
            invoice_id: invoice_id.to_string(),
            payment_id: payment_id.to_string(),
            matched_at,
        });
        Ok(())
    }

    async fn commit(&mut self) -> ReconcileResult<()> {
        self.check_fail_point(FailPoint::Commit)?;

        let mut state = write_state(&self.state)?;

        // Validate every target before applying anything
        for (invoice_id, _) in &self.paid_invoices {
            if !state.invoices.contains_key(invoice_id) {
                return Err(ReconcileError::InvoiceNotFound(invoice_id.clone()));
            }
        }
        for matched in &self.matched_transactions {
            if !state.transactions.contains_key(&matched.transaction_id) {
                return Err(ReconcileError::TransactionNotFound(
                    matched.transaction_id.clone(),
                ));
            }
        }

        for payment in self.payments.drain(..) {
            state.payments.insert(payment.id.clone(), payment);
        }

        for (invoice_id, payment_date) in self.paid_invoices.drain(..) {
            if let Some(invoice) = state.invoices.get_mut(&invoice_id) {
                invoice.status = InvoiceStatus::Paid;
                invoice.paid_status = PaidStatus::Completed;
                invoice.payment_date = Some(payment_date);
            }
        }

        for matched in self.matched_transactions.drain(..) {
            if let Some(transaction) = state.transactions.get_mut(&matched.transaction_id) {
                transaction.matched_invoice_id = Some(matched.invoice_id);
                transaction.matched_payment_id = Some(matched.payment_id);
                transaction.matched_at = Some(matched.matched_at);
            }
        }

        Ok(())
    }

    async fn rollback(&mut self) -> ReconcileResult<()> {
        self.discard();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        for (id, day, amount) in [("t1", 10, 100), ("t2", 12, 200), ("t3", 12, -50)] {
            storage
                .add_transaction(BankTransaction::new(
                    id.to_string(),
                    "c1".to_string(),
                    BigDecimal::from(amount),
                    date(2025, 1, day),
                ))
                .unwrap();
        }
        storage
            .add_transaction(BankTransaction::new(
                "other".to_string(),
                "c2".to_string(),
                BigDecimal::from(100),
                date(2025, 1, 12),
            ))
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_unmatched_transactions_filter_and_order() {
        let storage = seeded();
        let transactions = storage
            .unmatched_transactions("c1", date(2025, 1, 1))
            .await
            .unwrap();
        let ids: Vec<&str> = transactions.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);

        let recent = storage
            .unmatched_transactions("c1", date(2025, 1, 11))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_ignored_transactions_excluded() {
        let storage = seeded();
        storage.mark_transaction_ignored("t1").await.unwrap();
        let transactions = storage
            .unmatched_transactions("c1", date(2025, 1, 1))
            .await
            .unwrap();
        assert_eq!(transactions.len(), 1);
        assert!(storage.mark_transaction_ignored("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_awaiting_invoices_window() {
        let storage = MemoryStorage::new();
        let mut paid = Invoice::new(
            "i1".to_string(),
            "c1".to_string(),
            "INV-1".to_string(),
            BigDecimal::from(10),
            date(2025, 1, 1),
            Some(date(2025, 1, 20)),
        );
        paid.status = InvoiceStatus::Paid;
        storage.add_invoice(paid).unwrap();

        for (id, due) in [("i2", Some(date(2025, 1, 5))), ("i3", Some(date(2025, 1, 25))), ("i4", None)] {
            storage
                .add_invoice(Invoice::new(
                    id.to_string(),
                    "c1".to_string(),
                    id.to_uppercase(),
                    BigDecimal::from(10),
                    date(2025, 1, 1),
                    due,
                ))
                .unwrap();
        }

        let invoices = storage
            .awaiting_invoices("c1", date(2025, 1, 1))
            .await
            .unwrap();
        let ids: Vec<&str> = invoices.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i3", "i2"]);
    }

    #[tokio::test]
    async fn test_viewed_invoices_are_not_candidates() {
        let storage = MemoryStorage::new();
        let mut viewed = Invoice::new(
            "i1".to_string(),
            "c1".to_string(),
            "INV-1".to_string(),
            BigDecimal::from(10),
            date(2025, 1, 1),
            Some(date(2025, 1, 20)),
        );
        viewed.status = InvoiceStatus::Viewed;
        viewed.paid_status = PaidStatus::PartiallyPaid;
        storage.add_invoice(viewed).unwrap();

        let invoices = storage
            .awaiting_invoices("c1", date(2025, 1, 1))
            .await
            .unwrap();
        assert!(invoices.is_empty());
    }

    #[tokio::test]
    async fn test_last_payment_number_includes_recorded_payments() {
        let storage = seeded();
        for (id, number, method) in [
            ("p1", "PAY-202501-0007", PaymentMethod::Cash),
            ("p2", "PAY-202501-0003", PaymentMethod::Card),
            ("p3", "PAY-202412-0040", PaymentMethod::BankTransfer),
        ] {
            storage
                .add_payment(Payment {
                    id: id.to_string(),
                    company_id: "c1".to_string(),
                    invoice_id: "i0".to_string(),
                    customer_id: None,
                    amount: BigDecimal::from(10),
                    currency: None,
                    payment_date: date(2025, 1, 2),
                    payment_number: number.to_string(),
                    payment_method: method,
                    notes: String::new(),
                    reference: None,
                    created_at: date(2025, 1, 2).and_hms_opt(9, 0, 0).unwrap(),
                })
                .unwrap();
        }

        let mut unit = storage.begin().await.unwrap();
        let last = unit
            .last_payment_number("c1", "PAY-202501-")
            .await
            .unwrap();
        assert_eq!(last.as_deref(), Some("PAY-202501-0007"));
        assert_eq!(unit.last_payment_number("c2", "PAY-202501-").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transaction_counts() {
        let storage = seeded();
        let mut matched = storage.get_transaction("t1").unwrap().unwrap();
        matched.matched_invoice_id = Some("i1".to_string());
        storage.add_transaction(matched).unwrap();

        let counts = storage.transaction_counts("c1").await.unwrap();
        assert_eq!(counts, TransactionCounts { total: 2, matched: 1 });
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes() {
        let storage = seeded();
        {
            let mut unit = storage.begin().await.unwrap();
            unit.mark_transaction_matched("t1", "i1", "p1", date(2025, 1, 10).and_hms_opt(0, 0, 0).unwrap())
                .await
                .unwrap();
        }
        assert!(!storage.get_transaction("t1").unwrap().unwrap().is_matched());

        // the lock was released on drop
        let mut unit = storage.begin().await.unwrap();
        unit.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_point_on_commit() {
        let storage = seeded();
        storage.set_fail_point(Some(FailPoint::Commit)).unwrap();

        let mut unit = storage.begin().await.unwrap();
        unit.mark_transaction_matched("t1", "i1", "p1", date(2025, 1, 10).and_hms_opt(0, 0, 0).unwrap())
            .await
            .unwrap();
        assert!(unit.commit().await.is_err());
        drop(unit);

        assert!(!storage.get_transaction("t1").unwrap().unwrap().is_matched());
    }
}
