//! Commit step: turn an accepted match into a payment
//!
//! The payment insert, the invoice transition and the transaction tag are
//! staged on one [`StorageTransaction`] and committed together. The invoice and
//! transaction are re-read through the unit of work, so a match that lost a
//! race against another sweep fails instead of paying an invoice twice.

use chrono::{NaiveDate, Utc};
use tracing::warn;

use crate::traits::*;
use crate::types::*;

/// Width of the zero-padded payment sequence
pub const PAYMENT_SEQUENCE_WIDTH: usize = 4;

/// Month prefix for payment numbers, e.g. `PAY-202501-`
pub fn payment_number_prefix(prefix: &str, payment_date: NaiveDate) -> String {
    format!("{}{}-", prefix, payment_date.format("%Y%m"))
}

/// Sequence number of a payment number, if it carries one
pub fn payment_sequence(payment_number: &str) -> Option<u32> {
    payment_number
        .rsplit('-')
        .next()
        .and_then(|suffix| suffix.parse::<u32>().ok())
}

/// Next payment number after `last` within the month prefix
pub fn next_payment_number(month_prefix: &str, last: Option<&str>) -> String {
    let next = last.and_then(payment_sequence).unwrap_or(0) + 1;
    format!(
        "{}{:0width$}",
        month_prefix,
        next,
        width = PAYMENT_SEQUENCE_WIDTH
    )
}

/// Atomically record `transaction` as payment of `invoice`
///
/// Every staged write is rolled back when any step fails.
pub async fn commit_match<S: ReconciliationStorage>(
    storage: &S,
    payment_prefix: &str,
    transaction: &BankTransaction,
    invoice: &Invoice,
) -> ReconcileResult<Payment> {
    let mut unit = storage.begin().await?;

    let staged = match stage_match(&mut unit, payment_prefix, transaction, invoice).await {
        Ok(payment) => unit.commit().await.map(|_| payment),
        Err(e) => Err(e),
    };

    match staged {
        Ok(payment) => Ok(payment),
        Err(e) => {
            if let Err(rollback_error) = unit.rollback().await {
                warn!(
                    transaction_id = %transaction.id,
                    error = %rollback_error,
                    "Rollback after failed match reported an error"
                );
            }
            Err(e)
        }
    }
}

async fn stage_match<U: StorageTransaction>(
    unit: &mut U,
    payment_prefix: &str,
    transaction: &BankTransaction,
    invoice: &Invoice,
) -> ReconcileResult<Payment> {
    let invoice = unit
        .invoice_for_update(&invoice.id)
        .await?
        .ok_or_else(|| ReconcileError::InvoiceNotFound(invoice.id.clone()))?;

    if !invoice.status.is_awaiting_payment() {
        return Err(ReconcileError::AlreadyPaid(invoice.id));
    }

    let transaction = unit
        .transaction_for_update(&transaction.id)
        .await?
        .ok_or_else(|| ReconcileError::TransactionNotFound(transaction.id.clone()))?;

    if transaction.is_matched() {
        return Err(ReconcileError::AlreadyMatched(transaction.id));
    }

    if !transaction.is_incoming() {
        return Err(ReconcileError::Validation(format!(
            "Transaction {} is not an incoming payment",
            transaction.id
        )));
    }

    if transaction.company_id != invoice.company_id {
        return Err(ReconcileError::Validation(format!(
            "Transaction {} and invoice {} belong to different companies",
            transaction.id, invoice.id
        )));
    }

    let month_prefix = payment_number_prefix(payment_prefix, transaction.transaction_date);
    let last = unit
        .last_payment_number(&invoice.company_id, &month_prefix)
        .await?;
    let payment_number = next_payment_number(&month_prefix, last.as_deref());

    let now = Utc::now().naive_utc();
    let source_reference = transaction
        .external_reference
        .clone()
        .unwrap_or_else(|| transaction.id.clone());

    let payment = Payment {
        id: uuid::Uuid::new_v4().to_string(),
        company_id: invoice.company_id.clone(),
        invoice_id: invoice.id.clone(),
        customer_id: invoice.customer_id().map(str::to_string),
        amount: transaction.amount.clone(),
        currency: invoice.currency.clone(),
        payment_date: transaction.transaction_date,
        payment_number,
        payment_method: PaymentMethod::BankTransfer,
        notes: format!("Auto-matched from bank transaction: {}", source_reference),
        reference: transaction.external_reference.clone(),
        created_at: now,
    };

    unit.insert_payment(&payment).await?;
    unit.mark_invoice_paid(&invoice.id, payment.payment_date).await?;
    unit.mark_transaction_matched(&transaction.id, &invoice.id, &payment.id, now)
        .await?;

    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_number_sequence() {
        let prefix = payment_number_prefix("PAY-", NaiveDate::from_ymd_opt(2025, 1, 20).unwrap());
        assert_eq!(prefix, "PAY-202501-");

        let first = next_payment_number(&prefix, None);
        assert_eq!(first, "PAY-202501-0001");
        assert_eq!(
            next_payment_number(&prefix, Some(&first)),
            "PAY-202501-0002"
        );
    }

    #[test]
    fn test_payment_number_grows_past_padding() {
        assert_eq!(
            next_payment_number("PAY-202501-", Some("PAY-202501-9999")),
            "PAY-202501-10000"
        );
    }

    #[test]
    fn test_unparseable_last_number_restarts() {
        assert_eq!(
            next_payment_number("PAY-202501-", Some("PAY-202501-manual")),
            "PAY-202501-0001"
        );
        assert_eq!(payment_sequence("PAY-202501-0042"), Some(42));
    }
}
