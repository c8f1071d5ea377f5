//! Automatic matching sweep example

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use reconciliation_core::{
    BankTransaction, ConditionField, ConditionOperator, Customer, Invoice, Matcher,
    MatchingRule, MemoryStorage, RuleAction, RuleCondition,
};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🏦 Reconciliation Core - Automatic Matching Example\n");

    let storage = MemoryStorage::new();
    let company = "company-1".to_string();
    let today = Utc::now().date_naive();

    // 1. Open invoices
    println!("🧾 Seeding invoices...");
    let invoices = [
        ("inv-1", "INV-2025-001", "1500.00", "Acme Trading", Some("MK07 2500 0000 1234")),
        ("inv-2", "INV-2025-002", "1000.00", "Globex", None),
        ("inv-3", "INV-2025-003", "320.00", "Initech", None),
    ];
    for (id, number, total, customer, account) in invoices {
        let mut customer = Customer::new(format!("cust-{}", id), customer.to_string());
        if let Some(account) = account {
            customer = customer.with_bank_account(account.to_string());
        }
        let invoice = Invoice::new(
            id.to_string(),
            company.clone(),
            number.to_string(),
            BigDecimal::from_str(total)?,
            today - Duration::days(15),
            Some(today - Duration::days(1)),
        )
        .with_customer(customer);
        println!("  ✓ {} for {}", invoice.invoice_number, invoice.total);
        storage.add_invoice(invoice)?;
    }
    println!();

    // 2. Bank statement lines
    println!("💳 Importing bank transactions...");
    let lines = [
        ("txn-1", "1500.00", 1, "Payment for INV-2025-001", "ACME TRADING"),
        ("txn-2", "999.50", 2, "Globex invoice 2025-002", "Globex"),
        ("txn-3", "320.00", 6, "wire transfer", "Unknown sender"),
        ("txn-4", "4.90", 0, "Account maintenance fee", "Bank"),
    ];
    for (id, amount, days_ago, description, debtor) in lines {
        let mut txn = BankTransaction::new(
            id.to_string(),
            company.clone(),
            BigDecimal::from_str(amount)?,
            today - Duration::days(days_ago),
        );
        txn.description = Some(description.to_string());
        txn.debtor_name = Some(debtor.to_string());
        println!("  ✓ {} {} \"{}\"", txn.id, txn.amount, description);
        storage.add_transaction(txn)?;
    }
    println!();

    // 3. Skip bank fees
    storage.add_rule(
        MatchingRule::new(
            "rule-fees".to_string(),
            company.clone(),
            "Ignore bank fees".to_string(),
            100,
        )
        .condition(RuleCondition::new(
            ConditionField::Description,
            ConditionOperator::Contains,
            "fee",
        ))
        .action(RuleAction::Ignore),
    )?;

    // 4. Sweep
    println!("🔍 Running matching sweep...");
    let matcher = Matcher::new(storage.clone(), company);
    for result in matcher.run_sweep().await? {
        println!(
            "  ✓ {} -> {} ({}%)",
            result.transaction_id, result.invoice_number, result.confidence
        );
    }
    println!();

    // 5. Anything left for manual review
    println!("📝 Suggestions for manual review:");
    for id in ["txn-3"] {
        if let Some(txn) = storage.get_transaction(id)? {
            match matcher.suggest(&txn).await? {
                Some(suggestion) => println!(
                    "  • {} looks like {} ({}%)",
                    id, suggestion.invoice_number, suggestion.confidence
                ),
                None => println!("  • {} has no candidate", id),
            }
        }
    }
    println!();

    for payment in storage.payments()? {
        println!(
            "💰 {} {} for invoice {}",
            payment.payment_number, payment.amount, payment.invoice_id
        );
    }

    let stats = matcher.get_stats().await?;
    println!(
        "\n📊 Matched {}/{} transactions ({}%)",
        stats.matched_transactions, stats.total_transactions, stats.match_rate_percent
    );

    Ok(())
}
