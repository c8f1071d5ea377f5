//! User-defined matching rules
//!
//! A rule is a set of conditions (all must hold) and a list of actions. Rules
//! are evaluated before a transaction is scored. They can skip the transaction,
//! narrow the invoice pool to one customer or demand a higher confidence.

use bigdecimal::ToPrimitive;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::*;
use crate::utils::validation::check_regex_pattern;

/// Threshold used by auto-match rules that do not set one, in percent
pub const DEFAULT_AUTO_MATCH_THRESHOLD: f64 = 50.0;

/// Currency assumed when the bank did not report one
pub const DEFAULT_CURRENCY: &str = "MKD";

/// Transaction field a condition inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    Description,
    RemittanceInfo,
    DebtorName,
    CreditorName,
    /// Absolute amount
    Amount,
    /// `credit` for incoming money, `debit` otherwise
    TransactionType,
    Currency,
}

impl ConditionField {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ConditionField::Amount)
    }
}

/// Comparison applied by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Contains,
    Equals,
    GreaterThan,
    LessThan,
    StartsWith,
    EndsWith,
    Regex,
}

impl ConditionOperator {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ConditionOperator::GreaterThan | ConditionOperator::LessThan
        )
    }
}

/// A single predicate over a transaction field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: String,
}

impl RuleCondition {
    pub fn new(field: ConditionField, operator: ConditionOperator, value: &str) -> Self {
        Self {
            field,
            operator,
            value: value.to_string(),
        }
    }
}

/// What to do with a transaction a rule matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RuleAction {
    Categorize {
        category: String,
    },
    /// Prefer this customer's invoices
    MatchCustomer {
        customer_id: String,
    },
    MatchExpense {
        expense_category: String,
    },
    /// Require at least this confidence (percent); never below the matcher floor
    AutoMatch {
        #[serde(default = "default_auto_match_threshold")]
        confidence_threshold: f64,
    },
    /// Never match the transaction automatically
    Ignore,
}

fn default_auto_match_threshold() -> f64 {
    DEFAULT_AUTO_MATCH_THRESHOLD
}

/// A stored matching rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingRule {
    pub id: String,
    pub company_id: String,
    pub name: String,
    /// Higher priorities are evaluated first
    pub priority: i32,
    pub is_active: bool,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
}

impl MatchingRule {
    /// Create an active rule with no conditions or actions
    pub fn new(id: String, company_id: String, name: String, priority: i32) -> Self {
        Self {
            id,
            company_id,
            name,
            priority,
            is_active: true,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// A rule that matched a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: String,
    pub rule_name: String,
    pub priority: i32,
    pub actions: Vec<RuleAction>,
}

/// All rules that matched one transaction, highest priority first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub matches: Vec<RuleMatch>,
}

impl RuleOutcome {
    fn actions(&self) -> impl Iterator<Item = &RuleAction> {
        self.matches.iter().flat_map(|m| m.actions.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Whether any matched rule asks to skip the transaction
    pub fn is_ignored(&self) -> bool {
        self.actions().any(|a| matches!(a, RuleAction::Ignore))
    }

    /// Customer from the highest-priority `MatchCustomer` action
    pub fn customer_id(&self) -> Option<&str> {
        self.actions().find_map(|a| match a {
            RuleAction::MatchCustomer { customer_id } if !customer_id.is_empty() => {
                Some(customer_id.as_str())
            }
            _ => None,
        })
    }

    /// Threshold (percent) from the highest-priority `AutoMatch` action
    pub fn auto_match_threshold(&self) -> Option<f64> {
        self.actions().find_map(|a| match a {
            RuleAction::AutoMatch {
                confidence_threshold,
            } => Some(*confidence_threshold),
            _ => None,
        })
    }
}

struct CompiledCondition {
    condition: RuleCondition,
    regex: Option<Regex>,
}

struct CompiledRule {
    rule: MatchingRule,
    conditions: Vec<CompiledCondition>,
}

/// Evaluates a company's active rules against transactions
///
/// Regex conditions are compiled once when the engine is built.
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    /// Build an engine from stored rules, keeping only active ones
    pub fn new(mut rules: Vec<MatchingRule>) -> Self {
        rules.retain(|rule| rule.is_active);
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let rules = rules
            .into_iter()
            .map(|rule| {
                let conditions = rule
                    .conditions
                    .iter()
                    .map(|condition| CompiledCondition {
                        regex: match condition.operator {
                            ConditionOperator::Regex => compile_pattern(&rule.id, &condition.value),
                            _ => None,
                        },
                        condition: condition.clone(),
                    })
                    .collect();
                CompiledRule { rule, conditions }
            })
            .collect();

        Self { rules }
    }

    /// Engine with no rules; every transaction evaluates to an empty outcome
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Collect every rule whose conditions all hold for the transaction
    pub fn evaluate(&self, transaction: &BankTransaction) -> RuleOutcome {
        let matches = self
            .rules
            .iter()
            .filter(|compiled| compiled.matches(transaction))
            .map(|compiled| {
                debug!(
                    rule_id = %compiled.rule.id,
                    rule_name = %compiled.rule.name,
                    transaction_id = %transaction.id,
                    "Matching rule matched transaction"
                );
                RuleMatch {
                    rule_id: compiled.rule.id.clone(),
                    rule_name: compiled.rule.name.clone(),
                    priority: compiled.rule.priority,
                    actions: compiled.rule.actions.clone(),
                }
            })
            .collect();

        RuleOutcome { matches }
    }
}

impl CompiledRule {
    fn matches(&self, transaction: &BankTransaction) -> bool {
        // A rule without conditions would match everything
        !self.conditions.is_empty()
            && self
                .conditions
                .iter()
                .all(|compiled| compiled.matches(transaction))
    }
}

impl CompiledCondition {
    fn matches(&self, transaction: &BankTransaction) -> bool {
        let condition = &self.condition;

        if condition.field.is_numeric() {
            return compare_amount(transaction, condition);
        }

        let actual = text_value(condition.field, transaction).to_lowercase();
        let expected = condition.value.to_lowercase();

        match condition.operator {
            ConditionOperator::Contains => actual.contains(&expected),
            ConditionOperator::Equals => actual == expected,
            ConditionOperator::StartsWith => actual.starts_with(&expected),
            ConditionOperator::EndsWith => actual.ends_with(&expected),
            ConditionOperator::Regex => self
                .regex
                .as_ref()
                .is_some_and(|regex| regex.is_match(text_value(condition.field, transaction))),
            ConditionOperator::GreaterThan | ConditionOperator::LessThan => {
                match (parse_number(&actual), parse_number(&expected)) {
                    (Some(a), Some(e)) => {
                        if condition.operator == ConditionOperator::GreaterThan {
                            a > e
                        } else {
                            a < e
                        }
                    }
                    _ => false,
                }
            }
        }
    }
}

fn text_value(field: ConditionField, transaction: &BankTransaction) -> &str {
    match field {
        ConditionField::Description => transaction.description.as_deref().unwrap_or_default(),
        ConditionField::RemittanceInfo => {
            transaction.remittance_info.as_deref().unwrap_or_default()
        }
        ConditionField::DebtorName => transaction.debtor_name.as_deref().unwrap_or_default(),
        ConditionField::CreditorName => transaction.creditor_name.as_deref().unwrap_or_default(),
        ConditionField::TransactionType => {
            if transaction.is_incoming() {
                "credit"
            } else {
                "debit"
            }
        }
        ConditionField::Currency => transaction.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
        // Numeric fields are handled by compare_amount
        ConditionField::Amount => "",
    }
}

fn compare_amount(transaction: &BankTransaction, condition: &RuleCondition) -> bool {
    let Some(actual) = transaction.amount.abs().to_f64() else {
        return false;
    };

    let Some(expected) = parse_number(&condition.value) else {
        warn!(
            value = %condition.value,
            "Matching rule amount condition is not a number"
        );
        return false;
    };

    match condition.operator {
        ConditionOperator::Equals => (actual - expected).abs() < 0.01,
        ConditionOperator::GreaterThan => actual > expected,
        ConditionOperator::LessThan => actual < expected,
        ConditionOperator::Contains => actual.to_string().contains(condition.value.trim()),
        ConditionOperator::StartsWith => actual.to_string().starts_with(condition.value.trim()),
        ConditionOperator::EndsWith => actual.to_string().ends_with(condition.value.trim()),
        ConditionOperator::Regex => false,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

fn compile_pattern(rule_id: &str, pattern: &str) -> Option<Regex> {
    if let Err(e) = check_regex_pattern(pattern) {
        warn!(rule_id = %rule_id, error = %e, "Skipping unsafe matching rule regex");
        return None;
    }

    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(rule_id = %rule_id, error = %e, "Matching rule regex pattern invalid");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn transaction(amount: i64, description: &str) -> BankTransaction {
        let mut txn = BankTransaction::new(
            "t1".to_string(),
            "c1".to_string(),
            BigDecimal::from(amount),
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
        );
        txn.description = Some(description.to_string());
        txn
    }

    fn rule(id: &str, priority: i32) -> MatchingRule {
        MatchingRule::new(id.to_string(), "c1".to_string(), format!("rule {}", id), priority)
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let engine = RuleEngine::new(vec![rule("r1", 1)
            .condition(RuleCondition::new(
                ConditionField::Description,
                ConditionOperator::Contains,
                "BANK FEE",
            ))
            .condition(RuleCondition::new(
                ConditionField::Amount,
                ConditionOperator::LessThan,
                "50",
            ))
            .action(RuleAction::Ignore)]);

        assert!(engine.evaluate(&transaction(20, "Monthly bank fee")).is_ignored());
        assert!(!engine.evaluate(&transaction(80, "Monthly bank fee")).is_ignored());
        assert!(!engine.evaluate(&transaction(20, "Invoice 12")).is_ignored());
    }

    #[test]
    fn test_rule_without_conditions_never_matches() {
        let engine = RuleEngine::new(vec![rule("r1", 1).action(RuleAction::Ignore)]);
        assert!(engine.evaluate(&transaction(20, "anything")).is_empty());
    }

    #[test]
    fn test_inactive_rules_skipped() {
        let mut inactive = rule("r1", 1)
            .condition(RuleCondition::new(
                ConditionField::Description,
                ConditionOperator::Contains,
                "fee",
            ))
            .action(RuleAction::Ignore);
        inactive.is_active = false;

        let engine = RuleEngine::new(vec![inactive]);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_priority_order_decides_customer() {
        let contains_acme = RuleCondition::new(
            ConditionField::Description,
            ConditionOperator::Contains,
            "acme",
        );
        let engine = RuleEngine::new(vec![
            rule("low", 1)
                .condition(contains_acme.clone())
                .action(RuleAction::MatchCustomer {
                    customer_id: "cust-low".to_string(),
                }),
            rule("high", 10)
                .condition(contains_acme)
                .action(RuleAction::MatchCustomer {
                    customer_id: "cust-high".to_string(),
                }),
        ]);

        let outcome = engine.evaluate(&transaction(100, "ACME payment"));
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.customer_id(), Some("cust-high"));
    }

    #[test]
    fn test_regex_condition_case_insensitive() {
        let engine = RuleEngine::new(vec![rule("r1", 1)
            .condition(RuleCondition::new(
                ConditionField::Description,
                ConditionOperator::Regex,
                r"^inv-\d{4}",
            ))
            .action(RuleAction::AutoMatch {
                confidence_threshold: 60.0,
            })]);

        let outcome = engine.evaluate(&transaction(100, "INV-2025 transfer"));
        assert_eq!(outcome.auto_match_threshold(), Some(60.0));
        assert!(engine.evaluate(&transaction(100, "transfer")).is_empty());
    }

    #[test]
    fn test_unsafe_regex_never_matches() {
        let engine = RuleEngine::new(vec![rule("r1", 1)
            .condition(RuleCondition::new(
                ConditionField::Description,
                ConditionOperator::Regex,
                "a.*.*.*b",
            ))
            .action(RuleAction::Ignore)]);
        assert!(engine.evaluate(&transaction(100, "a to b")).is_empty());
    }

    #[test]
    fn test_transaction_type_and_currency_fields() {
        let engine = RuleEngine::new(vec![rule("r1", 1)
            .condition(RuleCondition::new(
                ConditionField::TransactionType,
                ConditionOperator::Equals,
                "credit",
            ))
            .condition(RuleCondition::new(
                ConditionField::Currency,
                ConditionOperator::Equals,
                "mkd",
            ))
            .action(RuleAction::Ignore)]);

        assert!(engine.evaluate(&transaction(100, "x")).is_ignored());
        assert!(!engine.evaluate(&transaction(-100, "x")).is_ignored());
    }

    #[test]
    fn test_amount_equals_within_a_cent() {
        let engine = RuleEngine::new(vec![rule("r1", 1)
            .condition(RuleCondition::new(
                ConditionField::Amount,
                ConditionOperator::Equals,
                "100.001",
            ))
            .action(RuleAction::Ignore)]);
        assert!(engine.evaluate(&transaction(-100, "x")).is_ignored());
    }

    #[test]
    fn test_action_serialization() {
        let json = r#"[{"action":"auto_match"},{"action":"match_customer","customer_id":"7"}]"#;
        let actions: Vec<RuleAction> = serde_json::from_str(json).unwrap();
        assert_eq!(
            actions[0],
            RuleAction::AutoMatch {
                confidence_threshold: DEFAULT_AUTO_MATCH_THRESHOLD
            }
        );
        assert_eq!(
            actions[1],
            RuleAction::MatchCustomer {
                customer_id: "7".to_string()
            }
        );
    }
}
