//! Validation utilities

use crate::config::MatcherConfig;
use crate::reconciliation::rules::*;
use crate::types::*;

/// Longest regex pattern a matching rule may carry
pub const MAX_REGEX_LENGTH: usize = 500;

/// Longest matching rule name
pub const MAX_RULE_NAME_LENGTH: usize = 255;

/// Reject regex patterns that are too long or stack wildcards
pub fn check_regex_pattern(pattern: &str) -> ReconcileResult<()> {
    if pattern.len() > MAX_REGEX_LENGTH {
        return Err(ReconcileError::InvalidRule(format!(
            "Regex pattern cannot exceed {} characters",
            MAX_REGEX_LENGTH
        )));
    }

    if pattern.contains(".*.*.*") || pattern.contains(".+.+.+") {
        return Err(ReconcileError::InvalidRule(
            "Regex pattern contains repeated wildcards".to_string(),
        ));
    }

    Ok(())
}

/// Validate a single rule condition
pub fn validate_condition(condition: &RuleCondition) -> ReconcileResult<()> {
    if condition.value.trim().is_empty() {
        return Err(ReconcileError::InvalidRule(
            "Condition value cannot be empty".to_string(),
        ));
    }

    let numeric = condition.field.is_numeric() || condition.operator.is_numeric();
    if numeric && condition.value.trim().parse::<f64>().is_err() {
        return Err(ReconcileError::InvalidRule(format!(
            "Condition value '{}' must be a number",
            condition.value
        )));
    }

    if condition.operator == ConditionOperator::Regex {
        if condition.field.is_numeric() {
            return Err(ReconcileError::InvalidRule(
                "Regex conditions apply to text fields only".to_string(),
            ));
        }
        check_regex_pattern(&condition.value)?;
        regex::Regex::new(&condition.value).map_err(|e| {
            ReconcileError::InvalidRule(format!("Invalid regex pattern: {}", e))
        })?;
    }

    Ok(())
}

/// Validate a single rule action
pub fn validate_action(action: &RuleAction) -> ReconcileResult<()> {
    match action {
        RuleAction::MatchCustomer { customer_id } if customer_id.trim().is_empty() => Err(
            ReconcileError::InvalidRule("Customer ID cannot be empty".to_string()),
        ),
        RuleAction::AutoMatch {
            confidence_threshold,
        } if !(0.0..=100.0).contains(confidence_threshold) => {
            Err(ReconcileError::InvalidRule(format!(
                "Auto-match threshold must be between 0 and 100, got {}",
                confidence_threshold
            )))
        }
        RuleAction::Categorize { category } if category.trim().is_empty() => Err(
            ReconcileError::InvalidRule("Category cannot be empty".to_string()),
        ),
        _ => Ok(()),
    }
}

/// Validate a matching rule before it is stored
pub fn validate_rule(rule: &MatchingRule) -> ReconcileResult<()> {
    if rule.name.trim().is_empty() {
        return Err(ReconcileError::InvalidRule(
            "Rule name cannot be empty".to_string(),
        ));
    }

    if rule.name.len() > MAX_RULE_NAME_LENGTH {
        return Err(ReconcileError::InvalidRule(format!(
            "Rule name cannot exceed {} characters",
            MAX_RULE_NAME_LENGTH
        )));
    }

    if rule.conditions.is_empty() {
        return Err(ReconcileError::InvalidRule(
            "Rule must have at least one condition".to_string(),
        ));
    }

    if rule.actions.is_empty() {
        return Err(ReconcileError::InvalidRule(
            "Rule must have at least one action".to_string(),
        ));
    }

    for condition in &rule.conditions {
        validate_condition(condition)?;
    }

    for action in &rule.actions {
        validate_action(action)?;
    }

    Ok(())
}

/// Validate matcher configuration ranges
pub fn validate_config(config: &MatcherConfig) -> ReconcileResult<()> {
    if config.matching_window_days == 0 {
        return Err(ReconcileError::Config(
            "Matching window must be at least one day".to_string(),
        ));
    }

    if !(0.0..1.0).contains(&config.amount_tolerance) {
        return Err(ReconcileError::Config(format!(
            "Amount tolerance must be in [0, 1), got {}",
            config.amount_tolerance
        )));
    }

    if !(config.min_confidence > 0.0 && config.min_confidence <= 1.0) {
        return Err(ReconcileError::Config(format!(
            "Minimum confidence must be in (0, 1], got {}",
            config.min_confidence
        )));
    }

    if config.payment_prefix.trim().is_empty() {
        return Err(ReconcileError::Config(
            "Payment prefix cannot be empty".to_string(),
        ));
    }

    Ok(())
}
