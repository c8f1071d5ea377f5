//! Bank transaction to invoice reconciliation
//!
//! Scoring, matching rules and the commit step are kept separate from the
//! [`Matcher`] that drives them.

pub mod commit;
pub mod engine;
pub mod rules;
pub mod scorer;
pub mod similarity;

pub use engine::Matcher;
pub use rules::{
    ConditionField, ConditionOperator, MatchingRule, RuleAction, RuleCondition, RuleEngine,
    RuleOutcome,
};
pub use scorer::{score, ConfidenceScorer, ScoreBreakdown, ScoreWeights};
