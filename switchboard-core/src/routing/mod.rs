//! Task routing
//!
//! - [`RoutingRule`]: declarative condition and action
//! - [`RuleMatcher`]: picks the first matching rule in declaration order
//! - [`SequenceExecutor`]: runs multi-call sequence actions

mod matcher;
mod rule;
mod sequence;

pub use matcher::RuleMatcher;
pub use rule::{FallbackCall, RoutingRule, RuleAction, RuleCondition, SequenceStep, SingleCall};
pub use sequence::{PREVIOUS_RESULT_FIELD, SEQUENCE_PROVIDER, SequenceExecutor, sequence_label};
