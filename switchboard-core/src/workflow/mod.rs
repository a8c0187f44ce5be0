//! Declared multi-step workflows
//!
//! A workflow is an ordered list of steps, each calling one provider tool.
//! Steps may be gated by a [`StepCondition`], marked optional, and consume
//! the outputs or created resources of earlier steps.

mod definition;
mod engine;
mod report;

pub use definition::{
    LEGACY_OPTIONAL_STEPS, StepCondition, WorkflowDefinition, WorkflowStep, WorkflowSummary,
};
pub use engine::{CONTEXT_FIELD, RESOURCE_ID_FIELD, WorkflowEngine};
pub use report::{StepOutcome, WorkflowReport};
