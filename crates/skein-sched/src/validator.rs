//! Job-spec validation ahead of admission.

use skein_types::JobSpec;

use crate::error::{CoreError, CoreResult};

/// Pure check applied to a resolved job spec before anything persists.
pub trait JobValidator: Send + Sync {
    /// Accept or reject a spec. Rejection surfaces as
    /// [`CoreError::Validation`] and nothing is persisted.
    fn validate(&self, spec: &JobSpec) -> CoreResult<()>;
}

/// Structural validation: a named job, at least one worker, and a
/// pipeline of a reader plus at least one processor.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create the validator.
    pub fn new() -> Self {
        Self
    }
}

impl JobValidator for BasicValidator {
    fn validate(&self, spec: &JobSpec) -> CoreResult<()> {
        if spec.name.trim().is_empty() {
            return Err(CoreError::Validation("job name must not be empty".into()));
        }
        if spec.workers == 0 {
            return Err(CoreError::Validation(
                "workers must be at least 1".into(),
            ));
        }
        if spec.operations.len() < 2 {
            return Err(CoreError::Validation(
                "pipeline needs a reader and at least one processor".into(),
            ));
        }
        if spec.operations.iter().any(|op| op.op.trim().is_empty()) {
            return Err(CoreError::Validation(
                "every operation needs a registered name".into(),
            ));
        }
        Ok(())
    }
}
