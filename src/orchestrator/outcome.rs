// ABOUTME: Terminal results of a workflow unit.
// ABOUTME: Callers match exhaustively instead of polling side-channel fields.

use super::error::{ErrorKind, OrchestrationError};
use crate::model::RepositoryRename;

/// Why a workflow failed, as persisted and shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&OrchestrationError> for Failure {
    fn from(err: &OrchestrationError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed,
    Failed(Failure),
    /// Waiting for the operator to confirm a repository rename.
    PausedForConflict(RepositoryRename),
    /// Stopped on request. The entity is persisted as failed.
    Cancelled,
}

impl WorkflowOutcome {
    pub(crate) fn from_error(err: &OrchestrationError) -> Self {
        if err.is_cancelled() {
            WorkflowOutcome::Cancelled
        } else {
            WorkflowOutcome::Failed(Failure::from(err))
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, WorkflowOutcome::Completed)
    }
}
