// ABOUTME: Orchestration error type with SNAFU context per failing step.
// ABOUTME: ErrorKind classifies failures from typed sources, never from message text.

use snafu::Snafu;

use super::teardown::TeardownPhase;
use crate::providers::{ProviderError, ProviderErrorKind};
use crate::runner::RunnerError;
use crate::store::StoreError;
use crate::types::UnsupportedArchitecture;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OrchestrationError {
    #[snafu(display("{step}: {source}"))]
    Provider {
        step: &'static str,
        source: ProviderError,
    },

    #[snafu(display("{step}: {source}"))]
    Runner {
        step: &'static str,
        source: RunnerError,
    },

    #[snafu(display("{step}: {source}"))]
    Shell {
        step: &'static str,
        source: crate::ssh::Error,
    },

    #[snafu(display("SSH port {host}:{port} not reachable after {attempts} attempts"))]
    SshUnreachable {
        host: String,
        port: u16,
        attempts: u32,
    },

    #[snafu(display("tunnel not reachable after {attempts} attempts: {source}"))]
    TunnelUnverified { attempts: u32, source: RunnerError },

    #[snafu(context(false), display("{source}"))]
    Architecture { source: UnsupportedArchitecture },

    #[snafu(display("teardown stopped at {phase}: {source}"))]
    TeardownAborted {
        phase: TeardownPhase,
        source: ProviderError,
    },

    #[snafu(display("{message}"))]
    Precondition { message: String },

    #[snafu(display("{entity} {id} not found"))]
    NotFound { entity: &'static str, id: String },

    #[snafu(display("a workflow is already running for {id}"))]
    AlreadyRunning { id: String },

    #[snafu(context(false), display("entity store: {source}"))]
    Store { source: StoreError },

    #[snafu(display("cancelled"))]
    Cancelled,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Authorization,
    /// Failure reported by a provider or a remote procedure; not retried automatically.
    Provider,
    Timeout,
    UnsupportedArchitecture,
    Precondition,
    /// Another workflow owns the entity.
    Busy,
    Store,
    Cancelled,
}

impl OrchestrationError {
    pub fn precondition(message: impl Into<String>) -> Self {
        OrchestrationError::Precondition {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::Provider { source, .. }
            | OrchestrationError::TeardownAborted { source, .. } => match source.kind() {
                ProviderErrorKind::Network => ErrorKind::Network,
                ProviderErrorKind::Authorization => ErrorKind::Authorization,
                ProviderErrorKind::NotFound | ProviderErrorKind::Provider => ErrorKind::Provider,
            },
            OrchestrationError::Runner { source, .. } => match source {
                RunnerError::Connection { .. } => ErrorKind::Network,
                RunnerError::Failed { .. } => ErrorKind::Provider,
            },
            OrchestrationError::Shell { source, .. } => match source {
                crate::ssh::Error::AuthenticationFailed { .. }
                | crate::ssh::Error::NoCredentials
                | crate::ssh::Error::KeyDecode(_) => ErrorKind::Authorization,
                _ => ErrorKind::Network,
            },
            OrchestrationError::SshUnreachable { .. }
            | OrchestrationError::TunnelUnverified { .. } => ErrorKind::Timeout,
            OrchestrationError::Architecture { .. } => ErrorKind::UnsupportedArchitecture,
            OrchestrationError::Precondition { .. } | OrchestrationError::NotFound { .. } => {
                ErrorKind::Precondition
            }
            OrchestrationError::AlreadyRunning { .. } => ErrorKind::Busy,
            OrchestrationError::Store { .. } => ErrorKind::Store,
            OrchestrationError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestrationError::Cancelled)
    }
}
