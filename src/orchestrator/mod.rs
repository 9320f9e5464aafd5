// ABOUTME: Long-running workflows: server provisioning, deployment, teardown.
// ABOUTME: At most one cancellable unit runs per entity, tracked in a TaskRegistry.

mod backup;
mod cancel;
mod context;
mod deploy;
mod dns;
mod error;
mod outcome;
mod progress;
mod registry;
mod server;
mod teardown;

pub use backup::backup_env;
pub use context::{AppContext, AppContextBuilder};
pub use deploy::{DeployRequest, DeploymentOrchestrator, DomainTarget};
pub use error::{ErrorKind, OrchestrationError};
pub use outcome::{Failure, WorkflowOutcome};
pub use progress::{ProgressSink, ProvisionProgress};
pub use registry::{TaskRegistry, TaskTicket};
pub use server::{NewCustomServer, NewServer, ServerLifecycle, StartDecision, TunnelOptions};
pub use teardown::{
    PhaseOutcome, PhaseRecord, ProjectTeardownMode, TeardownFailure, TeardownFailureKind,
    TeardownOrchestrator, TeardownPhase, TeardownReport,
};
