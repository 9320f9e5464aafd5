// ABOUTME: Provisioning progress events delivered to an optional host callback.

use std::sync::Arc;
use std::time::Duration;

use crate::model::ProvisionStep;
use crate::types::ServerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionProgress {
    WaitingForProvider { elapsed: Duration },
    WaitingForSsh { attempt: u32, of: u32 },
    VerifyingTunnel { attempt: u32, of: u32 },
    StepCompleted(ProvisionStep),
}

pub type ProgressSink = Arc<dyn Fn(&ServerId, ProvisionProgress) + Send + Sync>;
