// ABOUTME: SSH access to provisioned servers.
// ABOUTME: Remote command execution with russh plus a TCP reachability check.

mod client;
mod error;
mod reachability;
mod shell;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Error, Result};
pub use reachability::{PortCheck, TcpPortCheck};
pub use shell::{RemoteShell, SshShell};
