// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod architecture;
mod hostname;
mod id;

pub use architecture::{ARCHITECTURE_COMMAND, Architecture, UnsupportedArchitecture};
pub use hostname::{Hostname, HostnameError};
pub use id::{
    DnsRecordId, DnsRecordMarker, Id, IntegrationId, IntegrationMarker, ProjectId, ProjectMarker,
    ServerId, ServerMarker, SshKeyId, SshKeyMarker, TunnelId, TunnelMarker,
};
