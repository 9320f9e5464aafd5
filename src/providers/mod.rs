// ABOUTME: Contracts for remote provider clients: cloud, DNS, tunnel, secrets, storage.
// ABOUTME: Implementations live in the host; orchestrators only see these traits.

mod backup;
mod cloud;
mod credentials;
mod dns;
mod error;
mod secrets;
mod tunnel;

pub use backup::BackupStorage;
pub use cloud::{
    ActiveServer, CloudProvider, CreateServerRequest, ProviderServer, ProviderServerStatus,
    WaitProgress,
};
pub use credentials::{CredentialStore, KeyGenerator};
pub use dns::{DnsProvider, DnsRecord, NewDnsRecord, RecordType};
pub use error::{ProviderError, ProviderErrorKind};
pub use secrets::{EnvSection, SecretsError, SecretsProvider, SecretsRequest};
pub use tunnel::{IngressRule, RemoteTunnel, TunnelConfiguration, TunnelProvider};
