// ABOUTME: DNS provider contract and record types.
// ABOUTME: NS and SOA records are protected and never deleted by this system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ProviderError;
use crate::model::{DnsZone, IntegrationSecret};
use crate::types::DnsRecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
    Mx,
    Ns,
    Soa,
}

impl RecordType {
    /// Zone-structural records that must survive any cleanup.
    pub fn is_protected(&self) -> bool {
        matches!(self, RecordType::Ns | RecordType::Soa)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Soa => "SOA",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub id: DnsRecordId,
    pub record_type: RecordType,
    /// Fully qualified record name.
    pub name: String,
    pub content: String,
    pub proxied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDnsRecord {
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub proxied: bool,
}

#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn list_records(
        &self,
        zone: &DnsZone,
        record_type: Option<RecordType>,
        name: Option<&str>,
        creds: &IntegrationSecret,
    ) -> Result<Vec<DnsRecord>, ProviderError>;

    async fn create_record(
        &self,
        zone: &DnsZone,
        record: &NewDnsRecord,
        creds: &IntegrationSecret,
    ) -> Result<DnsRecord, ProviderError>;

    async fn delete_record(
        &self,
        record: &DnsRecord,
        zone: &DnsZone,
        creds: &IntegrationSecret,
    ) -> Result<(), ProviderError>;
}
