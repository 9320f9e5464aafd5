// ABOUTME: Deletion of tracked DNS records shared by redeploys and teardown.
// ABOUTME: Only ids this system created are touched; NS and SOA never are.

use tracing::{debug, warn};

use crate::model::{DnsZone, IntegrationSecret};
use crate::providers::{DnsProvider, ProviderError, RecordType};
use crate::types::DnsRecordId;

#[derive(Debug)]
pub(crate) enum RecordDeletion {
    Deleted,
    AlreadyAbsent,
    Protected(RecordType),
    Failed(ProviderError),
}

impl RecordDeletion {
    /// True when the id no longer needs tracking.
    pub(crate) fn is_settled(&self) -> bool {
        !matches!(self, RecordDeletion::Failed(_))
    }
}

/// Delete each tracked record that still exists in `zone`.
///
/// Fails only when the zone cannot be listed; per-record failures are
/// reported in the result.
pub(crate) async fn delete_tracked_records(
    dns: &dyn DnsProvider,
    zone: &DnsZone,
    tracked: &[DnsRecordId],
    creds: &IntegrationSecret,
) -> Result<Vec<(DnsRecordId, RecordDeletion)>, ProviderError> {
    if tracked.is_empty() {
        return Ok(Vec::new());
    }

    let existing = dns.list_records(zone, None, None, creds).await?;
    let mut results = Vec::with_capacity(tracked.len());

    for id in tracked {
        let deletion = match existing.iter().find(|record| &record.id == id) {
            None => RecordDeletion::AlreadyAbsent,
            Some(record) if record.record_type.is_protected() => {
                warn!(record_id = %id, record_type = %record.record_type, "refusing to delete protected record");
                RecordDeletion::Protected(record.record_type)
            }
            Some(record) => match dns.delete_record(record, zone, creds).await {
                Ok(()) => {
                    debug!(record_id = %id, name = %record.name, "DNS record deleted");
                    RecordDeletion::Deleted
                }
                Err(e) if e.is_not_found() => RecordDeletion::AlreadyAbsent,
                Err(e) => RecordDeletion::Failed(e),
            },
        };
        results.push((id.clone(), deletion));
    }

    Ok(results)
}
