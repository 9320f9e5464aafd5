// ABOUTME: Object storage contract used to prepare backup buckets.

use async_trait::async_trait;

use super::ProviderError;
use crate::model::{BackupIntegration, IntegrationSecret};

#[async_trait]
pub trait BackupStorage: Send + Sync {
    async fn bucket_exists(
        &self,
        target: &BackupIntegration,
        creds: &IntegrationSecret,
    ) -> Result<bool, ProviderError>;

    async fn create_bucket(
        &self,
        target: &BackupIntegration,
        creds: &IntegrationSecret,
    ) -> Result<(), ProviderError>;
}
