// ABOUTME: Backup target preparation and the env variables backups run with.
// ABOUTME: Buckets are checked before creation so re-runs are harmless.

use std::collections::BTreeMap;

use crate::model::{BackupIntegration, BackupProvider, IntegrationSecret};
use crate::providers::{BackupStorage, ProviderError};

/// Ensure the bucket exists, then build the env variables for `project`.
pub(crate) async fn prepare_backup_env(
    storage: &dyn BackupStorage,
    target: &BackupIntegration,
    creds: &IntegrationSecret,
    project: &str,
) -> Result<BTreeMap<String, String>, ProviderError> {
    let env = backup_env(target, creds, project)?;
    if !storage.bucket_exists(target, creds).await? {
        storage.create_bucket(target, creds).await?;
        tracing::info!(bucket = %target.bucket, "backup bucket created");
    }
    Ok(env)
}

/// Env variables for an S3-compatible backup target.
pub fn backup_env(
    target: &BackupIntegration,
    creds: &IntegrationSecret,
    project: &str,
) -> Result<BTreeMap<String, String>, ProviderError> {
    let access_key = creds
        .key_id
        .clone()
        .ok_or_else(|| ProviderError::MissingCredentials(target.integration.clone()))?;

    let (provider, region, endpoint) = match target.provider {
        BackupProvider::S3 => {
            let region = target
                .region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string());
            let endpoint = target
                .endpoint
                .clone()
                .unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"));
            ("s3", region, endpoint)
        }
        BackupProvider::R2 => {
            let endpoint = match (&target.endpoint, &target.account_id) {
                (Some(endpoint), _) => endpoint.clone(),
                (None, Some(account)) => format!("https://{account}.r2.cloudflarestorage.com"),
                (None, None) => {
                    return Err(ProviderError::provider(
                        "r2",
                        "an account id or endpoint is required",
                    ));
                }
            };
            ("r2", "auto".to_string(), endpoint)
        }
        BackupProvider::B2 => {
            let Some(region) = target.region.clone() else {
                return Err(ProviderError::provider("b2", "a region is required"));
            };
            let endpoint = target
                .endpoint
                .clone()
                .unwrap_or_else(|| format!("https://s3.{region}.backblazeb2.com"));
            ("b2", region, endpoint)
        }
    };

    Ok(BTreeMap::from([
        ("BACKUP_PROVIDER".to_string(), provider.to_string()),
        ("BACKUP_BUCKET".to_string(), target.bucket.clone()),
        ("BACKUP_PREFIX".to_string(), project.to_string()),
        ("BACKUP_REGION".to_string(), region),
        ("BACKUP_ENDPOINT".to_string(), endpoint),
        ("BACKUP_ACCESS_KEY_ID".to_string(), access_key),
        ("BACKUP_SECRET_ACCESS_KEY".to_string(), creds.secret.clone()),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntegrationId;

    fn target(provider: BackupProvider) -> BackupIntegration {
        BackupIntegration {
            integration: IntegrationId::new("storage"),
            provider,
            bucket: "backups".to_string(),
            region: None,
            endpoint: None,
            account_id: None,
        }
    }

    fn creds() -> IntegrationSecret {
        IntegrationSecret::key_pair("AKID", "shh")
    }

    #[test]
    fn s3_defaults_region_and_endpoint() {
        let env = backup_env(&target(BackupProvider::S3), &creds(), "shop").unwrap();
        assert_eq!(env["BACKUP_REGION"], "us-east-1");
        assert_eq!(env["BACKUP_ENDPOINT"], "https://s3.us-east-1.amazonaws.com");
        assert_eq!(env["BACKUP_PREFIX"], "shop");
        assert_eq!(env["BACKUP_ACCESS_KEY_ID"], "AKID");
    }

    #[test]
    fn r2_endpoint_comes_from_account() {
        let mut r2 = target(BackupProvider::R2);
        r2.account_id = Some("acc123".to_string());
        let env = backup_env(&r2, &creds(), "shop").unwrap();
        assert_eq!(env["BACKUP_ENDPOINT"], "https://acc123.r2.cloudflarestorage.com");
        assert_eq!(env["BACKUP_REGION"], "auto");
    }

    #[test]
    fn r2_without_account_is_rejected() {
        assert!(backup_env(&target(BackupProvider::R2), &creds(), "shop").is_err());
    }

    #[test]
    fn b2_requires_region() {
        assert!(backup_env(&target(BackupProvider::B2), &creds(), "shop").is_err());

        let mut b2 = target(BackupProvider::B2);
        b2.region = Some("us-west-004".to_string());
        let env = backup_env(&b2, &creds(), "shop").unwrap();
        assert_eq!(env["BACKUP_ENDPOINT"], "https://s3.us-west-004.backblazeb2.com");
    }

    #[test]
    fn access_key_id_is_required() {
        let err = backup_env(
            &target(BackupProvider::S3),
            &IntegrationSecret::token("only-secret"),
            "shop",
        )
        .unwrap_err();
        assert!(err.is_authorization());
    }
}
