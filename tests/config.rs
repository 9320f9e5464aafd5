// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, env-backed secrets, and file discovery.

use harbormaster::config::*;
use harbormaster::error::Error;
use harbormaster::providers::{CredentialStore, ProviderError};
use harbormaster::types::IntegrationId;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = OrchestratorConfig::from_yaml("{}").unwrap();
        assert_eq!(config.provisioning.ssh_attempts, 30);
        assert_eq!(config.provisioning.ssh_interval, Duration::from_secs(10));
        assert_eq!(config.provisioning.target_user, "deploy");
        assert_eq!(config.provisioning.tunnel_attempts, 6);
        assert_eq!(config.deployment.local_origin, "https://localhost:443");
        assert!(config.credentials.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
provisioning:
  server_active_timeout: 5m
  ssh_attempts: 12
  ssh_interval: 2s
  ssh_connect_timeout: 500ms
  settle_delay: 1s
  tunnel_attempts: 4
  tunnel_interval: 3s
  target_user: ops
  default_region: nyc3
  default_size: s-2vcpu-4gb

deployment:
  local_origin: http://localhost:8080
  propagation_attempts: 5
  propagation_interval: 1s

credentials:
  do: literal-token
  s3:
    key_id: AKIA123
    secret:
      env: HARBORMASTER_TEST_S3_SECRET
      default: fallback
"#;
        let config = OrchestratorConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.provisioning.server_active_timeout,
            Duration::from_secs(300)
        );
        assert_eq!(
            config.provisioning.ssh_connect_timeout,
            Duration::from_millis(500)
        );
        assert_eq!(config.provisioning.target_user, "ops");
        assert_eq!(config.provisioning.default_region, "nyc3");
        assert_eq!(config.deployment.propagation_attempts, 5);
        assert_eq!(config.deployment.local_origin, "http://localhost:8080");

        assert_eq!(
            config.credentials.get("do"),
            Some(&CredentialEntry::Secret(SecretValue::Literal(
                "literal-token".to_string()
            )))
        );
        assert!(matches!(
            config.credentials.get("s3"),
            Some(CredentialEntry::Detailed { key_id: Some(_), .. })
        ));
    }

    #[test]
    fn malformed_duration_is_a_yaml_error() {
        let yaml = "provisioning:\n  ssh_interval: soon\n";
        assert!(matches!(
            OrchestratorConfig::from_yaml(yaml),
            Err(Error::Yaml(_))
        ));
    }
}

mod validation {
    use super::*;

    #[test]
    fn zero_ssh_attempts_rejected() {
        let err = OrchestratorConfig::from_yaml("provisioning:\n  ssh_attempts: 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("ssh_attempts")));
    }

    #[test]
    fn zero_tunnel_attempts_rejected() {
        let err =
            OrchestratorConfig::from_yaml("provisioning:\n  tunnel_attempts: 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("tunnel_attempts")));
    }

    #[test]
    fn root_target_user_rejected() {
        let err =
            OrchestratorConfig::from_yaml("provisioning:\n  target_user: root\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("non-root")));
    }
}

mod secrets {
    use super::*;

    fn from_env(var: &str, default: Option<&str>) -> SecretValue {
        SecretValue::FromEnv {
            var: var.to_string(),
            default: default.map(str::to_string),
        }
    }

    #[test]
    fn env_reference_resolves_at_lookup() {
        let value = from_env("HARBORMASTER_TEST_TOKEN", None);
        temp_env::with_var("HARBORMASTER_TEST_TOKEN", Some("from_environment"), || {
            assert_eq!(value.resolve().unwrap(), "from_environment");
        });
    }

    #[test]
    fn env_reference_falls_back_to_default() {
        let value = from_env("HARBORMASTER_TEST_UNSET", Some("default_value"));
        temp_env::with_var_unset("HARBORMASTER_TEST_UNSET", || {
            assert_eq!(value.resolve().unwrap(), "default_value");
        });
    }

    #[test]
    fn missing_env_without_default_errors() {
        let value = from_env("HARBORMASTER_TEST_MISSING", None);
        temp_env::with_var_unset("HARBORMASTER_TEST_MISSING", || {
            assert!(matches!(
                value.resolve(),
                Err(Error::MissingEnvVar(var)) if var == "HARBORMASTER_TEST_MISSING"
            ));
        });
    }

    #[test]
    fn debug_output_redacts_literals() {
        let value = SecretValue::Literal("hunter2".to_string());
        assert!(!format!("{value:?}").contains("hunter2"));
    }
}

mod credential_store {
    use super::*;

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    const YAML: &str = r#"
credentials:
  cf-dns: token-1
  s3:
    key_id: AKIA123
    secret:
      env: HARBORMASTER_TEST_STORE_SECRET
"#;

    #[test]
    fn resolves_configured_entries() {
        let store = OrchestratorConfig::from_yaml(YAML).unwrap().credential_store();

        temp_env::with_var("HARBORMASTER_TEST_STORE_SECRET", Some("s3-secret"), || {
            let token = block_on(store.integration_secret(&IntegrationId::new("cf-dns"))).unwrap();
            assert_eq!(token.secret, "token-1");
            assert_eq!(token.key_id, None);

            let pair = block_on(store.integration_secret(&IntegrationId::new("s3"))).unwrap();
            assert_eq!(pair.key_id.as_deref(), Some("AKIA123"));
            assert_eq!(pair.secret, "s3-secret");
        });
    }

    #[test]
    fn unknown_or_unresolvable_entries_are_missing_credentials() {
        let store = OrchestratorConfig::from_yaml(YAML).unwrap().credential_store();

        let err = block_on(store.integration_secret(&IntegrationId::new("gh"))).unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredentials(id) if id.as_str() == "gh"));

        temp_env::with_var_unset("HARBORMASTER_TEST_STORE_SECRET", || {
            let err = block_on(store.integration_secret(&IntegrationId::new("s3"))).unwrap_err();
            assert!(matches!(err, ProviderError::MissingCredentials(_)));
        });
    }
}

mod discovery {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_primary_filename() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME),
            "provisioning:\n  target_user: ops\n",
        )
        .unwrap();

        let config = OrchestratorConfig::discover(dir.path()).unwrap();
        assert_eq!(config.provisioning.target_user, "ops");
    }

    #[test]
    fn finds_config_in_dot_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".harbormaster")).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME_DIR),
            "deployment:\n  propagation_attempts: 2\n",
        )
        .unwrap();

        let config = OrchestratorConfig::discover(dir.path()).unwrap();
        assert_eq!(config.deployment.propagation_attempts, 2);
    }

    #[test]
    fn missing_config_reports_directory() {
        let dir = TempDir::new().unwrap();
        let err = OrchestratorConfig::discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(path) if path == dir.path()));
    }
}
