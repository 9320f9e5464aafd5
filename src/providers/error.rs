// ABOUTME: Typed errors shared by every remote provider client.
// ABOUTME: Carries HTTP status as data so callers never classify by message text.

use thiserror::Error;

use crate::types::IntegrationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Transport failure or timeout; the request may not have reached the provider.
    Network,
    /// Missing credentials or a 401/403 response.
    Authorization,
    /// The resource does not exist (404).
    NotFound,
    /// Any other failure reported by the provider.
    Provider,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("network error talking to {provider}: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} rejected the credentials (HTTP {status})")]
    Unauthorized { provider: String, status: u16 },

    #[error("no credentials configured for integration {0}")]
    MissingCredentials(IntegrationId),

    #[error("{provider}: {resource} not found")]
    NotFound { provider: String, resource: String },

    #[error("{provider} returned an error: {message}")]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },
}

impl ProviderError {
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Network {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Provider {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP error response by its status code.
    pub fn from_status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let provider = provider.into();
        match status {
            401 | 403 => ProviderError::Unauthorized { provider, status },
            404 => ProviderError::NotFound {
                provider,
                resource: message.into(),
            },
            _ => ProviderError::Provider {
                provider,
                status: Some(status),
                message: message.into(),
            },
        }
    }

    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Network { .. } => ProviderErrorKind::Network,
            ProviderError::Unauthorized { .. } | ProviderError::MissingCredentials(_) => {
                ProviderErrorKind::Authorization
            }
            ProviderError::NotFound { .. } => ProviderErrorKind::NotFound,
            ProviderError::Provider { .. } => ProviderErrorKind::Provider,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ProviderErrorKind::NotFound
    }

    pub fn is_authorization(&self) -> bool {
        self.kind() == ProviderErrorKind::Authorization
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(
            ProviderError::from_status("dns", 401, "bad token").kind(),
            ProviderErrorKind::Authorization
        );
        assert_eq!(
            ProviderError::from_status("dns", 403, "forbidden").kind(),
            ProviderErrorKind::Authorization
        );
        assert_eq!(
            ProviderError::from_status("dns", 404, "record r1").kind(),
            ProviderErrorKind::NotFound
        );
        assert_eq!(
            ProviderError::from_status("dns", 500, "oops").kind(),
            ProviderErrorKind::Provider
        );
    }

    #[test]
    fn message_text_does_not_drive_classification() {
        let err = ProviderError::provider("cloud", "upstream said 401 somewhere");
        assert_eq!(err.kind(), ProviderErrorKind::Provider);
    }

    #[test]
    fn provider_error_keeps_status_as_data() {
        let err = ProviderError::from_status("cloud", 422, "size unavailable");
        assert_eq!(err.to_string(), "cloud returned an error: size unavailable");
        assert!(matches!(
            err,
            ProviderError::Provider {
                status: Some(422),
                ..
            }
        ));
    }
}
