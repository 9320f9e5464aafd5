// ABOUTME: Tunnel provider contract and ingress rule types.
// ABOUTME: Routes map public hostnames to services on the tunneled server.

use async_trait::async_trait;

use super::ProviderError;
use crate::model::IntegrationSecret;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTunnel {
    pub remote_id: String,
    pub name: String,
}

/// One hostname route in a tunnel's ingress configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub hostname: String,
    pub service: String,
    /// Skip certificate verification toward the origin.
    pub no_tls_verify: bool,
    /// SNI presented to the origin.
    pub origin_server_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelConfiguration {
    pub ingress: Vec<IngressRule>,
}

impl TunnelConfiguration {
    pub fn route(&self, hostname: &str) -> Option<&IngressRule> {
        self.ingress.iter().find(|r| r.hostname == hostname)
    }
}

#[async_trait]
pub trait TunnelProvider: Send + Sync {
    async fn get_or_create_tunnel(
        &self,
        name: &str,
        creds: &IntegrationSecret,
    ) -> Result<RemoteTunnel, ProviderError>;

    async fn tunnel_token(
        &self,
        tunnel_id: &str,
        creds: &IntegrationSecret,
    ) -> Result<String, ProviderError>;

    /// Add the route, replacing any existing rule for the same hostname.
    async fn add_http_route(
        &self,
        tunnel_id: &str,
        rule: &IngressRule,
        creds: &IntegrationSecret,
    ) -> Result<(), ProviderError>;

    async fn remove_http_route(
        &self,
        tunnel_id: &str,
        hostname: &str,
        creds: &IntegrationSecret,
    ) -> Result<(), ProviderError>;

    async fn configuration(
        &self,
        tunnel_id: &str,
        creds: &IntegrationSecret,
    ) -> Result<TunnelConfiguration, ProviderError>;

    async fn delete_tunnel(
        &self,
        tunnel_id: &str,
        creds: &IntegrationSecret,
    ) -> Result<(), ProviderError>;

    /// DNS target that CNAME records use to reach this tunnel.
    fn route_target(&self, tunnel_id: &str) -> String;
}
