// ABOUTME: TCP reachability check for a server's SSH port.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

#[async_trait]
pub trait PortCheck: Send + Sync {
    /// True when a TCP connection to `host:port` succeeds within `timeout`.
    async fn is_open(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPortCheck;

#[async_trait]
impl PortCheck for TcpPortCheck {
    async fn is_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}
