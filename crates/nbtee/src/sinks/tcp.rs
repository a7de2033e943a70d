//! TcpSink - streams bytes to a TCP peer

use contracts::{ContractError, DataSink};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

/// Configuration for TcpSink
#[derive(Debug, Clone)]
pub struct TcpSinkConfig {
    /// Peer address
    pub addr: SocketAddr,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl TcpSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let nodelay = params
            .get("nodelay")
            .map(|s| s == "true")
            .unwrap_or(true);

        Ok(Self { addr, nodelay })
    }
}

/// Sink that writes the stream to a connected TCP socket
///
/// A peer that goes away makes the next write fail, which terminates this
/// sink only.
pub struct TcpSink {
    name: String,
    config: TcpSinkConfig,
    stream: Option<TcpStream>,
}

impl TcpSink {
    /// Connect to the configured peer
    #[instrument(name = "tcp_sink_new", skip(name, config), fields(addr = %config.addr))]
    pub async fn new(name: impl Into<String>, config: TcpSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let stream = TcpStream::connect(config.addr).await?;
        stream.set_nodelay(config.nodelay)?;

        debug!(sink = %name, target = %config.addr, "TcpSink connected");

        Ok(Self {
            name,
            config,
            stream: Some(stream),
        })
    }

    /// Create from params (for factory)
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = TcpSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks[{}].params", name), e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))
    }
}

impl DataSink for TcpSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "tcp_sink_write",
        skip(self, buf),
        fields(sink = %self.name, len = buf.len())
    )]
    async fn write(&mut self, buf: &[u8]) -> Result<(), ContractError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket not connected"))?;
        stream
            .write_all(buf)
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "tcp_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut stream) = self.stream.take() {
            stream
                .shutdown()
                .await
                .map_err(|e| ContractError::sink_close(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, peer = %self.config.addr, "TcpSink closed");
        Ok(())
    }
}
