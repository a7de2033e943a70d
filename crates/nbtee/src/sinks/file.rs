//! FileSink - writes the stream to a file on disk

use contracts::{ContractError, DataSink};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file
    pub path: PathBuf,
    /// Append to an existing file instead of truncating it
    pub append: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;

        let append = match params.get("append").map(String::as_str) {
            Some("true") => true,
            Some("false") | None => false,
            Some(other) => return Err(format!("invalid 'append' value '{}'", other)),
        };

        Ok(Self { path, append })
    }
}

/// Sink that writes every buffer to a file
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    file: Option<File>,
}

impl FileSink {
    /// Open (or create) the configured file
    #[instrument(name = "file_sink_new", skip(name, config), fields(path = %config.path.display()))]
    pub async fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)
            .await?;

        Ok(Self {
            name: name.into(),
            config,
            file: Some(file),
        })
    }

    /// Create from params map (for factory)
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks[{}].params", name), e))?;
        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))
    }

    fn file(&mut self) -> Result<&mut File, ContractError> {
        self.file
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "file already closed"))
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, buf),
        fields(sink = %self.name, len = buf.len())
    )]
    async fn write(&mut self, buf: &[u8]) -> Result<(), ContractError> {
        let name = self.name.clone();
        self.file()?.write_all(buf).await.map_err(|e| {
            error!(sink = %name, error = %e, "Write failed");
            ContractError::sink_write(&name, e.to_string())
        })
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.flush()
            .await
            .map_err(|e| ContractError::sink_close(&self.name, e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| ContractError::sink_close(&self.name, e.to_string()))?;
        debug!(sink = %self.name, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}
