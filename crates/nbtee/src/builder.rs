//! Builds a running writer and its sinks from a [`TeeBlueprint`]

use contracts::{ContractError, SinkConfig, SinkType, TeeBlueprint};
use tracing::{info, instrument, warn};

use crate::error::TeeError;
use crate::sinks::{FileSink, LogSink, StdoutSink, TcpSink};
use crate::target::{shared, SharedSink, TargetId};
use crate::tee::Tee;

enum Target {
    Log(SharedSink<LogSink>),
    File(SharedSink<FileSink>),
    Stdout(SharedSink<StdoutSink>),
    Tcp(SharedSink<TcpSink>),
}

/// A sink created from configuration, kept so it can be removed later
pub struct ConfiguredSink {
    name: String,
    sink_type: SinkType,
    bufs_per_sink: Option<usize>,
    target: Target,
}

impl ConfiguredSink {
    /// Open the sink described by `config`
    #[instrument(
        name = "configured_sink_create",
        skip(config),
        fields(sink = %config.name, sink_type = ?config.sink_type)
    )]
    pub async fn from_config(config: &SinkConfig) -> Result<Self, ContractError> {
        let target = match config.sink_type {
            SinkType::Log => Target::Log(shared(LogSink::new(&config.name))),
            SinkType::Stdout => Target::Stdout(shared(StdoutSink::new(&config.name))),
            SinkType::File => {
                Target::File(shared(FileSink::from_params(&config.name, &config.params).await?))
            }
            SinkType::Tcp => {
                Target::Tcp(shared(TcpSink::from_params(&config.name, &config.params).await?))
            }
        };
        Ok(Self {
            name: config.name.clone(),
            sink_type: config.sink_type,
            bufs_per_sink: config.bufs_per_sink,
            target,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sink_type(&self) -> SinkType {
        self.sink_type
    }

    /// Identity of the underlying target inside the writer
    pub fn id(&self) -> TargetId {
        match &self.target {
            Target::Log(t) => TargetId::of(t),
            Target::File(t) => TargetId::of(t),
            Target::Stdout(t) => TargetId::of(t),
            Target::Tcp(t) => TargetId::of(t),
        }
    }

    /// Register with `tee`, using this sink's own queue depth when it has one
    pub fn add_to(&self, tee: &Tee) -> Result<(), TeeError> {
        let depth = self.bufs_per_sink.unwrap_or_else(|| tee.bufs_per_sink());
        match &self.target {
            Target::Log(t) => tee.add_with_depth(t.clone(), depth),
            Target::File(t) => tee.add_with_depth(t.clone(), depth),
            Target::Stdout(t) => tee.add_with_depth(t.clone(), depth),
            Target::Tcp(t) => tee.add_with_depth(t.clone(), depth),
        }
    }

    /// Remove from `tee`, wait for the queue to drain and close the target
    pub async fn remove_and_close(&self, tee: &Tee) -> Result<(), TeeError> {
        match &self.target {
            Target::Log(t) => tee.remove_and_close(t).await,
            Target::File(t) => tee.remove_and_close(t).await,
            Target::Stdout(t) => tee.remove_and_close(t).await,
            Target::Tcp(t) => tee.remove_and_close(t).await,
        }
    }
}

impl std::fmt::Debug for ConfiguredSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredSink")
            .field("name", &self.name)
            .field("sink_type", &self.sink_type)
            .field("id", &self.id())
            .finish()
    }
}

/// Builder for a writer populated from configuration
pub struct TeeBuilder {
    blueprint: TeeBlueprint,
}

impl TeeBuilder {
    pub fn new(blueprint: TeeBlueprint) -> Self {
        Self { blueprint }
    }

    /// Start the writer and add every configured sink in order
    ///
    /// A sink that cannot be opened aborts the build; sinks opened before it
    /// are dropped without being written to.
    #[instrument(
        name = "tee_builder_build",
        skip(self),
        fields(sink_count = self.blueprint.sinks.len())
    )]
    pub async fn build(self) -> Result<ConfiguredTee, TeeError> {
        let mut sinks = Vec::with_capacity(self.blueprint.sinks.len());
        for config in &self.blueprint.sinks {
            sinks.push(ConfiguredSink::from_config(config).await?);
        }

        let tee = Tee::start(self.blueprint.tee);
        for sink in &sinks {
            sink.add_to(&tee)?;
        }
        info!(sinks = sinks.len(), "Writer built from configuration");

        Ok(ConfiguredTee { tee, sinks })
    }
}

/// A running writer together with the sinks it was built with
pub struct ConfiguredTee {
    pub tee: Tee,
    pub sinks: Vec<ConfiguredSink>,
}

impl ConfiguredTee {
    /// Name of the configured sink with the given identity
    pub fn sink_name(&self, id: TargetId) -> Option<&str> {
        self.sinks.iter().find(|s| s.id() == id).map(|s| s.name())
    }

    /// Flush, then remove and close every sink and stop the writer
    ///
    /// Returns one result per configured sink, in configuration order.
    #[instrument(name = "configured_tee_shutdown", skip(self))]
    pub async fn shutdown(self) -> Result<Vec<(String, Result<(), TeeError>)>, TeeError> {
        self.tee.flush().await?;

        let mut results = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let result = sink.remove_and_close(&self.tee).await;
            if let Err(e) = &result {
                warn!(sink = %sink.name(), error = %e, "Sink finished with error");
            }
            results.push((sink.name().to_string(), result));
        }

        self.tee.close().await?;
        Ok(results)
    }
}
