use crate::managers::runner::{RunnerConfig, TaskRunner};
use crate::managers::sink::{BlobStore, OutputSink};
use crate::managers::ssh::{Connector, SshConnector};
use crate::services::logger::Logger;
use crate::services::security::Security;
use crate::services::stream::{EventBus, StreamBridge};
use crate::services::validation::Validation;
use crate::stores::{KeyStore, PlatformStore, TaskStore};
use std::sync::Arc;

/// Composition root: wires stores, the cipher, the event bus, and the task
/// runner together. Callers own the stores and the blob store binding.
pub struct App {
    pub logger: Logger,
    pub bus: Arc<EventBus>,
    pub bridge: StreamBridge,
    pub runner: Arc<TaskRunner>,
}

impl App {
    pub fn new(
        security: Security,
        platforms: Arc<dyn PlatformStore>,
        keys: Arc<dyn KeyStore>,
        tasks: Arc<dyn TaskStore>,
        blob_store: Arc<dyn BlobStore>,
        config: RunnerConfig,
    ) -> Self {
        let logger = Logger::new("keywarden");
        let connector: Arc<dyn Connector> = Arc::new(SshConnector::new(logger.clone()));
        Self::with_connector(
            logger, security, platforms, keys, tasks, blob_store, connector, config,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_connector(
        logger: Logger,
        security: Security,
        platforms: Arc<dyn PlatformStore>,
        keys: Arc<dyn KeyStore>,
        tasks: Arc<dyn TaskStore>,
        blob_store: Arc<dyn BlobStore>,
        connector: Arc<dyn Connector>,
        config: RunnerConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new(logger.clone()));
        let bridge = StreamBridge::new(logger.clone(), bus.clone());
        let sink = Arc::new(OutputSink::new(logger.clone(), blob_store));
        let runner = Arc::new(TaskRunner::new(
            logger.clone(),
            Arc::new(security),
            Validation::new(),
            platforms,
            keys,
            tasks,
            sink,
            bus.clone(),
            connector,
            config,
        ));
        Self {
            logger,
            bus,
            bridge,
            runner,
        }
    }
}
