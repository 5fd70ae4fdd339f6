use std::sync::Arc;

use chrono::{DateTime, Utc};

use conveyor_core::dedup::DedupStore;
use conveyor_core::{
    AuditHandle, AuditStore, Authenticator, Config, QueueTransport, SanitizedConfig,
    SecureErrorReporter, StageWorker,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    queue: Arc<dyn QueueTransport>,
    dedup_records: Arc<dyn DedupStore>,
    workers: Vec<Arc<StageWorker>>,
    reporter: SecureErrorReporter,
    started_at: DateTime<Utc>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        queue: Arc<dyn QueueTransport>,
        dedup_records: Arc<dyn DedupStore>,
        workers: Vec<Arc<StageWorker>>,
    ) -> Self {
        let reporter = SecureErrorReporter::new(
            config.report.service_name.clone(),
            config.report.max_value_len,
        );
        Self {
            config,
            authenticator,
            audit,
            audit_store,
            queue,
            dedup_records,
            workers,
            reporter,
            started_at: Utc::now(),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn queue(&self) -> &Arc<dyn QueueTransport> {
        &self.queue
    }

    pub fn dedup_records(&self) -> &dyn DedupStore {
        self.dedup_records.as_ref()
    }

    pub fn workers(&self) -> &[Arc<StageWorker>] {
        &self.workers
    }

    pub fn reporter(&self) -> &SecureErrorReporter {
        &self.reporter
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
