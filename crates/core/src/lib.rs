pub mod artifact;
pub mod audit;
pub mod auth;
pub mod config;
pub mod dedup;
pub mod metrics;
pub mod queue;
pub mod report;
pub mod stages;
pub mod testing;
pub mod worker;

pub use artifact::{ArtifactError, ArtifactStore, FsArtifactStore, StoredArtifact};
pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, SanitizedConfig, StageConfig,
};
pub use dedup::{
    fingerprint, ContentDeduplicator, DedupDecision, DedupError, DedupRecord, DedupStore,
    SqliteDedupStore,
};
pub use queue::{DeadLetter, QueueError, QueueMessage, QueueTransport, ReceiptToken, SqliteQueue};
pub use report::{SanitizedResponse, SecureErrorReporter, Severity};
pub use stages::{
    ArticleGenerator, CollectStage, ContentSource, DigestGenerator, FsPublisher,
    GeneratedArticle, HtmlRenderer, HttpContentSource, ProcessStage, PublishStage, Publisher,
    RenderStage, SiteRenderer, SourceBundle, SourceDocument,
};
pub use worker::{
    lease_seconds, BatchDrainLoop, BatchState, ContentSummary, DrainReason, DrainSummary,
    OutcomeStatus, ProcessingEstimator, ProcessingOutcome, StageCompletionSignaler, StageError,
    StageHandler, StageKind, StageWorker, Trigger, WorkItem, WorkItemError, WorkerError,
    WorkerStatus,
};
