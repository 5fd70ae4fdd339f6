//! Stage worker composition.
//!
//! One StageWorker owns one stage: it watches the stage's inbound queue,
//! runs a full drain cycle whenever work shows up, and signals the next
//! stage when the cycle produced new artifacts. Multiple instances of
//! the same stage can run against the same queue; the transport keeps
//! their leases disjoint and the dedup store absorbs the rest.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::audit::AuditHandle;
use crate::config::StageConfig;
use crate::queue::QueueTransport;

use super::backoff::BackoffSchedule;
use super::drain::BatchDrainLoop;
use super::handler::StageHandler;
use super::lease::ProcessingEstimator;
use super::signaler::StageCompletionSignaler;
use super::types::{DrainSummary, StageKind, WorkerStatus};

/// One pipeline stage's worker instance.
pub struct StageWorker {
    stage: StageKind,
    config: StageConfig,
    queue: Arc<dyn QueueTransport>,
    handler: Arc<dyn StageHandler>,
    audit: Option<AuditHandle>,
    backoff: Option<BackoffSchedule>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    last_drain: Arc<RwLock<Option<DrainSummary>>>,
    depth_hint: Arc<AtomicU64>,
}

impl StageWorker {
    pub fn new(
        stage: StageKind,
        config: StageConfig,
        queue: Arc<dyn QueueTransport>,
        handler: Arc<dyn StageHandler>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            stage,
            config,
            queue,
            handler,
            audit: None,
            backoff: None,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            last_drain: Arc::new(RwLock::new(None)),
            depth_hint: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Override the drain loop's backoff schedule (tests).
    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Start the worker loop (spawns a background task).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(stage = self.stage.as_str(), "worker already running");
            return;
        }

        info!(stage = self.stage.as_str(), "starting stage worker");
        self.spawn_worker_loop();
    }

    /// Stop the worker gracefully. In-flight leases are abandoned by the
    /// drain loop before it returns.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!(stage = self.stage.as_str(), "stopping stage worker");
        let _ = self.shutdown_tx.send(());
    }

    /// Current status for health checks.
    pub async fn status(&self) -> WorkerStatus {
        WorkerStatus {
            stage: self.stage.as_str().to_string(),
            running: self.running.load(Ordering::Relaxed),
            queue_depth_hint: self.depth_hint.load(Ordering::Relaxed),
            last_drain: self.last_drain.read().await.clone(),
        }
    }

    fn spawn_worker_loop(&self) {
        let stage = self.stage;
        let config = self.config.clone();
        let queue = Arc::clone(&self.queue);
        let handler = Arc::clone(&self.handler);
        let audit = self.audit.clone();
        let backoff = self.backoff.clone();
        let running = Arc::clone(&self.running);
        let last_drain = Arc::clone(&self.last_drain);
        let depth_hint = Arc::clone(&self.depth_hint);
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(stage = stage.as_str(), "worker loop started");

            // Estimator state survives across drain cycles so lease
            // sizing keeps learning.
            let mut estimator = ProcessingEstimator::default();

            let signaler = {
                let s = StageCompletionSignaler::new(Arc::clone(&queue));
                match audit.clone() {
                    Some(a) => s.with_audit(a),
                    None => s,
                }
            };

            let idle_poll = Duration::from_secs(config.idle_poll_secs);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(stage = stage.as_str(), "worker loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(idle_poll) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }

                        // Cheap peek so an idle worker doesn't burn a
                        // full grace period every few seconds.
                        match queue.depth(stage.queue_name()).await {
                            Ok(depth) => {
                                depth_hint.store(depth, Ordering::Relaxed);
                                if depth == 0 {
                                    continue;
                                }
                            }
                            Err(e) => {
                                warn!(stage = stage.as_str(), "queue depth check failed: {}", e);
                                continue;
                            }
                        }

                        let mut drain_loop = BatchDrainLoop::new(
                            stage,
                            Arc::clone(&queue),
                            Arc::clone(&handler),
                            config.clone(),
                        );
                        if let Some(ref a) = audit {
                            drain_loop = drain_loop.with_audit(a.clone());
                        }
                        if let Some(ref b) = backoff {
                            drain_loop = drain_loop.with_backoff(Arc::clone(b));
                        }

                        let mut drain_shutdown = shutdown_tx.subscribe();
                        match drain_loop.run(&mut estimator, &mut drain_shutdown).await {
                            Ok(batch) => {
                                *last_drain.write().await = Some(DrainSummary::from(&batch));

                                if let Err(e) = signaler.signal_if_work_done(stage, &batch).await {
                                    warn!(
                                        stage = stage.as_str(),
                                        "failed to signal downstream stage: {}", e
                                    );
                                }

                                if let Ok(depth) = queue.depth(stage.queue_name()).await {
                                    depth_hint.store(depth, Ordering::Relaxed);
                                }
                            }
                            Err(e) => {
                                // Transient infrastructure failure: the
                                // messages keep their place on the queue
                                // and the next tick retries.
                                warn!(stage = stage.as_str(), "drain cycle failed: {}", e);
                            }
                        }
                    }
                }
            }

            info!(stage = stage.as_str(), "worker loop stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SqliteQueue;
    use crate::testing::MockHandler;
    use crate::worker::backoff;
    use crate::worker::types::{Trigger, WorkItem};

    fn fast_config() -> StageConfig {
        StageConfig {
            idle_poll_secs: 0,
            backoff_base_secs: 0,
            ..StageConfig::default()
        }
    }

    #[tokio::test]
    async fn test_worker_status_reflects_running_state() {
        let queue = Arc::new(SqliteQueue::in_memory().unwrap());
        let handler = Arc::new(MockHandler::new(StageKind::Collect));
        let worker = StageWorker::new(
            StageKind::Collect,
            fast_config(),
            queue,
            handler,
        );

        assert!(!worker.status().await.running);

        worker.start().await;
        assert!(worker.status().await.running);

        worker.stop().await;
        assert!(!worker.status().await.running);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_and_signals_downstream() {
        let queue = Arc::new(SqliteQueue::in_memory().unwrap());
        let handler = Arc::new(MockHandler::new(StageKind::Collect));
        handler.set_created_outcomes().await;

        let item = WorkItem::new("collect_source", Trigger::Manual);
        queue
            .send("collect", &item.to_bytes().unwrap())
            .await
            .unwrap();

        let worker = StageWorker::new(
            StageKind::Collect,
            fast_config(),
            Arc::clone(&queue) as Arc<dyn QueueTransport>,
            handler.clone(),
        )
        .with_backoff(backoff::none());

        worker.start().await;

        // Give the loop time to pick up the message and finish a cycle
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if queue.depth("process").await.unwrap() > 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("downstream signal should arrive");

        worker.stop().await;

        assert_eq!(handler.handled_count().await, 1);
        assert_eq!(queue.depth("collect").await.unwrap(), 0);

        let status = worker.status().await;
        let last = status.last_drain.expect("last drain recorded");
        assert_eq!(last.artifacts_created, 1);
    }
}
