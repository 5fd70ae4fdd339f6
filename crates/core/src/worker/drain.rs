//! The batch drain loop.
//!
//! One drain cycle takes a stage's inbound queue from "work arrived" to
//! "definitely empty", surviving an upstream producer that is still
//! appending messages while we poll. The state machine:
//!
//! - DRAINING: lease up to `max_batch_size` messages and handle each.
//! - WAITING: a poll came back empty; wait out an increasing backoff in
//!   case the upstream stage has not finished emitting yet.
//! - DONE: the configured run of consecutive empty polls elapsed, or a
//!   hard cap fired.
//!
//! Exiting on the first empty poll races a slower producer and strands
//! its remaining messages until some external signal notices the queue
//! again, typically minutes later. The bounded grace window trades tens
//! of seconds of idling for eliminating that stall.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::config::StageConfig;
use crate::metrics;
use crate::queue::{QueueMessage, QueueTransport};

use super::backoff::{self, BackoffSchedule};
use super::handler::StageHandler;
use super::lease::{lease_seconds, ProcessingEstimator};
use super::types::{
    BatchState, DrainReason, OutcomeStatus, StageKind, WorkItem, WorkItemError, WorkerError,
};

enum DrainState {
    Draining,
    Waiting,
}

/// Drains one stage's queue in batches until the work is provably done.
pub struct BatchDrainLoop {
    stage: StageKind,
    queue: Arc<dyn QueueTransport>,
    handler: Arc<dyn StageHandler>,
    config: StageConfig,
    backoff: BackoffSchedule,
    audit: Option<AuditHandle>,
}

impl BatchDrainLoop {
    pub fn new(
        stage: StageKind,
        queue: Arc<dyn QueueTransport>,
        handler: Arc<dyn StageHandler>,
        config: StageConfig,
    ) -> Self {
        let backoff = backoff::linear(Duration::from_secs(config.backoff_base_secs));
        Self {
            stage,
            queue,
            handler,
            config,
            backoff,
            audit: None,
        }
    }

    /// Replace the WAITING-state backoff schedule (used by tests to
    /// simulate time without real delays).
    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Run one complete drain cycle.
    ///
    /// Returns the cycle's `BatchState`; the caller decides whether to
    /// signal downstream and whether to keep the process alive.
    pub async fn run(
        &self,
        estimator: &mut ProcessingEstimator,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<BatchState, WorkerError> {
        let stage = self.stage.as_str();
        let started = Instant::now();
        let max_cycle = Duration::from_secs(self.config.max_cycle_secs);

        let mut batch = BatchState::new();
        let mut state = DrainState::Draining;
        let mut iterations: u32 = 0;

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::DrainCycleStarted {
                    stage: stage.to_string(),
                })
                .await;
        }
        debug!(stage, "drain cycle started");

        let reason = loop {
            if iterations >= self.config.max_iterations {
                warn!(stage, iterations, "drain cycle hit iteration cap");
                break DrainReason::IterationCap;
            }
            if started.elapsed() >= max_cycle {
                warn!(stage, "drain cycle hit wall-clock cap");
                break DrainReason::TimeCap;
            }

            match state {
                DrainState::Draining => {
                    iterations += 1;

                    let lease = Duration::from_secs(lease_seconds(
                        Some(Duration::from_secs(self.config.estimated_processing_secs)),
                        estimator.p95(),
                        self.config.safety_margin,
                        Duration::from_secs(self.config.fallback_lease_secs),
                    ));
                    metrics::LEASE_SECONDS
                        .with_label_values(&[stage])
                        .observe(lease.as_secs_f64());

                    let messages = tokio::select! {
                        _ = shutdown.recv() => break DrainReason::Shutdown,
                        result = self.queue.receive(
                            self.stage.queue_name(),
                            self.config.max_batch_size,
                            lease,
                        ) => result?,
                    };

                    if messages.is_empty() {
                        batch.consecutive_empty_polls += 1;
                        metrics::EMPTY_POLLS.with_label_values(&[stage]).inc();
                        state = DrainState::Waiting;
                        continue;
                    }

                    batch.consecutive_empty_polls = 0;

                    let mut interrupted = false;
                    for message in messages {
                        batch.messages_leased += 1;
                        metrics::MESSAGES_LEASED.with_label_values(&[stage]).inc();

                        let message_id = message.id;
                        let receipt = message.receipt.clone();

                        tokio::select! {
                            _ = shutdown.recv() => {
                                // Hand the lease back now so another
                                // instance picks the message up without
                                // waiting out the visibility window.
                                if let Err(e) = self
                                    .queue
                                    .abandon(self.stage.queue_name(), message_id, &receipt)
                                    .await
                                {
                                    warn!(stage, message_id, "failed to abandon lease on shutdown: {}", e);
                                }
                                interrupted = true;
                                break;
                            }
                            _ = self.process_message(message, &mut batch, estimator) => {}
                        }
                    }

                    if interrupted {
                        break DrainReason::Shutdown;
                    }
                }
                DrainState::Waiting => {
                    if batch.consecutive_empty_polls >= self.config.empty_polls_before_done {
                        break DrainReason::GraceExhausted;
                    }

                    let delay = (self.backoff)(batch.consecutive_empty_polls);
                    debug!(
                        stage,
                        empty_polls = batch.consecutive_empty_polls,
                        delay_ms = delay.as_millis() as u64,
                        "queue empty, waiting for stragglers"
                    );

                    tokio::select! {
                        _ = shutdown.recv() => break DrainReason::Shutdown,
                        _ = tokio::time::sleep(delay) => {}
                    }

                    state = DrainState::Draining;
                }
            }
        };

        batch.completion = Some(reason);

        metrics::DRAIN_CYCLES
            .with_label_values(&[stage, reason.as_str()])
            .inc();
        metrics::CYCLE_DURATION
            .with_label_values(&[stage])
            .observe(started.elapsed().as_secs_f64());

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::DrainCycleCompleted {
                    stage: stage.to_string(),
                    messages_leased: batch.messages_leased,
                    artifacts_created: batch.artifacts_created,
                    artifacts_failed: batch.artifacts_failed,
                    duplicates_skipped: batch.duplicates_skipped,
                    empty_polls: batch.consecutive_empty_polls,
                    duration_ms: started.elapsed().as_millis() as u64,
                    reason: reason.as_str().to_string(),
                })
                .await;
        }

        info!(
            stage,
            messages_leased = batch.messages_leased,
            artifacts_created = batch.artifacts_created,
            artifacts_failed = batch.artifacts_failed,
            duplicates_skipped = batch.duplicates_skipped,
            reason = reason.as_str(),
            "drain cycle completed"
        );

        Ok(batch)
    }

    /// Handle one leased message through to delete/abandon/dead-letter.
    ///
    /// Queue bookkeeping failures are logged but never abort the cycle:
    /// the worst case is a redelivery, which the deduplicator absorbs.
    async fn process_message(
        &self,
        message: QueueMessage,
        batch: &mut BatchState,
        estimator: &mut ProcessingEstimator,
    ) {
        let stage = self.stage.as_str();
        let queue_name = self.stage.queue_name();
        let message_id = message.id;

        // Poison check 1: undecodable payloads are logged and moved
        // aside, never retried.
        let item = match WorkItem::from_bytes(&message.body) {
            Ok(item) => item,
            Err(e) => {
                warn!(stage, message_id, "poison message: {}", e);
                metrics::MESSAGE_OUTCOMES
                    .with_label_values(&[stage, "poison"])
                    .inc();
                metrics::DEAD_LETTERS
                    .with_label_values(&[stage, "poison"])
                    .inc();
                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::PoisonMessage {
                            stage: stage.to_string(),
                            message_id,
                            error: e.to_string(),
                        })
                        .await;
                }
                let reason = match e {
                    WorkItemError::MissingOperation => "missing operation discriminator",
                    WorkItemError::Malformed(_) => "malformed payload",
                };
                if let Err(e) = self
                    .queue
                    .dead_letter(queue_name, message_id, &message.receipt, reason)
                    .await
                {
                    warn!(stage, message_id, "failed to dead-letter poison message: {}", e);
                }
                batch.dead_lettered += 1;
                return;
            }
        };

        // Poison check 2: retry budget. The dequeue count includes this
        // delivery, so a budget of N allows N handler attempts.
        if message.dequeue_count > self.config.max_dequeue_count {
            warn!(
                stage,
                message_id,
                dequeue_count = message.dequeue_count,
                "retry budget exhausted, dead-lettering"
            );
            metrics::DEAD_LETTERS
                .with_label_values(&[stage, "retry_budget_exhausted"])
                .inc();
            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::MessageDeadLettered {
                        stage: stage.to_string(),
                        message_id,
                        dequeue_count: message.dequeue_count,
                        reason: "retry budget exhausted".to_string(),
                    })
                    .await;
            }
            if let Err(e) = self
                .queue
                .dead_letter(
                    queue_name,
                    message_id,
                    &message.receipt,
                    "retry budget exhausted",
                )
                .await
            {
                warn!(stage, message_id, "failed to dead-letter message: {}", e);
            }
            batch.dead_lettered += 1;
            return;
        }

        // Consumer-side validation of completion signals: a signal
        // claiming zero artifacts is dropped even though the producer
        // should never have sent it.
        if item.is_zero_artifact_signal() {
            debug!(stage, message_id, batch_id = %item.batch_id, "ignoring zero-artifact signal");
            metrics::MESSAGE_OUTCOMES
                .with_label_values(&[stage, "skipped"])
                .inc();
            batch.messages_skipped += 1;
            if let Err(e) = self.queue.delete(queue_name, message_id, &message.receipt).await {
                warn!(stage, message_id, "failed to delete skipped signal: {}", e);
            }
            return;
        }

        if item.force_rebuild() {
            batch.force_rebuild_requested = true;
        }

        // The handler timeout sits below the lease so a hung handler is
        // abandoned and redelivered quickly instead of silently holding
        // the lease until it lapses.
        let handler_timeout = Duration::from_secs(self.config.handler_timeout_secs);
        let handle_started = Instant::now();
        let result = tokio::time::timeout(handler_timeout, self.handler.handle(&item)).await;

        let failure: Option<String> = match result {
            Err(_) => Some(format!(
                "handler exceeded {}s timeout",
                handler_timeout.as_secs()
            )),
            Ok(Err(e)) => Some(e.to_string()),
            Ok(Ok(outcome)) => {
                let elapsed = handle_started.elapsed();
                estimator.record(elapsed);
                metrics::HANDLER_DURATION
                    .with_label_values(&[stage])
                    .observe(elapsed.as_secs_f64());

                if outcome.status != OutcomeStatus::Failed {
                    metrics::MESSAGE_OUTCOMES
                        .with_label_values(&[stage, outcome.status.as_str()])
                        .inc();
                }

                match outcome.status {
                    OutcomeStatus::Created => {
                        batch.artifacts_created += 1;
                        if let (Some(fp), Some(artifact_ref)) =
                            (&outcome.content_fingerprint, &outcome.artifact_ref)
                        {
                            if let Some(ref audit) = self.audit {
                                audit
                                    .emit(AuditEvent::ArtifactCreated {
                                        stage: stage.to_string(),
                                        batch_id: item.batch_id.clone(),
                                        fingerprint: fp.clone(),
                                        artifact_ref: artifact_ref.clone(),
                                    })
                                    .await;
                            }
                        }
                        None
                    }
                    OutcomeStatus::Duplicate => {
                        batch.duplicates_skipped += 1;
                        debug!(
                            stage,
                            message_id,
                            batch_id = %item.batch_id,
                            fingerprint = outcome.content_fingerprint.as_deref().unwrap_or(""),
                            "duplicate content"
                        );
                        if let Some(fp) = &outcome.content_fingerprint {
                            if let Some(ref audit) = self.audit {
                                audit
                                    .emit(AuditEvent::DuplicateSkipped {
                                        stage: stage.to_string(),
                                        batch_id: item.batch_id.clone(),
                                        fingerprint: fp.clone(),
                                    })
                                    .await;
                            }
                        }
                        None
                    }
                    OutcomeStatus::Skipped => {
                        batch.messages_skipped += 1;
                        debug!(
                            stage,
                            message_id,
                            detail = outcome.detail.as_deref().unwrap_or(""),
                            "item skipped"
                        );
                        None
                    }
                    // A Failed outcome is treated exactly like an Err:
                    // abandoned for retry.
                    OutcomeStatus::Failed => Some(
                        outcome
                            .detail
                            .unwrap_or_else(|| "handler reported failure".to_string()),
                    ),
                }
            }
        };

        match failure {
            None => {
                // Delete strictly after the handler returned: the
                // artifact (if any) is durable by now, so the message
                // can never be acknowledged-but-lost.
                if let Err(e) = self.queue.delete(queue_name, message_id, &message.receipt).await {
                    warn!(stage, message_id, "failed to delete message: {}", e);
                }
            }
            Some(error) => {
                let will_retry = message.dequeue_count < self.config.max_dequeue_count;
                warn!(
                    stage,
                    message_id,
                    dequeue_count = message.dequeue_count,
                    will_retry,
                    "handler failed: {}",
                    error
                );
                batch.artifacts_failed += 1;
                metrics::MESSAGE_OUTCOMES
                    .with_label_values(&[stage, "failed"])
                    .inc();
                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::HandlerFailed {
                            stage: stage.to_string(),
                            batch_id: Some(item.batch_id.clone()),
                            message_id,
                            error,
                            dequeue_count: message.dequeue_count,
                            will_retry,
                        })
                        .await;
                }
                // Abandon instead of letting the lease lapse: redelivery
                // happens as soon as another poll runs.
                if let Err(e) = self.queue.abandon(queue_name, message_id, &message.receipt).await
                {
                    warn!(stage, message_id, "failed to abandon message: {}", e);
                }
            }
        }
    }
}
