//! Drain cycle lifecycle tests against a mock transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use conveyor_core::config::StageConfig;
use conveyor_core::queue::QueueTransport;
use conveyor_core::testing::{fixtures, MockHandler, MockQueue};
use conveyor_core::worker::{
    backoff, BatchDrainLoop, DrainReason, ProcessingEstimator, StageError, StageKind,
};

fn test_config() -> StageConfig {
    StageConfig {
        empty_polls_before_done: 3,
        backoff_base_secs: 0,
        ..StageConfig::default()
    }
}

fn drain_loop(queue: Arc<MockQueue>, handler: Arc<MockHandler>, config: StageConfig) -> BatchDrainLoop {
    BatchDrainLoop::new(
        StageKind::Collect,
        queue as Arc<dyn QueueTransport>,
        handler,
        config,
    )
    .with_backoff(backoff::none())
}

#[tokio::test]
async fn test_drains_batch_and_counts_artifacts() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));
    handler.set_created_outcomes().await;

    for _ in 0..5 {
        queue
            .send("collect", &fixtures::work_item_bytes("collect_source"))
            .await
            .unwrap();
    }

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = drain_loop(Arc::clone(&queue), handler.clone(), test_config())
        .run(&mut estimator, &mut shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    assert_eq!(batch.messages_leased, 5);
    assert_eq!(batch.artifacts_created, 5);
    assert_eq!(batch.artifacts_failed, 0);
    assert_eq!(batch.completion, Some(DrainReason::GraceExhausted));
    assert_eq!(handler.handled_count().await, 5);
    // Everything acknowledged
    assert_eq!(queue.depth("collect").await.unwrap(), 0);
}

#[tokio::test]
async fn test_no_premature_completion_with_gapped_producer() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));
    handler.set_created_outcomes().await;

    // Producer emits 6 messages with gaps shorter than the backoff
    // ceiling, the way an upstream stage trickles out its fan-out.
    let producer_queue = Arc::clone(&queue);
    let producer = tokio::spawn(async move {
        for _ in 0..6 {
            producer_queue
                .send("collect", &fixtures::work_item_bytes("collect_source"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
    });

    let config = test_config();
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = BatchDrainLoop::new(
        StageKind::Collect,
        Arc::clone(&queue) as Arc<dyn QueueTransport>,
        handler.clone(),
        config,
    )
    .with_backoff(backoff::constant(Duration::from_millis(60)))
    .run(&mut estimator, &mut shutdown_rx)
    .await
    .unwrap();
    drop(shutdown_tx);

    producer.await.unwrap();

    // DONE only after every emitted message was leased at least once
    assert_eq!(batch.messages_leased, 6);
    assert_eq!(batch.artifacts_created, 6);
    assert_eq!(batch.completion, Some(DrainReason::GraceExhausted));
    assert_eq!(queue.depth("collect").await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicates_counted_separately() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));
    // Default mode without set_created_outcomes: everything duplicates
    handler.set_duplicate_outcomes().await;

    for _ in 0..3 {
        queue
            .send("collect", &fixtures::work_item_bytes("collect_source"))
            .await
            .unwrap();
    }

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = drain_loop(Arc::clone(&queue), handler, test_config())
        .run(&mut estimator, &mut shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    assert_eq!(batch.messages_leased, 3);
    assert_eq!(batch.artifacts_created, 0);
    assert_eq!(batch.duplicates_skipped, 3);
    // Duplicates are still acknowledged, not retried
    assert_eq!(queue.depth("collect").await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_handler_retries_then_dead_letters() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));
    // Fail every attempt
    for _ in 0..10 {
        handler
            .push_error(StageError::Source("feed down".to_string()))
            .await;
    }

    queue
        .send("collect", &fixtures::work_item_bytes("collect_source"))
        .await
        .unwrap();

    let config = StageConfig {
        max_dequeue_count: 2,
        ..test_config()
    };

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = drain_loop(Arc::clone(&queue), handler.clone(), config)
        .run(&mut estimator, &mut shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    // Two handler attempts within the budget, then dead-lettered
    assert_eq!(handler.handled_count().await, 2);
    assert_eq!(batch.artifacts_failed, 2);
    assert_eq!(batch.dead_lettered, 1);
    assert_eq!(queue.depth("collect").await.unwrap(), 0);

    let letters = queue.dead_letters(Some("collect"), 10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].reason, "retry budget exhausted");
}

#[tokio::test]
async fn test_poison_message_never_reaches_handler() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));
    handler.set_created_outcomes().await;

    queue.send("collect", b"{\"not\": \"a work item\"}").await.unwrap();
    queue
        .send("collect", &fixtures::work_item_bytes("collect_source"))
        .await
        .unwrap();

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = drain_loop(Arc::clone(&queue), handler.clone(), test_config())
        .run(&mut estimator, &mut shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    // Only the valid message was handled; the poison one went straight
    // to the dead-letter table
    assert_eq!(handler.handled_count().await, 1);
    assert_eq!(batch.dead_lettered, 1);
    assert_eq!(batch.artifacts_created, 1);

    let letters = queue.dead_letters(Some("collect"), 10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].reason, "missing operation discriminator");
}

#[tokio::test]
async fn test_zero_artifact_signal_is_dropped() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));
    handler.set_created_outcomes().await;

    let signal = fixtures::completion_signal("collect_requested", 0);
    queue
        .send("collect", &signal.to_bytes().unwrap())
        .await
        .unwrap();

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = drain_loop(Arc::clone(&queue), handler.clone(), test_config())
        .run(&mut estimator, &mut shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    assert_eq!(handler.handled_count().await, 0);
    assert_eq!(batch.messages_skipped, 1);
    assert_eq!(batch.artifacts_created, 0);
    assert_eq!(queue.depth("collect").await.unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_ends_cycle_and_reports_reason() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));

    let config = StageConfig {
        // Long grace so only the shutdown can end the cycle quickly
        empty_polls_before_done: 1000,
        ..test_config()
    };

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let sender = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = sender.send(());
    });

    let batch = BatchDrainLoop::new(
        StageKind::Collect,
        Arc::clone(&queue) as Arc<dyn QueueTransport>,
        handler,
        config,
    )
    .with_backoff(backoff::constant(Duration::from_millis(20)))
    .run(&mut estimator, &mut shutdown_rx)
    .await
    .unwrap();
    drop(shutdown_tx);

    assert_eq!(batch.completion, Some(DrainReason::Shutdown));
}

#[tokio::test]
async fn test_iteration_cap_bounds_pathological_cycles() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));

    let config = StageConfig {
        max_iterations: 5,
        empty_polls_before_done: u32::MAX,
        ..test_config()
    };

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = drain_loop(Arc::clone(&queue), handler, config)
        .run(&mut estimator, &mut shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    assert_eq!(batch.completion, Some(DrainReason::IterationCap));
}

#[tokio::test]
async fn test_hung_handler_times_out_and_message_dead_letters() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));
    handler.set_delay(Duration::from_secs(5)).await;

    queue
        .send("collect", &fixtures::work_item_bytes("collect_source"))
        .await
        .unwrap();

    let config = StageConfig {
        handler_timeout_secs: 1,
        max_dequeue_count: 1,
        ..test_config()
    };

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = drain_loop(Arc::clone(&queue), handler, config)
        .run(&mut estimator, &mut shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    // First delivery timed out and was abandoned; the redelivery blew
    // the retry budget and was dead-lettered without another attempt
    assert_eq!(batch.artifacts_failed, 1);
    assert_eq!(batch.dead_lettered, 1);
    assert_eq!(queue.depth("collect").await.unwrap(), 0);
}

#[tokio::test]
async fn test_burst_of_messages_drains_completely() {
    let queue = Arc::new(MockQueue::new());
    let handler = Arc::new(MockHandler::new(StageKind::Collect));
    handler.set_created_outcomes().await;

    // A burst bigger than many batches
    for _ in 0..85 {
        queue
            .send("collect", &fixtures::work_item_bytes("collect_source"))
            .await
            .unwrap();
    }

    let config = StageConfig {
        max_batch_size: 8,
        ..test_config()
    };

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let mut estimator = ProcessingEstimator::default();

    let batch = drain_loop(Arc::clone(&queue), handler.clone(), config)
        .run(&mut estimator, &mut shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    assert_eq!(batch.messages_leased, 85);
    assert_eq!(batch.artifacts_created, 85);
    assert_eq!(batch.completion, Some(DrainReason::GraceExhausted));
    assert_eq!(queue.depth("collect").await.unwrap(), 0);
}
