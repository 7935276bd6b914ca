//! Integration tests for the Redis providers.
//!
//! Each test boots a throwaway Redis container; Docker must be available.

use futures::StreamExt;
use queue_backend::{
    dlq_name, IterOptions, Job, ListBackend, Priority, QueueBackend, QueueConfig, StreamBackend,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::TestRedis;

fn job(queue: &str, priority: Priority) -> Job {
    Job::new(queue, "test", json!({"n": 1})).with_priority(priority)
}

async fn providers(redis: &TestRedis) -> Vec<Arc<dyn QueueBackend>> {
    vec![
        Arc::new(ListBackend::new("list", redis.connection())),
        Arc::new(StreamBackend::new("stream", redis.connection())),
    ]
}

#[tokio::test]
async fn test_enqueue_reserve_ack_round_trip() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("rt-{}", backend.name());
        backend
            .configure_queue(QueueConfig::new(&queue))
            .await
            .unwrap();

        let j = job(&queue, Priority::Medium);
        backend.enqueue(&j).await.unwrap();
        assert_eq!(backend.len(&queue).await.unwrap(), 1);

        let reservations = backend
            .reserve(&[queue.clone()], "c1", Duration::from_secs(1), 1)
            .await
            .unwrap();
        assert_eq!(reservations.len(), 1, "{} must deliver", backend.name());
        assert_eq!(reservations[0].job.id, j.id);

        backend.ack(&reservations[0]).await.unwrap();
        assert_eq!(backend.len(&queue).await.unwrap(), 0);

        // Enqueue; Reserve; Ack is observationally equivalent to removal
        let empty = backend
            .reserve(&[queue.clone()], "c1", Duration::from_millis(100), 1)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}

#[tokio::test]
async fn test_priority_classes_and_fifo() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("prio-{}", backend.name());
        backend
            .configure_queue(QueueConfig::new(&queue))
            .await
            .unwrap();

        // A high, B low, C high: delivery must be A, C, B
        let a = job(&queue, Priority::High);
        let b = job(&queue, Priority::Low);
        let c = job(&queue, Priority::High);
        for j in [&a, &b, &c] {
            backend.enqueue(j).await.unwrap();
        }

        let mut order = Vec::new();
        for _ in 0..3 {
            let got = backend
                .reserve(&[queue.clone()], "c1", Duration::from_secs(1), 1)
                .await
                .unwrap();
            order.push(got[0].job.id);
            backend.ack(&got[0]).await.unwrap();
        }

        assert_eq!(order, vec![a.id, c.id, b.id], "{}", backend.name());
    }
}

#[tokio::test]
async fn test_nack_requeue_applies_backoff_and_retry_count() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("nack-{}", backend.name());
        backend
            .configure_queue(QueueConfig::new(&queue).with_backoff(
                Duration::from_millis(200),
                Duration::from_secs(2),
                2.0,
            ))
            .await
            .unwrap();

        let j = job(&queue, Priority::Medium);
        backend.enqueue(&j).await.unwrap();

        let reservations = backend
            .reserve(&[queue.clone()], "c1", Duration::from_secs(1), 1)
            .await
            .unwrap();
        backend.nack(&reservations[0], true).await.unwrap();

        // Immediately after the nack the job is delayed, not deliverable
        let early = backend
            .reserve(&[queue.clone()], "c1", Duration::from_millis(50), 1)
            .await
            .unwrap();
        assert!(early.is_empty(), "{} delivered before backoff", backend.name());

        // After the backoff it comes back with retry_count incremented
        let redelivered = backend
            .reserve(&[queue.clone()], "c1", Duration::from_secs(2), 1)
            .await
            .unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].job.retry_count, 1);
        backend.ack(&redelivered[0]).await.unwrap();
    }
}

#[tokio::test]
async fn test_reclaim_expired_redelivers() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("reclaim-{}", backend.name());
        backend
            .configure_queue(
                QueueConfig::new(&queue).with_visibility_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();

        let j = job(&queue, Priority::Medium);
        backend.enqueue(&j).await.unwrap();

        let reservations = backend
            .reserve(&[queue.clone()], "crashed-worker", Duration::from_secs(1), 1)
            .await
            .unwrap();
        assert_eq!(reservations.len(), 1);

        // Past the visibility deadline the reaper re-delivers
        tokio::time::sleep(Duration::from_millis(200)).await;
        let reclaimed = backend.reclaim_expired(&queue).await.unwrap();
        assert_eq!(reclaimed, 1, "{}", backend.name());

        let redelivered = backend
            .reserve(&[queue.clone()], "fresh-worker", Duration::from_secs(1), 1)
            .await
            .unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].job.retry_count, 1);
    }
}

#[tokio::test]
async fn test_move_job_to_dlq() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("dlq-{}", backend.name());
        backend
            .configure_queue(QueueConfig::new(&queue))
            .await
            .unwrap();

        let j = job(&queue, Priority::Medium);
        backend.enqueue(&j).await.unwrap();

        let reservations = backend
            .reserve(&[queue.clone()], "c1", Duration::from_secs(1), 1)
            .await
            .unwrap();
        backend.nack(&reservations[0], false).await.unwrap();
        backend
            .move_job(&reservations[0], &dlq_name(&queue))
            .await
            .unwrap();

        assert_eq!(backend.len(&queue).await.unwrap(), 0);
        assert_eq!(backend.len(&dlq_name(&queue)).await.unwrap(), 1);

        let dead = backend.peek(&dlq_name(&queue), 0).await.unwrap().unwrap();
        assert_eq!(dead.id, j.id);
    }
}

#[tokio::test]
async fn test_batch_enqueue_and_iter() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("batch-{}", backend.name());
        backend
            .configure_queue(QueueConfig::new(&queue))
            .await
            .unwrap();

        let jobs: Vec<Job> = (0..10).map(|_| job(&queue, Priority::Medium)).collect();
        let handles = backend.enqueue_batch(&jobs).await.unwrap();
        assert_eq!(handles.len(), 10);
        assert_eq!(backend.len(&queue).await.unwrap(), 10);

        let seen: Vec<Job> = backend
            .iter(&queue, IterOptions::oldest_first().with_limit(4))
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].id, jobs[0].id);
    }
}

#[tokio::test]
async fn test_peek_is_side_effect_free() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("peek-{}", backend.name());
        backend
            .configure_queue(QueueConfig::new(&queue))
            .await
            .unwrap();

        let first = job(&queue, Priority::High);
        let second = job(&queue, Priority::Low);
        backend.enqueue(&first).await.unwrap();
        backend.enqueue(&second).await.unwrap();

        let peeked = backend.peek(&queue, 0).await.unwrap().unwrap();
        assert_eq!(peeked.id, first.id);
        let peeked = backend.peek(&queue, 1).await.unwrap().unwrap();
        assert_eq!(peeked.id, second.id);
        assert!(backend.peek(&queue, 2).await.unwrap().is_none());

        assert_eq!(backend.len(&queue).await.unwrap(), 2);
    }
}

#[tokio::test]
async fn test_extend_reservation_defers_reclaim() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("extend-{}", backend.name());
        backend
            .configure_queue(
                QueueConfig::new(&queue).with_visibility_timeout(Duration::from_millis(150)),
            )
            .await
            .unwrap();

        let j = job(&queue, Priority::Medium);
        backend.enqueue(&j).await.unwrap();
        let reservations = backend
            .reserve(&[queue.clone()], "c1", Duration::from_secs(1), 1)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        backend
            .extend_reservation(
                &reservations[0],
                chrono::Utc::now() + chrono::Duration::milliseconds(300),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let reclaimed = backend.reclaim_expired(&queue).await.unwrap();
        assert_eq!(reclaimed, 0, "{} reclaimed a live reservation", backend.name());

        backend.ack(&reservations[0]).await.unwrap();
    }
}

#[tokio::test]
async fn test_queue_config_round_trip() {
    let redis = TestRedis::new().await;

    for backend in providers(&redis).await {
        let queue = format!("cfg-{}", backend.name());
        let config = QueueConfig::new(&queue)
            .with_rate_limit(5.0, 2)
            .with_max_retries(7);
        backend.configure_queue(config.clone()).await.unwrap();

        let loaded = backend.queue_config(&queue).await.unwrap();
        assert_eq!(loaded, config);
        assert!(backend.queues().await.unwrap().contains(&queue));

        assert!(backend.queue_config("missing-queue").await.is_err());
    }
}
