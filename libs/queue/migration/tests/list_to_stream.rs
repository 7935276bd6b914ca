//! Full migration of a backlog from the list provider to the stream
//! provider. Boots a throwaway Redis container; Docker must be available.

use queue_migration::{MigrationController, MigrationOptions, MigrationPhase, ProducerRouter};
use queue_backend::{
    BackendRegistry, Job, ListBackend, Priority, QueueBackend, QueueConfig, StreamBackend,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::TestRedis;

#[tokio::test]
async fn test_migrate_thousand_jobs_list_to_stream() {
    let redis = TestRedis::new().await;

    let source = Arc::new(ListBackend::new("list-primary", redis.connection()));
    let target = Arc::new(StreamBackend::new("stream-primary", redis.connection()));

    source
        .configure_queue(QueueConfig::new("orders"))
        .await
        .unwrap();
    target
        .configure_queue(QueueConfig::new("orders"))
        .await
        .unwrap();

    // 1,000 jobs across priorities, with dedup keys for idempotent retry
    let jobs: Vec<Job> = (0..1000)
        .map(|n| {
            let priority = match n % 4 {
                0 => Priority::Critical,
                1 => Priority::High,
                2 => Priority::Medium,
                _ => Priority::Low,
            };
            Job::new("orders", "process_order", json!({ "order": n }))
                .with_priority(priority)
                .with_dedup_key(format!("order-{}", n))
        })
        .collect();
    source.enqueue_batch(&jobs).await.unwrap();
    assert_eq!(source.len("orders").await.unwrap(), 1000);

    let registry = Arc::new(BackendRegistry::new());
    registry.register(source.clone());
    registry.register(target.clone());
    let router = Arc::new(ProducerRouter::new("list-primary"));
    let controller = MigrationController::new(registry, router.clone());

    let report = controller
        .migrate(
            "orders",
            "list-primary",
            "stream-primary",
            MigrationOptions::new()
                .with_drain_first(true)
                .with_batch_size(100)
                .with_verify_data(true)
                .with_settle_window(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    assert_eq!(report.phase, MigrationPhase::Completed);
    assert_eq!(report.migrated_jobs, 1000);
    assert_eq!(report.failed_jobs, 0);
    assert_eq!(report.progress_percent, 100);

    // Producers were rerouted at drain start
    assert_eq!(router.route("orders"), "stream-primary");

    // Target holds at least as many jobs as the drained source
    let source_len = source.len("orders").await.unwrap();
    let target_len = target.len("orders").await.unwrap();
    assert!(target_len >= source_len);
    assert_eq!(target_len, 1000);

    // Spot-check delivery from the target preserves priority ordering
    let first = target
        .reserve(&["orders".into()], "verifier", Duration::from_secs(1), 1)
        .await
        .unwrap();
    assert_eq!(first[0].job.priority, Priority::Critical);
}
