//! Stress tests for MockIoT
//!
//! Run with: cargo test --release stress -- --ignored

use chrono::Utc;
use mockiot::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn generator(fleet: &[(DeviceType, u32)], sink: Arc<MemorySink>) -> Generator {
    let catalog = Arc::new(InMemoryCatalog::with_devices(generate_fleet(fleet)));
    Generator::builder(catalog, sink)
        .pacer(Arc::new(InstantPacer::new()))
        .retention(RetentionPolicy::unbounded())
        .build()
}

#[tokio::test]
#[ignore] // Run manually with --ignored
async fn stress_test_year_of_minutes() {
    let sink = Arc::new(MemorySink::with_capacity(1024));
    let generator = generator(&[(DeviceType::CarbonSensor, 1)], sink.clone());

    // 365 days at one-minute resolution
    let config = GenerationConfig::last_days(Utc::now(), 365).with_interval_minutes(1);
    let start = Instant::now();
    generator
        .run(&GenerationRequest::TimeSeries(config))
        .await
        .unwrap();

    let elapsed = start.elapsed();
    let total = sink.total();
    let rate = total as f64 / elapsed.as_secs_f64();

    println!("Generated {} records in {:?}", total, elapsed);
    println!("Rate: {:.0} records/second", rate);

    assert_eq!(total, 365 * 1440);
    assert!(
        rate > 100_000.0,
        "Should generate at least 100k records/s, got {:.0}",
        rate
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_test_concurrent_tasks() {
    let sink = Arc::new(MemorySink::with_capacity(1024));
    let generator = generator(&DeviceType::carbon_monitoring().map(|t| (t, 5)), sink.clone());

    let num_tasks = 200;
    let start = Instant::now();

    let mut ids = Vec::with_capacity(num_tasks);
    for _ in 0..num_tasks {
        let config = GenerationConfig::last_days(Utc::now(), 7).with_interval_minutes(30);
        ids.push(
            generator
                .submit(GenerationRequest::TimeSeries(config))
                .await
                .unwrap(),
        );
    }

    tokio::time::timeout(Duration::from_secs(120), async {
        while generator.registry().active().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tasks did not settle");

    let elapsed = start.elapsed();
    println!("{} tasks finished in {:?}", num_tasks, elapsed);

    for id in ids {
        let task = generator.status(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
    assert_eq!(sink.total(), (num_tasks * 20 * 7 * 48) as u64);
}

#[tokio::test]
#[ignore]
async fn stress_test_registry_churn() {
    let registry = Arc::new(TaskRegistry::new(
        RetentionPolicy::default().with_max_tasks(100),
    ));

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let id = registry.create(TaskKind::CarbonPeak).await;
        registry.mark_running(id, "running").await;
        registry.update_progress(id, 50, "half way").await;
        registry.fail(id, "synthetic failure").await;
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Registry cycled {} tasks in {:?}", iterations, elapsed);
    println!("Rate: {:.0} tasks/second", rate);

    assert!(registry.len().await <= 100);
    assert!(
        rate > 10_000.0,
        "Should cycle at least 10k tasks/s, got {:.0}",
        rate
    );
}
