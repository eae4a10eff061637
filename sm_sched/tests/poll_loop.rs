//! ABOUTME: Integration tests for the poll loop against a live registry
//! ABOUTME: Covers interval timing, parallel fetch and last-known values

use async_trait::async_trait;
use sm_obs::{GaugeHandle, GaugeSpec, Labels, MetricRegistry};
use sm_platform::{Platform, PlatformError, SourceAdapter};
use sm_sched::{PollScheduler, SchedulerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Sets its gauge to the call number until `fail_after` calls have happened
struct StepAdapter {
    id: String,
    gauge: GaugeHandle,
    calls: AtomicUsize,
    fail_after: usize,
    delay: Duration,
}

impl StepAdapter {
    fn register(registry: &MetricRegistry, id: &str, fail_after: usize, delay: Duration) -> Arc<Self> {
        let gauge = registry
            .register_gauge(GaugeSpec::new(
                "smue_step",
                "Step counter",
                Labels::new().with("source", id),
            ))
            .unwrap();
        Arc::new(Self {
            id: id.to_string(),
            gauge,
            calls: AtomicUsize::new(0),
            fail_after,
            delay,
        })
    }
}

#[async_trait]
impl SourceAdapter for StepAdapter {
    async fn fetch(&self) -> sm_platform::Result<()> {
        tokio::time::sleep(self.delay).await;
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call > self.fail_after {
            return Err(PlatformError::Data("upstream went away".to_string()));
        }
        self.gauge.set(call as f64);
        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn source_id(&self) -> &str {
        &self.id
    }
}

#[tokio::test]
async fn test_loop_polls_at_interval() {
    let registry = MetricRegistry::new();
    let first = StepAdapter::register(&registry, "a", usize::MAX, Duration::ZERO);
    let second = StepAdapter::register(&registry, "b", usize::MAX, Duration::ZERO);
    let scheduler = PollScheduler::new(
        vec![first.clone(), second.clone()],
        SchedulerConfig {
            interval: Duration::from_secs(1),
            parallel: false,
        },
        &registry,
        "smue_",
    )
    .unwrap();
    let counter = scheduler.poll_counter();

    let shutdown = CancellationToken::new();
    let handle = scheduler.spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(2500)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(counter.get() >= 2, "expected at least two cycles, got {}", counter.get());
    for adapter in [&first, &second] {
        let calls = adapter.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "{} was fetched {} times", adapter.id, calls);
        let value = registry
            .gauge_value("smue_step", &Labels::new().with("source", adapter.id.as_str()))
            .unwrap();
        assert_eq!(value, Some(calls as f64));
    }
}

#[tokio::test]
async fn test_failed_fetch_keeps_last_value() {
    let registry = MetricRegistry::new();
    let adapter = StepAdapter::register(&registry, "a", 1, Duration::ZERO);
    let scheduler = PollScheduler::new(
        vec![adapter.clone()],
        SchedulerConfig::default(),
        &registry,
        "smue_",
    )
    .unwrap();

    let labels = Labels::new().with("source", "a");

    let first = scheduler.run_cycle().await;
    assert!(first.failures.is_empty());
    assert_eq!(registry.gauge_value("smue_step", &labels).unwrap(), Some(1.0));

    let second = scheduler.run_cycle().await;
    assert_eq!(second.failures.len(), 1);
    assert_eq!(second.failures[0].platform, Platform::Twitter);
    assert_eq!(registry.gauge_value("smue_step", &labels).unwrap(), Some(1.0));
}

#[tokio::test]
async fn test_parallel_cycle_overlaps_fetches() {
    let registry = MetricRegistry::new();
    let delay = Duration::from_millis(200);
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        StepAdapter::register(&registry, "a", usize::MAX, delay),
        StepAdapter::register(&registry, "b", usize::MAX, delay),
        StepAdapter::register(&registry, "c", usize::MAX, delay),
    ];
    let scheduler = PollScheduler::new(
        adapters,
        SchedulerConfig {
            interval: Duration::from_secs(60),
            parallel: true,
        },
        &registry,
        "smue_",
    )
    .unwrap();

    let started = Instant::now();
    let report = scheduler.run_cycle().await;

    assert_eq!(report.succeeded(), 3);
    assert!(started.elapsed() < Duration::from_millis(550));
}
