//! ABOUTME: Fixed-interval poll scheduler for platform adapters
//! ABOUTME: Runs every adapter each tick and isolates per-source failures

use futures_util::future::join_all;
use prometheus_client::metrics::counter::Counter;
use sm_obs::{MetricRegistry, ReadinessGate};
use sm_platform::{Platform, SourceAdapter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Fetch all adapters of a cycle concurrently
    pub parallel: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            parallel: false,
        }
    }
}

/// A fetch that failed during a cycle
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub platform: Platform,
    pub source_id: String,
    pub error: String,
}

/// Outcome of one pass over all adapters
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub attempted: usize,
    pub failures: Vec<FetchFailure>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }
}

/// Drives `fetch` on every adapter at a fixed interval
pub struct PollScheduler {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: SchedulerConfig,
    poll_counter: Counter,
    readiness: Option<ReadinessGate>,
}

impl PollScheduler {
    /// Create a scheduler and register its `{prefix}counter` metric
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        config: SchedulerConfig,
        registry: &MetricRegistry,
        prefix: &str,
    ) -> sm_core::Result<Self> {
        let poll_counter = registry.register_counter(
            &format!("{}counter", prefix),
            "Increment each time we call the platforms to get an update",
        )?;

        Ok(Self {
            adapters,
            config,
            poll_counter,
            readiness: None,
        })
    }

    /// Open `gate` once the first cycle has completed
    pub fn with_readiness(mut self, gate: ReadinessGate) -> Self {
        self.readiness = Some(gate);
        self
    }

    /// Handle to the process-wide poll counter
    pub fn poll_counter(&self) -> Counter {
        self.poll_counter.clone()
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Call `fetch` once on every adapter
    ///
    /// Failures are logged with their source and never stop the cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        self.poll_counter.inc();
        let started = Instant::now();

        info!(adapters = self.adapters.len(), "Calling platforms to fetch latest data");

        let results = if self.config.parallel {
            join_all(self.adapters.iter().map(|adapter| async move {
                (adapter, adapter.fetch().await)
            }))
            .await
        } else {
            let mut results = Vec::with_capacity(self.adapters.len());
            for adapter in &self.adapters {
                results.push((adapter, adapter.fetch().await));
            }
            results
        };

        let mut report = CycleReport {
            attempted: results.len(),
            ..CycleReport::default()
        };

        for (adapter, result) in results {
            if let Err(e) = result {
                warn!(
                    platform = %adapter.platform(),
                    source = %adapter.source_id(),
                    error = %e,
                    "Fetch failed, keeping last known values"
                );
                report.failures.push(FetchFailure {
                    platform: adapter.platform(),
                    source_id: adapter.source_id().to_string(),
                    error: e.to_string(),
                });
            }
        }

        report.duration = started.elapsed();
        info!(
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "Updated metrics"
        );

        report
    }

    /// Poll until `shutdown` is cancelled
    ///
    /// Cancellation is observed between cycles; a cycle in flight completes.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            adapters = self.adapters.len(),
            parallel = self.config.parallel,
            "Poll scheduler started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.run_cycle().await;

            if let Some(gate) = &self.readiness {
                gate.set_ready(true);
            }

            debug!(
                interval_secs = self.config.interval.as_secs(),
                "Waiting until the next fetch time"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Poll scheduler stopped");
    }

    /// Run the poll loop on its own task
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sm_obs::{GaugeHandle, GaugeSpec, Labels};
    use sm_platform::{PlatformError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Publishes its call number into its own gauge unless told to fail
    struct CountingAdapter {
        id: String,
        fail: bool,
        calls: AtomicUsize,
        gauge: GaugeHandle,
    }

    impl CountingAdapter {
        fn new(registry: &MetricRegistry, id: &str, fail: bool) -> Arc<Self> {
            let gauge = registry
                .register_gauge(GaugeSpec::new(
                    "smue_calls",
                    "Calls seen by the adapter",
                    Labels::new().with("source", id),
                ))
                .unwrap();
            Arc::new(Self {
                id: id.to_string(),
                fail,
                calls: AtomicUsize::new(0),
                gauge,
            })
        }
    }

    fn calls_gauge(registry: &MetricRegistry, id: &str) -> Option<f64> {
        registry
            .gauge_value("smue_calls", &Labels::new().with("source", id))
            .unwrap()
    }

    #[async_trait]
    impl SourceAdapter for CountingAdapter {
        async fn fetch(&self) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                Err(PlatformError::Api {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                self.gauge.set(call as f64);
                Ok(())
            }
        }

        fn platform(&self) -> Platform {
            Platform::YouTube
        }

        fn source_id(&self) -> &str {
            &self.id
        }
    }

    #[tokio::test]
    async fn test_cycle_isolates_failures() {
        let registry = MetricRegistry::new();
        let first = CountingAdapter::new(&registry, "first", false);
        let broken = CountingAdapter::new(&registry, "broken", true);
        let last = CountingAdapter::new(&registry, "last", false);
        broken.gauge.set(7.0);

        let scheduler = PollScheduler::new(
            vec![first.clone(), broken.clone(), last.clone()],
            SchedulerConfig::default(),
            &registry,
            "smue_",
        )
        .unwrap();

        let report = scheduler.run_cycle().await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source_id, "broken");
        assert!(report.failures[0].error.contains("boom"));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(last.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.poll_counter().get(), 1);

        // The healthy sources published, the broken one kept its old value
        assert_eq!(calls_gauge(&registry, "first"), Some(1.0));
        assert_eq!(calls_gauge(&registry, "last"), Some(1.0));
        assert_eq!(calls_gauge(&registry, "broken"), Some(7.0));
    }

    #[tokio::test]
    async fn test_parallel_cycle_isolates_failures() {
        let registry = MetricRegistry::new();
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            CountingAdapter::new(&registry, "broken", true),
            CountingAdapter::new(&registry, "a", false),
            CountingAdapter::new(&registry, "b", false),
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

        scheduler.run_cycle().await;
        let report = scheduler.run_cycle().await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(calls_gauge(&registry, "a"), Some(2.0));
        assert_eq!(calls_gauge(&registry, "b"), Some(2.0));
        assert_eq!(calls_gauge(&registry, "broken"), Some(0.0));
    }

    #[tokio::test]
    async fn test_counter_increments_once_per_cycle() {
        let registry = MetricRegistry::new();
        let scheduler =
            PollScheduler::new(vec![], SchedulerConfig::default(), &registry, "smue_").unwrap();

        scheduler.run_cycle().await;
        scheduler.run_cycle().await;

        assert_eq!(scheduler.poll_counter().get(), 2);
        assert!(registry.encode().unwrap().contains("smue_counter_total 2"));
    }

    #[tokio::test]
    async fn test_counter_registered_once() {
        let registry = MetricRegistry::new();
        PollScheduler::new(vec![], SchedulerConfig::default(), &registry, "smue_").unwrap();
        assert!(
            PollScheduler::new(vec![], SchedulerConfig::default(), &registry, "smue_").is_err()
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let registry = MetricRegistry::new();
        let adapter = CountingAdapter::new(&registry, "only", false);
        let gate = ReadinessGate::not_ready();
        let scheduler = PollScheduler::new(
            vec![adapter.clone()],
            SchedulerConfig {
                interval: Duration::from_secs(3600),
                parallel: false,
            },
            &registry,
            "smue_",
        )
        .unwrap()
        .with_readiness(gate.clone());
        let counter = scheduler.poll_counter();

        let shutdown = CancellationToken::new();
        let handle = scheduler.spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.get(), 1);
        assert!(gate.is_ready());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop promptly")
            .unwrap();
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let registry = MetricRegistry::new();
        let adapter = CountingAdapter::new(&registry, "only", false);
        let scheduler = PollScheduler::new(
            vec![adapter.clone()],
            SchedulerConfig::default(),
            &registry,
            "smue_",
        )
        .unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        scheduler.run(shutdown).await;

        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }
}
