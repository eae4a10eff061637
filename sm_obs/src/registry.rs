//! ABOUTME: Process-wide registry of labeled gauges backed by prometheus-client
//! ABOUTME: Enforces register-once identities and exposes lock-free gauge handles

use prometheus_client::{
    encoding::{text::encode, EncodeLabelValue, LabelValueEncoder},
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use sm_core::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Write as _};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard};

/// Label pairs in key order, as stored in a gauge family
pub type LabelSet = Vec<(String, String)>;

/// Update handle for one registered gauge
///
/// Values live in a single atomic, so readers never see a torn value.
pub type GaugeHandle = Gauge<f64, AtomicU64>;

type GaugeFamily = Family<Vec<(String, EscapedValue)>, GaugeHandle>;

/// Label value escaped for the text exposition format
///
/// Values such as channel titles come from remote APIs and may hold
/// quotes, backslashes or newlines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EscapedValue(String);

impl EncodeLabelValue for EscapedValue {
    fn encode(&self, encoder: &mut LabelValueEncoder<'_>) -> std::result::Result<(), fmt::Error> {
        for c in self.0.chars() {
            match c {
                '\\' => encoder.write_str("\\\\")?,
                '"' => encoder.write_str("\\\"")?,
                '\n' => encoder.write_str("\\n")?,
                c => encoder.write_char(c)?,
            }
        }
        Ok(())
    }
}

fn family_labels(labels: &LabelSet) -> Vec<(String, EscapedValue)> {
    labels
        .iter()
        .map(|(k, v)| (k.clone(), EscapedValue(v.clone())))
        .collect()
}

/// Ordered label mapping fixed at registration time
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn to_label_set(&self) -> LabelSet {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}=\"{}\"", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Description of a gauge to register
#[derive(Debug, Clone)]
pub struct GaugeSpec {
    pub name: String,
    pub help: String,
    pub labels: Labels,
}

impl GaugeSpec {
    pub fn new(name: impl Into<String>, help: impl Into<String>, labels: Labels) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels,
        }
    }

    fn identity(&self) -> String {
        format!("{}{}", self.name, self.labels)
    }
}

/// Point-in-time reading of one gauge
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    pub name: String,
    pub labels: LabelSet,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Gauge,
    Counter,
}

#[derive(Debug)]
struct IssuedGauge {
    name: String,
    labels: LabelSet,
    handle: GaugeHandle,
}

#[derive(Debug, Default)]
struct Inner {
    registry: Registry,
    kinds: HashMap<String, MetricKind>,
    families: HashMap<String, GaugeFamily>,
    identities: HashSet<(String, LabelSet)>,
    issued: Vec<IssuedGauge>,
}

/// Append-only store of every metric the process exports
///
/// Cloning shares the same underlying registry.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| Error::Config(format!("Failed to lock metrics registry: {}", e)))
    }

    /// Register a single gauge identity
    pub fn register_gauge(&self, spec: GaugeSpec) -> Result<GaugeHandle> {
        let mut handles = self.register_gauges(vec![spec])?;
        handles
            .pop()
            .ok_or_else(|| Error::Validation("No gauge was registered".to_string()))
    }

    /// Register a set of gauges atomically
    ///
    /// Fails without registering anything if any `(name, labels)` pair is
    /// already taken, appears twice in `specs`, or clashes with a counter.
    pub fn register_gauges(&self, specs: Vec<GaugeSpec>) -> Result<Vec<GaugeHandle>> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let mut pending = HashSet::new();
        for spec in &specs {
            if spec.name.is_empty() {
                return Err(Error::Validation("Metric name cannot be empty".to_string()));
            }
            if inner.kinds.get(&spec.name) == Some(&MetricKind::Counter) {
                return Err(Error::DuplicateMetric(format!(
                    "{} is registered as a counter",
                    spec.name
                )));
            }
            let key = (spec.name.clone(), spec.labels.to_label_set());
            if inner.identities.contains(&key) || !pending.insert(key) {
                return Err(Error::DuplicateMetric(spec.identity()));
            }
        }

        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let labels = spec.labels.to_label_set();
            let existing = inner.families.get(&spec.name).cloned();
            let family = match existing {
                Some(family) => family,
                None => {
                    let family = GaugeFamily::default();
                    inner
                        .registry
                        .register(spec.name.clone(), spec.help.clone(), family.clone());
                    inner.kinds.insert(spec.name.clone(), MetricKind::Gauge);
                    inner.families.insert(spec.name.clone(), family.clone());
                    family
                }
            };

            let handle = family.get_or_create(&family_labels(&labels)).clone();
            inner.identities.insert((spec.name.clone(), labels.clone()));
            inner.issued.push(IssuedGauge {
                name: spec.name,
                labels,
                handle: handle.clone(),
            });
            handles.push(handle);
        }

        Ok(handles)
    }

    /// Register an unlabeled counter
    ///
    /// The text exposition appends `_total` to the name.
    pub fn register_counter(&self, name: &str, help: &str) -> Result<Counter> {
        let mut inner = self.lock()?;

        if name.is_empty() {
            return Err(Error::Validation("Metric name cannot be empty".to_string()));
        }
        if inner.kinds.contains_key(name) {
            return Err(Error::DuplicateMetric(name.to_string()));
        }

        let counter = Counter::default();
        inner.registry.register(name, help, counter.clone());
        inner.kinds.insert(name.to_string(), MetricKind::Counter);

        Ok(counter)
    }

    /// Current value of every registered gauge, in registration order
    ///
    /// Each value is read atomically; the set as a whole is not a consistent cut.
    pub fn snapshot(&self) -> Result<Vec<GaugeSample>> {
        let inner = self.lock()?;

        Ok(inner
            .issued
            .iter()
            .map(|g| GaugeSample {
                name: g.name.clone(),
                labels: g.labels.clone(),
                value: g.handle.get(),
            })
            .collect())
    }

    pub fn gauge_count(&self) -> Result<usize> {
        Ok(self.lock()?.issued.len())
    }

    /// Look up the current value of one gauge identity
    pub fn gauge_value(&self, name: &str, labels: &Labels) -> Result<Option<f64>> {
        let wanted = labels.to_label_set();
        let inner = self.lock()?;

        Ok(inner
            .issued
            .iter()
            .find(|g| g.name == name && g.labels == wanted)
            .map(|g| g.handle.get()))
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let inner = self.lock()?;

        let mut buffer = String::new();
        encode(&mut buffer, &inner.registry)
            .map_err(|e| Error::Config(format!("Failed to encode metrics: {}", e)))?;

        Ok(buffer)
    }
}
