//! Counters and gauges recorded by the agent.
//!
//! The registry is an ordinary value owned by whoever composes the agent and
//! handed out behind an `Arc`; nothing is registered with the prometheus
//! default registry.

use prometheus::{GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub const PROBLEM_COUNTER: &str = "problem_counter";
pub const PROBLEM_GAUGE: &str = "problem_gauge";
pub const SYNC_ATTEMPTS: &str = "condition_sync_attempts";
pub const SYNC_FAILURES: &str = "condition_sync_failures";

pub struct MetricsRegistry {
    registry: Registry,
    problem_counter: IntCounterVec,
    problem_gauge: GaugeVec,
    sync_attempts: IntCounter,
    sync_failures: IntCounter,
}

impl MetricsRegistry {
    pub fn new() -> prometheus::Result<Self> {
        let problem_counter = IntCounterVec::new(
            Opts::new(PROBLEM_COUNTER, "Number of problem events reported"),
            &["reason"],
        )?;
        let problem_gauge = GaugeVec::new(
            Opts::new(PROBLEM_GAUGE, "Whether a condition currently reports a problem"),
            &["type", "reason"],
        )?;
        let sync_attempts = IntCounter::new(SYNC_ATTEMPTS, "Node condition push attempts")?;
        let sync_failures = IntCounter::new(SYNC_FAILURES, "Failed node condition pushes")?;

        let registry = Registry::new();
        registry.register(Box::new(problem_counter.clone()))?;
        registry.register(Box::new(problem_gauge.clone()))?;
        registry.register(Box::new(sync_attempts.clone()))?;
        registry.register(Box::new(sync_failures.clone()))?;

        Ok(Self {
            registry,
            problem_counter,
            problem_gauge,
            sync_attempts,
            sync_failures,
        })
    }

    pub fn record_problem_event(&self, reason: &str) {
        self.problem_counter.with_label_values(&[reason]).inc();
    }

    pub fn set_problem_condition(&self, condition_type: &str, reason: &str, problem: bool) {
        let value = if problem { 1.0 } else { 0.0 };
        self.problem_gauge
            .with_label_values(&[condition_type, reason])
            .set(value);
    }

    pub fn record_sync_attempt(&self) {
        self.sync_attempts.inc();
    }

    pub fn record_sync_failure(&self) {
        self.sync_failures.inc();
    }

    pub fn problem_events(&self, reason: &str) -> u64 {
        self.problem_counter.with_label_values(&[reason]).get()
    }

    pub fn problem_condition(&self, condition_type: &str, reason: &str) -> f64 {
        self.problem_gauge
            .with_label_values(&[condition_type, reason])
            .get()
    }

    pub fn sync_attempts(&self) -> u64 {
        self.sync_attempts.get()
    }

    pub fn sync_failures(&self) -> u64 {
        self.sync_failures.get()
    }

    /// Prometheus text exposition of everything in this registry.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = String::new();
        TextEncoder::new().encode_utf8(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
