use async_trait::async_trait;
use std::sync::Arc;

use crate::exporters::Exporter;
use crate::metrics::MetricsRegistry;
use crate::types::Status;

/// Records every reported problem in the metrics registry: a counter per event
/// reason and a gauge per condition type and reason.
pub struct MetricsExporter {
    registry: Arc<MetricsRegistry>,
}

impl MetricsExporter {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Exporter for MetricsExporter {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn export_problems(&self, status: &Status) {
        for event in &status.events {
            self.registry.record_problem_event(&event.reason);
        }

        for condition in &status.conditions {
            self.registry.set_problem_condition(
                &condition.condition_type,
                &condition.reason,
                condition.is_problem(),
            );
        }
    }
}
