pub mod problem_metrics;
pub mod remote;

use async_trait::async_trait;

use crate::types::Status;

pub use problem_metrics::MetricsExporter;
pub use remote::RemoteExporter;

/// Consumer of the problems reported by monitors.
///
/// Exporters must not fail the caller: anything that goes wrong while exporting
/// is handled (logged) inside the exporter.
#[async_trait]
pub trait Exporter: Send + Sync {
    fn name(&self) -> &str;

    async fn export_problems(&self, status: &Status);
}
