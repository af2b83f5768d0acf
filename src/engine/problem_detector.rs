use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::exporters::Exporter;
use crate::monitors::Monitor;
use crate::types::Status;

/// Fans in the status streams of every monitor and hands each status to every
/// exporter.
pub struct ProblemDetector {
    monitors: Vec<Box<dyn Monitor>>,
    exporters: Vec<Arc<dyn Exporter>>,
}

impl ProblemDetector {
    pub fn new(monitors: Vec<Box<dyn Monitor>>, exporters: Vec<Arc<dyn Exporter>>) -> Self {
        Self {
            monitors,
            exporters,
        }
    }

    /// Starts all monitors and dispatches until `shutdown` fires. Fails if a
    /// monitor cannot start or once every monitor channel has closed.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        if self.monitors.is_empty() {
            bail!("no monitors configured");
        }

        let mut streams = Vec::with_capacity(self.monitors.len());
        for monitor in &self.monitors {
            let receiver = monitor
                .start()
                .await
                .with_context(|| format!("failed to start monitor {}", monitor.name()))?;
            streams.push(ReceiverStream::new(receiver));
        }
        let mut statuses = stream::select_all(streams);

        log::info!(
            "Problem detector running with {} monitors and {} exporters",
            self.monitors.len(),
            self.exporters.len()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Problem detector stopped");
                    return Ok(());
                }
                next = statuses.next() => match next {
                    Some(status) => self.dispatch(&status).await,
                    None => bail!("all monitor channels closed"),
                },
            }
        }
    }

    async fn dispatch(&self, status: &Status) {
        log::debug!(
            "Status from {}: {} events, {} conditions",
            status.source,
            status.events.len(),
            status.conditions.len()
        );
        for exporter in &self.exporters {
            exporter.export_problems(status).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitors::ChannelMonitor;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CollectingExporter {
        seen: Mutex<Vec<Status>>,
    }

    #[async_trait]
    impl Exporter for CollectingExporter {
        fn name(&self) -> &str {
            "collecting"
        }

        async fn export_problems(&self, status: &Status) {
            self.seen.lock().push(status.clone());
        }
    }

    struct BrokenMonitor;

    #[async_trait]
    impl Monitor for BrokenMonitor {
        fn name(&self) -> &str {
            "broken"
        }

        async fn start(&self) -> Result<mpsc::Receiver<Status>> {
            bail!("log file not found")
        }
    }

    async fn wait_for(exporter: &CollectingExporter, count: usize) {
        for _ in 0..100 {
            if exporter.seen.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_fans_in_multiple_monitors_to_all_exporters() {
        let (kernel, kernel_tx) = ChannelMonitor::new("kernel-monitor", 8);
        let (disk, disk_tx) = ChannelMonitor::new("disk-monitor", 8);
        let first = Arc::new(CollectingExporter::default());
        let second = Arc::new(CollectingExporter::default());
        let detector = Arc::new(ProblemDetector::new(
            vec![Box::new(kernel), Box::new(disk)],
            vec![
                first.clone() as Arc<dyn Exporter>,
                second.clone() as Arc<dyn Exporter>,
            ],
        ));
        let shutdown = CancellationToken::new();

        let runner = {
            let detector = detector.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { detector.run(shutdown).await })
        };

        kernel_tx.report(Status::new("kernel-monitor")).await.unwrap();
        disk_tx.report(Status::new("disk-monitor")).await.unwrap();
        wait_for(&first, 2).await;
        wait_for(&second, 2).await;

        shutdown.cancel();
        runner.await.unwrap().unwrap();

        let mut sources: Vec<String> = first.seen.lock().iter().map(|s| s.source.clone()).collect();
        sources.sort();
        assert_eq!(sources, vec!["disk-monitor", "kernel-monitor"]);
        assert_eq!(second.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_monitor_start_failure_is_fatal() {
        let (healthy, _tx) = ChannelMonitor::new("kernel-monitor", 8);
        let detector = ProblemDetector::new(
            vec![Box::new(healthy), Box::new(BrokenMonitor)],
            vec![Arc::new(CollectingExporter::default()) as Arc<dyn Exporter>],
        );

        let err = detector.run(CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_no_monitors_is_fatal() {
        let detector = ProblemDetector::new(vec![], vec![]);

        assert!(detector.run(CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_channels_end_the_loop() {
        let (kernel, kernel_tx) = ChannelMonitor::new("kernel-monitor", 8);
        let (disk, disk_tx) = ChannelMonitor::new("disk-monitor", 8);
        let exporter = Arc::new(CollectingExporter::default());
        let detector = ProblemDetector::new(
            vec![Box::new(kernel), Box::new(disk)],
            vec![exporter.clone() as Arc<dyn Exporter>],
        );

        kernel_tx.report(Status::new("kernel-monitor")).await.unwrap();
        drop(kernel_tx);
        drop(disk_tx);

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            detector.run(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert!(result.is_err());
        assert_eq!(exporter.seen.lock().len(), 1);
    }
}
