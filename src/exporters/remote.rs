use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::ConditionManager;
use crate::exporters::Exporter;
use crate::storage::RemoteStore;
use crate::types::{Event, Status};

/// Sends events to the cluster's event sink and conditions to the condition
/// manager, which owns their reconciliation into the node status.
pub struct RemoteExporter {
    client: Arc<dyn RemoteStore>,
    manager: Arc<ConditionManager>,
    event_timeout: Duration,
}

impl RemoteExporter {
    pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(client: Arc<dyn RemoteStore>, manager: Arc<ConditionManager>) -> Self {
        Self {
            client,
            manager,
            event_timeout: Self::DEFAULT_EVENT_TIMEOUT,
        }
    }

    /// Upper bound for a single event call.
    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    fn emit_events(&self, source: &str, events: &[Event]) {
        if events.is_empty() {
            return;
        }

        let client = Arc::clone(&self.client);
        let source = source.to_string();
        let events = events.to_vec();
        let timeout = self.event_timeout;
        tokio::spawn(async move {
            for event in events {
                match tokio::time::timeout(timeout, client.record_event(&source, &event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        log::warn!("Dropping event {} from {}: {}", event.reason, source, e);
                    }
                    Err(_) => {
                        log::warn!(
                            "Dropping event {} from {}: no answer within {:?}",
                            event.reason,
                            source,
                            timeout
                        );
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Exporter for RemoteExporter {
    fn name(&self) -> &str {
        "remote"
    }

    async fn export_problems(&self, status: &Status) {
        for condition in &status.conditions {
            self.manager.update_condition(condition.clone());
        }
        self.emit_events(&status.source, &status.events);
    }
}
