use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::storage::error::StoreError;
use crate::storage::traits::{NodeStatusBackend, RemoteStore};
use crate::storage::wire::{NodeCondition, NodeEvent};
use crate::types::{Condition, ConditionType, Event};

/// Remote store client for one node, layered over a raw backend.
pub struct RemoteClient {
    node_name: String,
    backend: Arc<dyn NodeStatusBackend>,
}

impl RemoteClient {
    pub fn new(node_name: impl Into<String>, backend: Arc<dyn NodeStatusBackend>) -> Self {
        Self {
            node_name: node_name.into(),
            backend,
        }
    }

    async fn within<T, F>(deadline: Instant, timeout: Duration, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl RemoteStore for RemoteClient {
    async fn get_conditions(&self, types: &[ConditionType]) -> Result<Vec<Condition>, StoreError> {
        let record = self.backend.get_node_status(&self.node_name).await?;
        record
            .status
            .conditions
            .iter()
            .filter(|c| types.is_empty() || types.contains(&c.condition_type))
            .map(NodeCondition::to_condition)
            .collect()
    }

    async fn set_conditions(
        &self,
        conditions: Vec<Condition>,
        timeout: Duration,
    ) -> Result<(), StoreError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let heartbeat = Utc::now();
        let updates: Vec<NodeCondition> = conditions
            .iter()
            .map(|c| NodeCondition::from_condition(c, heartbeat))
            .collect();

        let mut attempt = 0u32;
        loop {
            if started.elapsed() > timeout {
                return Err(StoreError::Timeout(timeout));
            }
            attempt += 1;

            let mut record = Self::within(
                deadline,
                timeout,
                self.backend.get_node_status(&self.node_name),
            )
            .await?;
            record.apply_conditions(&updates);

            let written = Self::within(
                deadline,
                timeout,
                self.backend.update_node_status(&self.node_name, &record),
            )
            .await;

            match written {
                Ok(()) => {
                    log::debug!(
                        "Updated {} conditions on node {} (attempt {})",
                        updates.len(),
                        self.node_name,
                        attempt
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    log::debug!(
                        "Conflict updating node {} status, retrying (attempt {})",
                        self.node_name,
                        attempt
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record_event(&self, source: &str, event: &Event) -> Result<(), StoreError> {
        let event = NodeEvent::new(&self.node_name, source, event);
        self.backend.create_event(&event).await
    }
}
