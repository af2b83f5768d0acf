use async_trait::async_trait;
use std::time::Duration;

use crate::storage::error::StoreError;
use crate::storage::wire::{NodeEvent, NodeStatusRecord};
use crate::types::{Condition, ConditionType, Event, Severity};

/// Remote store as seen by the condition manager and exporters.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Conditions currently stored remotely whose type is in `types`, or all of
    /// them when `types` is empty.
    async fn get_conditions(&self, types: &[ConditionType]) -> Result<Vec<Condition>, StoreError>;

    /// Applies `conditions` to the remote record. `False` removes a type, any
    /// other status upserts it. Write conflicts are retried until `timeout`.
    async fn set_conditions(
        &self,
        conditions: Vec<Condition>,
        timeout: Duration,
    ) -> Result<(), StoreError>;

    /// Creates one event on the node, keeping the time it was observed.
    async fn record_event(&self, source: &str, event: &Event) -> Result<(), StoreError>;

    async fn eventf(
        &self,
        severity: Severity,
        source: &str,
        reason: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        self.record_event(source, &Event::new(severity, reason, message))
            .await
    }
}

/// Raw per-node record access with an optimistic-concurrency token.
#[async_trait]
pub trait NodeStatusBackend: Send + Sync {
    async fn get_node_status(&self, node: &str) -> Result<NodeStatusRecord, StoreError>;

    /// Writes `record` if its `resource_version` still matches the stored one,
    /// otherwise fails with [`StoreError::Conflict`].
    async fn update_node_status(&self, node: &str, record: &NodeStatusRecord)
        -> Result<(), StoreError>;

    async fn create_event(&self, event: &NodeEvent) -> Result<(), StoreError>;
}
