use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::storage::error::StoreError;
use crate::storage::traits::NodeStatusBackend;
use crate::storage::wire::{NodeEvent, NodeStatusRecord};

const DEFAULT_LOG_CAPACITY: usize = 1024;

/// Versioned node records kept in memory. Backs `--dry-run` and the tests, and
/// can simulate concurrent writers and outages. Only the most recent writes and
/// events are kept.
#[derive(Clone)]
pub struct InMemoryBackend {
    records: Arc<RwLock<HashMap<String, NodeStatusRecord>>>,
    events: Arc<RwLock<VecDeque<NodeEvent>>>,
    writes: Arc<RwLock<VecDeque<NodeStatusRecord>>>,
    log_capacity: usize,
    pending_conflicts: Arc<AtomicU32>,
    update_attempts: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
    events_unavailable: Arc<AtomicBool>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl InMemoryBackend {
    pub fn new(node: &str) -> Self {
        let backend = Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(RwLock::new(VecDeque::new())),
            writes: Arc::new(RwLock::new(VecDeque::new())),
            log_capacity: DEFAULT_LOG_CAPACITY,
            pending_conflicts: Arc::new(AtomicU32::new(0)),
            update_attempts: Arc::new(AtomicU32::new(0)),
            unavailable: Arc::new(AtomicBool::new(false)),
            events_unavailable: Arc::new(AtomicBool::new(false)),
            latency: Arc::new(RwLock::new(None)),
        };
        backend.seed(NodeStatusRecord::new(node));
        backend
    }

    /// Keeps at most `capacity` writes and `capacity` events.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Stores `record` as if written by someone else, bumping its version.
    pub fn seed(&self, mut record: NodeStatusRecord) {
        let mut records = self.records.write();
        let next = records
            .get(&record.metadata.name)
            .map(|r| next_version(&r.metadata.resource_version))
            .unwrap_or_else(|| "1".to_string());
        record.metadata.resource_version = next;
        records.insert(record.metadata.name.clone(), record);
    }

    pub fn record(&self, node: &str) -> Option<NodeStatusRecord> {
        self.records.read().get(node).cloned()
    }

    /// The next `count` updates fail with a conflict, each after another writer
    /// has bumped the stored version.
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_events_unavailable(&self, unavailable: bool) {
        self.events_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = Some(latency);
    }

    pub fn update_attempts(&self) -> u32 {
        self.update_attempts.load(Ordering::SeqCst)
    }

    pub fn successful_writes(&self) -> Vec<NodeStatusRecord> {
        self.writes.read().iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<NodeEvent> {
        self.events.read().iter().cloned().collect()
    }

    async fn delay(&self) {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn push_bounded<T>(log: &RwLock<VecDeque<T>>, capacity: usize, item: T) {
    let mut log = log.write();
    log.push_back(item);
    while log.len() > capacity {
        log.pop_front();
    }
}

fn next_version(current: &str) -> String {
    (current.parse::<u64>().unwrap_or(0) + 1).to_string()
}

fn unavailable_error() -> StoreError {
    StoreError::Remote {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

#[async_trait]
impl NodeStatusBackend for InMemoryBackend {
    async fn get_node_status(&self, node: &str) -> Result<NodeStatusRecord, StoreError> {
        self.delay().await;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable_error());
        }
        self.record(node)
            .ok_or_else(|| StoreError::NotFound(node.to_string()))
    }

    async fn update_node_status(
        &self,
        node: &str,
        record: &NodeStatusRecord,
    ) -> Result<(), StoreError> {
        self.delay().await;
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable_error());
        }

        let mut records = self.records.write();
        let stored = records
            .get_mut(node)
            .ok_or_else(|| StoreError::NotFound(node.to_string()))?;

        if self.take_conflict() {
            stored.metadata.resource_version = next_version(&stored.metadata.resource_version);
            return Err(StoreError::Conflict);
        }
        if stored.metadata.resource_version != record.metadata.resource_version {
            return Err(StoreError::Conflict);
        }

        let mut updated = record.clone();
        updated.metadata.resource_version = next_version(&stored.metadata.resource_version);
        *stored = updated.clone();
        drop(records);

        push_bounded(&self.writes, self.log_capacity, updated);
        Ok(())
    }

    async fn create_event(&self, event: &NodeEvent) -> Result<(), StoreError> {
        self.delay().await;
        if self.events_unavailable.load(Ordering::SeqCst) {
            return Err(unavailable_error());
        }
        push_bounded(&self.events, self.log_capacity, event.clone());
        Ok(())
    }
}
