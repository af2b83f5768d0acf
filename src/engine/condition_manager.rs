//! Reconciles locally observed conditions into the remote node status.
//!
//! Producers call [`ConditionManager::update_condition`] from any task. A single
//! sync task wakes every `tick_period`, folds pending updates into the local
//! view and pushes the whole view when any of three independent triggers fires:
//! something changed, a failed push is due for a retry, or the heartbeat
//! period has passed.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsRegistry;
use crate::storage::RemoteStore;
use crate::types::{Condition, ConditionType};

#[derive(Debug, Clone)]
pub struct ConditionManagerConfig {
    pub tick_period: Duration,
    /// Minimum spacing between attempts after a failed push.
    pub resync_period: Duration,
    /// Maximum spacing between pushes when nothing changes.
    pub heartbeat_period: Duration,
    /// Budget for one `set_conditions` call, conflict retries included.
    pub update_timeout: Duration,
}

impl Default for ConditionManagerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            resync_period: Duration::from_secs(10),
            heartbeat_period: Duration::from_secs(60),
            update_timeout: Duration::from_secs(30),
        }
    }
}

/// What a single tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped,
    Pushed,
    Failed,
}

#[derive(Debug, Default)]
struct SyncState {
    last_sync_attempt: Option<Instant>,
    resync_needed: bool,
}

impl SyncState {
    fn elapsed_at_least(&self, now: Instant, period: Duration) -> bool {
        match self.last_sync_attempt {
            Some(last) => now.saturating_duration_since(last) >= period,
            None => true,
        }
    }
}

pub struct ConditionManager {
    client: Arc<dyn RemoteStore>,
    metrics: Arc<MetricsRegistry>,
    config: ConditionManagerConfig,
    updates: Mutex<HashMap<ConditionType, Condition>>,
    conditions: RwLock<HashMap<ConditionType, Condition>>,
    sync_state: Mutex<SyncState>,
}

impl ConditionManager {
    pub fn new(
        client: Arc<dyn RemoteStore>,
        metrics: Arc<MetricsRegistry>,
        config: ConditionManagerConfig,
    ) -> Self {
        Self {
            client,
            metrics,
            config,
            updates: Mutex::new(HashMap::new()),
            conditions: RwLock::new(HashMap::new()),
            sync_state: Mutex::new(SyncState::default()),
        }
    }

    /// Records the latest observation for `condition.condition_type`. Only the
    /// last value before a tick is considered.
    pub fn update_condition(&self, condition: Condition) {
        self.updates
            .lock()
            .insert(condition.condition_type.clone(), condition);
    }

    /// Last known value of every condition type, sorted by type.
    pub fn get_conditions(&self) -> Vec<Condition> {
        let mut conditions: Vec<Condition> = self.conditions.read().values().cloned().collect();
        conditions.sort_by(|a, b| a.condition_type.cmp(&b.condition_type));
        conditions
    }

    /// Spawns the sync task. Call once.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run(shutdown).await })
    }

    async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Condition manager started (tick {:?}, resync {:?}, heartbeat {:?})",
            self.config.tick_period,
            self.config.resync_period,
            self.config.heartbeat_period
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Condition manager stopped");
                    return;
                }
                now = ticker.tick() => {
                    self.sync_at(now).await;
                }
            }
        }
    }

    /// Runs one tick as if the clock read `now`.
    pub async fn sync_at(&self, now: Instant) -> SyncOutcome {
        let dirty = self.merge_updates();

        let conditions = {
            let mut state = self.sync_state.lock();
            let resync_due =
                state.resync_needed && state.elapsed_at_least(now, self.config.resync_period);
            let heartbeat_due = state.elapsed_at_least(now, self.config.heartbeat_period);
            if !(dirty || resync_due || heartbeat_due) {
                return SyncOutcome::Skipped;
            }

            state.last_sync_attempt = Some(now);
            state.resync_needed = false;
            self.get_conditions()
        };

        self.metrics.record_sync_attempt();
        let count = conditions.len();
        match self
            .client
            .set_conditions(conditions, self.config.update_timeout)
            .await
        {
            Ok(()) => {
                log::debug!("Synced {} node conditions", count);
                SyncOutcome::Pushed
            }
            Err(e) => {
                log::error!("Failed to update node conditions: {}", e);
                self.metrics.record_sync_failure();
                self.sync_state.lock().resync_needed = true;
                SyncOutcome::Failed
            }
        }
    }

    /// Moves pending updates into the local view. Returns whether any value
    /// differed from what was already there.
    fn merge_updates(&self) -> bool {
        let pending = std::mem::take(&mut *self.updates.lock());
        if pending.is_empty() {
            return false;
        }

        let mut conditions = self.conditions.write();
        let mut dirty = false;
        for (condition_type, condition) in pending {
            if conditions.get(&condition_type) != Some(&condition) {
                conditions.insert(condition_type, condition);
                dirty = true;
            }
        }
        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;
    use crate::types::{ConditionStatus, Event};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingStore {
        pushes: Mutex<Vec<Vec<Condition>>>,
        failing: AtomicBool,
    }

    impl RecordingStore {
        fn push_count(&self) -> usize {
            self.pushes.lock().len()
        }

        fn last_push(&self) -> Vec<Condition> {
            self.pushes.lock().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl RemoteStore for RecordingStore {
        async fn get_conditions(
            &self,
            _types: &[ConditionType],
        ) -> Result<Vec<Condition>, StoreError> {
            Ok(self.last_push())
        }

        async fn set_conditions(
            &self,
            conditions: Vec<Condition>,
            timeout: Duration,
        ) -> Result<(), StoreError> {
            self.pushes.lock().push(conditions);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Timeout(timeout));
            }
            Ok(())
        }

        async fn record_event(&self, _source: &str, _event: &Event) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn setup() -> (ConditionManager, Arc<RecordingStore>, Arc<MetricsRegistry>) {
        let store = Arc::new(RecordingStore::default());
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let manager = ConditionManager::new(
            store.clone() as Arc<dyn RemoteStore>,
            metrics.clone(),
            ConditionManagerConfig::default(),
        );
        (manager, store, metrics)
    }

    fn condition(condition_type: &str, status: ConditionStatus, message: &str) -> Condition {
        Condition::new(condition_type, status, "TestReason", message)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test]
    async fn test_first_tick_pushes_then_idle_ticks_do_not() {
        let (manager, store, _) = setup();
        let t0 = Instant::now();

        assert_eq!(manager.sync_at(t0).await, SyncOutcome::Pushed);
        for i in 1..60 {
            assert_eq!(manager.sync_at(t0 + secs(i)).await, SyncOutcome::Skipped);
        }
        assert_eq!(store.push_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_condition_pushes_on_next_tick() {
        let (manager, store, _) = setup();
        let t0 = Instant::now();
        manager.sync_at(t0).await;

        manager.update_condition(condition("KernelDeadlock", ConditionStatus::True, "hung"));

        assert_eq!(manager.sync_at(t0 + secs(1)).await, SyncOutcome::Pushed);
        assert_eq!(store.push_count(), 2);
        let pushed = store.last_push();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].condition_type, "KernelDeadlock");
        assert_eq!(pushed[0].status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn test_identical_condition_is_not_dirty() {
        let (manager, store, _) = setup();
        let t0 = Instant::now();
        let deadlock = condition("KernelDeadlock", ConditionStatus::True, "hung");

        manager.update_condition(deadlock.clone());
        manager.sync_at(t0).await;
        manager.update_condition(deadlock);

        assert_eq!(manager.sync_at(t0 + secs(1)).await, SyncOutcome::Skipped);
        assert_eq!(store.push_count(), 1);
    }

    #[tokio::test]
    async fn test_updates_between_ticks_coalesce() {
        let (manager, store, _) = setup();
        let t0 = Instant::now();
        manager.sync_at(t0).await;

        for i in 0..5 {
            manager.update_condition(condition(
                "ReadonlyFilesystem",
                ConditionStatus::True,
                &format!("attempt {}", i),
            ));
        }

        manager.sync_at(t0 + secs(1)).await;
        manager.sync_at(t0 + secs(2)).await;

        assert_eq!(store.push_count(), 2);
        let pushed = store.last_push();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].message, "attempt 4");
    }

    #[tokio::test]
    async fn test_failed_push_waits_for_resync_period() {
        let (manager, store, metrics) = setup();
        let t0 = Instant::now();
        store.failing.store(true, Ordering::SeqCst);

        let pending = condition("KernelDeadlock", ConditionStatus::True, "hung");
        manager.update_condition(pending.clone());
        assert_eq!(manager.sync_at(t0).await, SyncOutcome::Failed);

        for i in 1..10 {
            manager.update_condition(pending.clone());
            assert_eq!(manager.sync_at(t0 + secs(i)).await, SyncOutcome::Skipped);
        }
        assert_eq!(store.push_count(), 1);

        store.failing.store(false, Ordering::SeqCst);
        assert_eq!(manager.sync_at(t0 + secs(10)).await, SyncOutcome::Pushed);
        assert_eq!(store.push_count(), 2);
        assert_eq!(store.last_push(), vec![pending]);

        assert_eq!(metrics.sync_attempts(), 2);
        assert_eq!(metrics.sync_failures(), 1);
    }

    #[tokio::test]
    async fn test_new_change_after_failure_pushes_on_next_tick() {
        let (manager, store, _) = setup();
        let t0 = Instant::now();
        store.failing.store(true, Ordering::SeqCst);
        manager.update_condition(condition("A", ConditionStatus::True, "first"));
        assert_eq!(manager.sync_at(t0).await, SyncOutcome::Failed);
        store.failing.store(false, Ordering::SeqCst);

        manager.update_condition(condition("KernelDeadlock", ConditionStatus::True, "hung"));

        assert_eq!(manager.sync_at(t0 + secs(1)).await, SyncOutcome::Pushed);
        let types: Vec<String> = store
            .last_push()
            .into_iter()
            .map(|c| c.condition_type)
            .collect();
        assert_eq!(types, vec!["A".to_string(), "KernelDeadlock".to_string()]);
        assert_eq!(manager.sync_at(t0 + secs(10)).await, SyncOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_repeated_failures_retry_at_resync_rate() {
        let (manager, store, _) = setup();
        let t0 = Instant::now();
        store.failing.store(true, Ordering::SeqCst);

        for i in 0..=30 {
            manager.sync_at(t0 + secs(i)).await;
        }

        // t0, t0+10, t0+20, t0+30
        assert_eq!(store.push_count(), 4);
    }

    #[tokio::test]
    async fn test_heartbeat_pushes_without_changes() {
        let (manager, store, _) = setup();
        let t0 = Instant::now();
        manager.update_condition(condition("A", ConditionStatus::False, "ok"));

        for i in 0..=180 {
            manager.sync_at(t0 + secs(i)).await;
        }

        // t0, t0+60, t0+120, t0+180
        assert_eq!(store.push_count(), 4);
        assert_eq!(store.last_push().len(), 1);
    }

    #[tokio::test]
    async fn test_false_condition_stays_local_and_is_pushed() {
        let (manager, store, _) = setup();
        let t0 = Instant::now();
        manager.update_condition(condition("A", ConditionStatus::True, "bad"));
        manager.sync_at(t0).await;

        manager.update_condition(condition("A", ConditionStatus::False, "recovered"));
        manager.sync_at(t0 + secs(1)).await;

        let local = manager.get_conditions();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].status, ConditionStatus::False);
        assert_eq!(store.last_push()[0].status, ConditionStatus::False);
    }

    #[tokio::test]
    async fn test_get_conditions_excludes_pending_updates() {
        let (manager, _, _) = setup();
        manager.update_condition(condition("B", ConditionStatus::True, ""));

        assert!(manager.get_conditions().is_empty());

        manager.update_condition(condition("A", ConditionStatus::Unknown, ""));
        manager.sync_at(Instant::now()).await;

        let types: Vec<String> = manager
            .get_conditions()
            .into_iter()
            .map(|c| c.condition_type)
            .collect();
        assert_eq!(types, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let (manager, store, _) = setup();
        let manager = Arc::new(manager);

        let producers: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    for j in 0..50 {
                        manager.update_condition(condition(
                            &format!("Type{}", i),
                            ConditionStatus::True,
                            &format!("{}", j),
                        ));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        manager.sync_at(Instant::now()).await;

        let pushed = store.last_push();
        assert_eq!(pushed.len(), 8);
        assert!(pushed.iter().all(|c| c.message == "49"));
    }

    #[tokio::test]
    async fn test_start_stops_on_cancel() {
        let store = Arc::new(RecordingStore::default());
        let manager = Arc::new(ConditionManager::new(
            store.clone() as Arc<dyn RemoteStore>,
            Arc::new(MetricsRegistry::new().unwrap()),
            ConditionManagerConfig {
                tick_period: Duration::from_millis(10),
                ..ConditionManagerConfig::default()
            },
        ));
        let shutdown = CancellationToken::new();

        let handle = manager.start(shutdown.clone());
        manager.update_condition(condition("A", ConditionStatus::True, ""));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(store.push_count() >= 1);
        assert!(store
            .pushes
            .lock()
            .iter()
            .any(|push| push.iter().any(|c| c.condition_type == "A")));
    }
}
