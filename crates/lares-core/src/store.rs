// ── Session state cache ──
//
// The static configuration and the cumulative realtime snapshot, each
// published through a `watch` channel so accessors can wait for the
// bootstrap and observers can follow changes. Snapshots are `Arc`ed:
// readers clone the pointer, writers copy-on-write.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::model::{RealtimeSnapshot, StaticConfig};

pub struct PanelStore {
    static_config: watch::Sender<Option<Arc<StaticConfig>>>,
    realtime: watch::Sender<Option<Arc<RealtimeSnapshot>>>,
    version: ArcSwapOption<Map<String, Value>>,
}

impl PanelStore {
    pub fn new() -> Self {
        let (static_config, _) = watch::channel(None);
        let (realtime, _) = watch::channel(None);
        Self {
            static_config,
            realtime,
            version: ArcSwapOption::empty(),
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn static_config(&self) -> Option<Arc<StaticConfig>> {
        self.static_config.borrow().clone()
    }

    pub fn realtime(&self) -> Option<Arc<RealtimeSnapshot>> {
        self.realtime.borrow().clone()
    }

    /// `SYSTEM_VERSION` payload of the current session.
    pub fn version(&self) -> Option<Arc<Map<String, Value>>> {
        self.version.load_full()
    }

    pub fn subscribe_static(&self) -> watch::Receiver<Option<Arc<StaticConfig>>> {
        self.static_config.subscribe()
    }

    pub fn subscribe_realtime(&self) -> watch::Receiver<Option<Arc<RealtimeSnapshot>>> {
        self.realtime.subscribe()
    }

    // ── Mutation ─────────────────────────────────────────────────────

    pub(crate) fn set_static(&self, config: StaticConfig) {
        self.static_config.send_replace(Some(Arc::new(config)));
    }

    pub(crate) fn set_realtime(&self, snapshot: RealtimeSnapshot) {
        self.realtime.send_replace(Some(Arc::new(snapshot)));
    }

    pub(crate) fn set_version(&self, version: Map<String, Value>) {
        self.version.store(Some(Arc::new(version)));
    }

    /// Modify the static configuration in place, creating an empty one
    /// if the bootstrap has not delivered it yet.
    pub(crate) fn update_static(&self, f: impl FnOnce(&mut StaticConfig)) {
        self.static_config.send_modify(|slot| {
            f(Arc::make_mut(slot.get_or_insert_with(Default::default)));
        });
    }

    pub(crate) fn update_realtime(&self, f: impl FnOnce(&mut RealtimeSnapshot)) {
        self.realtime.send_modify(|slot| {
            f(Arc::make_mut(slot.get_or_insert_with(Default::default)));
        });
    }

    // ── Readiness ────────────────────────────────────────────────────

    pub fn is_ready(&self) -> bool {
        self.static_config.borrow().is_some() && self.realtime.borrow().is_some()
    }

    /// Wait until both bootstrap snapshots are present. `false` on timeout.
    pub async fn wait_ready(&self, limit: Duration) -> bool {
        let mut static_rx = self.static_config.subscribe();
        let mut realtime_rx = self.realtime.subscribe();
        let ready = async {
            let _ = static_rx.wait_for(Option::is_some).await;
            let _ = realtime_rx.wait_for(Option::is_some).await;
        };
        tokio::time::timeout(limit, ready).await.is_ok()
    }
}

impl Default for PanelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wait_ready_times_out_without_data() {
        let store = PanelStore::new();
        assert!(!store.wait_ready(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn wait_ready_wakes_on_bootstrap() {
        let store = Arc::new(PanelStore::new());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.wait_ready(Duration::from_secs(5)).await })
        };
        store.set_static(StaticConfig::default());
        store.set_realtime(RealtimeSnapshot::default());
        assert!(waiter.await.unwrap());
        assert!(store.is_ready());
    }

    #[test]
    fn update_static_is_copy_on_write() {
        let store = PanelStore::new();
        store.set_static(StaticConfig::default());
        let before = store.static_config().unwrap();

        store.update_static(|cfg| cfg.zones.push(crate::model::ZoneConfig::default()));

        assert!(before.zones.is_empty());
        assert_eq!(store.static_config().unwrap().zones.len(), 1);
    }
}
