// ── Listener registry ──
//
// Callbacks keyed by stream kind. Built once on the `PanelBuilder` and
// frozen afterwards; fan-out runs synchronously in registration order.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::model::{StreamKind, StreamUpdate};

/// Error type listeners may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A stream listener.
pub type Listener = Arc<dyn Fn(&StreamUpdate) -> Result<(), BoxError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ListenerRegistry {
    by_kind: HashMap<StreamKind, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: StreamKind, listener: F)
    where
        F: Fn(&StreamUpdate) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.by_kind.entry(kind).or_default().push(Arc::new(listener));
    }

    pub fn count(&self, kind: StreamKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `update` to every listener of every kind it belongs to.
    /// A failing or panicking listener is logged and skipped.
    pub fn notify(&self, update: &StreamUpdate) {
        for kind in update.kinds() {
            let Some(listeners) = self.by_kind.get(kind) else {
                continue;
            };
            for (index, listener) in listeners.iter().enumerate() {
                match catch_unwind(AssertUnwindSafe(|| listener(update))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(stream = %kind, index, error = %e, "listener failed");
                    }
                    Err(_) => {
                        tracing::error!(stream = %kind, index, "listener panicked");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .by_kind
            .iter()
            .map(|(k, v)| (k.to_string(), v.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fan_out_survives_failures_and_keeps_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();

        let log = Arc::clone(&seen);
        registry.register(StreamKind::Zones, move |_| {
            log.lock().unwrap().push("first");
            Err("boom".into())
        });
        registry.register(StreamKind::Zones, |_| panic!("listener bug"));
        let log = Arc::clone(&seen);
        registry.register(StreamKind::Zones, move |_| {
            log.lock().unwrap().push("third");
            Ok(())
        });

        registry.notify(&StreamUpdate::Zones(Vec::new()));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "third"]);
    }

    #[test]
    fn outputs_reach_lights_switches_and_covers() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        for kind in [StreamKind::Lights, StreamKind::Switches, StreamKind::Covers, StreamKind::Zones] {
            let hits = Arc::clone(&hits);
            registry.register(kind, move |_| {
                hits.lock().unwrap().push(kind);
                Ok(())
            });
        }

        registry.notify(&StreamUpdate::Outputs(Vec::new()));
        assert_eq!(
            *hits.lock().unwrap(),
            vec![StreamKind::Lights, StreamKind::Switches, StreamKind::Covers]
        );
    }
}
