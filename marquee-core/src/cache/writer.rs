//! Debounced write-behind for the slow persistent tier.
//!
//! The session store is advisory, so intermediate values may be discarded:
//! only the most recent value per key ever reaches it. `flush` exists so a
//! teardown never loses the final value to a still-pending timer.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::trace;

use super::SessionStore;

#[derive(Debug)]
struct Pending {
    value: String,
    generation: u64,
}

/// Coalesces bursty writes so each key hits the store at most once per
/// debounce window, with the last scheduled value.
pub struct DebouncedWriter {
    store: Arc<dyn SessionStore>,
    delay: Duration,
    pending: Arc<DashMap<String, Pending>>,
}

impl std::fmt::Debug for DebouncedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedWriter")
            .field("delay", &self.delay)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl DebouncedWriter {
    pub fn new(store: Arc<dyn SessionStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Replace any pending value for `key` and restart its timer.
    pub fn schedule(&self, key: &str, value: String) {
        let generation = {
            let mut entry = self.pending.entry(key.to_string()).or_insert(Pending {
                value: String::new(),
                generation: 0,
            });
            entry.generation += 1;
            entry.value = value;
            entry.generation
        };

        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        let key = key.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A newer schedule or a flush owns this key now.
            let value = match pending.get(&key) {
                Some(p) if p.generation == generation => p.value.clone(),
                _ => return,
            };
            pending.remove_if(&key, |_, p| p.generation == generation);
            trace!(target: "trailer::cache", %key, "debounced write");
            store.set(&key, &value);
        });
    }

    /// Write any pending value for `key` immediately.
    pub fn flush(&self, key: &str) {
        if let Some((key, pending)) = self.pending.remove(key) {
            self.store.set(&key, &pending.value);
        }
    }

    /// Write every pending value immediately. Called at teardown.
    pub fn flush_all(&self) {
        let keys: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.flush(&key);
        }
    }
}
