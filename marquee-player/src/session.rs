//! Session-lifetime playback state shared across players.
//!
//! Injected rather than ambient so tests can construct isolated instances;
//! one instance normally lives as long as the process.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Flags that outlive any single player.
#[derive(Debug, Default)]
pub struct SessionFlags {
    /// The user unmuted a trailer at least once; later players start with
    /// sound. Autoplay-with-sound is routinely blocked before that point.
    unmuted_once: AtomicBool,
    /// Countdowns started this session; the first one uses the shorter
    /// promote delay.
    countdowns_started: AtomicU32,
}

impl SessionFlags {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unmuted_once(&self) -> bool {
        self.unmuted_once.load(Ordering::Relaxed)
    }

    pub fn mark_unmuted(&self) {
        self.unmuted_once.store(true, Ordering::Relaxed);
    }

    /// Record a countdown start; returns whether it was the session's first.
    pub fn countdown_started(&self) -> bool {
        self.countdowns_started.fetch_add(1, Ordering::Relaxed) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmute_is_remembered() {
        let flags = SessionFlags::default();
        assert!(!flags.unmuted_once());
        flags.mark_unmuted();
        assert!(flags.unmuted_once());
    }

    #[test]
    fn only_the_first_countdown_is_first() {
        let flags = SessionFlags::default();
        assert!(flags.countdown_started());
        assert!(!flags.countdown_started());
        assert!(!flags.countdown_started());
    }
}
