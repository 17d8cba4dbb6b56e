//! Per-position attempt cooldown.

use alloy::primitives::{Address, B256};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Suppresses repeated attempts on the same `(market, user)` within a window.
#[derive(Debug)]
pub struct CooldownTable {
    window: Duration,
    last_attempt: DashMap<(B256, Address), Instant>,
}

impl CooldownTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_attempt: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an attempt unless one happened within the window.
    ///
    /// Returns `false` if the key is still cooling down.
    pub fn try_acquire(&self, key: (B256, Address)) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: (B256, Address), now: Instant) -> bool {
        match self.last_attempt.entry(key) {
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) < self.window {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    pub fn is_cooling_down(&self, key: &(B256, Address)) -> bool {
        self.last_attempt
            .get(key)
            .is_some_and(|at| at.elapsed() < self.window)
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let window = self.window;
        self.last_attempt.retain(|_, at| at.elapsed() < window);
    }

    pub fn len(&self) -> usize {
        self.last_attempt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_attempt.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> (B256, Address) {
        (B256::repeat_byte(byte), Address::repeat_byte(byte))
    }

    #[test]
    fn test_second_attempt_within_window_is_rejected() {
        let table = CooldownTable::new(Duration::from_secs(60));
        assert!(table.try_acquire(key(1)));
        assert!(!table.try_acquire(key(1)));
        assert!(table.is_cooling_down(&key(1)));
        // Other positions are independent.
        assert!(table.try_acquire(key(2)));
    }

    #[test]
    fn test_attempt_allowed_after_window() {
        let table = CooldownTable::new(Duration::from_secs(60));
        let start = Instant::now();
        assert!(table.try_acquire_at(key(1), start));
        assert!(!table.try_acquire_at(key(1), start + Duration::from_secs(59)));
        assert!(table.try_acquire_at(key(1), start + Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_window_never_blocks() {
        let table = CooldownTable::new(Duration::ZERO);
        assert!(table.try_acquire(key(1)));
        assert!(table.try_acquire(key(1)));
        table.purge_expired();
        assert!(table.is_empty());
    }
}
