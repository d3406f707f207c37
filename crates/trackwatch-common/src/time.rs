//! ---
//! tw_section: "01-core-functionality"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Shared primitives and utilities for the core runtime."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Generator for alert identifiers.
///
/// Identifiers are millisecond timestamps bumped past the previously issued
/// value, so they stay strictly increasing even when several alerts are
/// created within the same millisecond or the wall clock steps backwards.
#[derive(Debug, Default)]
pub struct AlertIdGenerator {
    last: AtomicI64,
}

impl AlertIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the floor so freshly issued identifiers never collide with
    /// records loaded from an earlier process lifetime.
    pub fn observe(&self, id: i64) {
        self.last.fetch_max(id, Ordering::SeqCst);
    }

    /// Issue the next unique identifier.
    pub fn next_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange(
                prev,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_strictly_increasing() {
        let generator = AlertIdGenerator::new();
        let mut previous = generator.next_id();
        for _ in 0..1000 {
            let next = generator.next_id();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn observe_raises_the_floor() {
        let generator = AlertIdGenerator::new();
        let far_future = Utc::now().timestamp_millis() + 1_000_000;
        generator.observe(far_future);
        assert!(generator.next_id() > far_future);
    }
}
