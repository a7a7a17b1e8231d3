//! Declarative rule id allocation
//!
//! Ids are derived from rule text, so the same list always compiles to the
//! same ids. One allocator is shared by every unit of a run; its used-id set
//! sits behind a lock and check-then-insert happens under a single guard.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use dnr_core::hash::hash_text;
use dnr_core::{MAX_RULE_ID, MIN_RULE_ID};

#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    used: Arc<Mutex<HashSet<u32>>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a unique id for `text`.
    ///
    /// On collision (or a reserved value) the text is salted with `1`, `2`, ...
    /// and rehashed until a free id turns up.
    pub fn allocate(&self, text: &str) -> u32 {
        let mut used = self.used.lock();

        let mut id = text_id(text);
        let mut salt = 0u32;
        while id < MIN_RULE_ID || used.contains(&id) {
            salt += 1;
            id = text_id(&format!("{text}{salt}"));
        }

        used.insert(id);
        id
    }

    /// Mark an id taken, e.g. by a unit compiled in an earlier build.
    /// Returns `false` if it was already taken.
    pub fn reserve(&self, id: u32) -> bool {
        self.used.lock().insert(id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.used.lock().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.used.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.lock().is_empty()
    }
}

#[inline]
fn text_id(text: &str) -> u32 {
    hash_text(text) & MAX_RULE_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_id_across_allocators() {
        let a = IdAllocator::new().allocate("||ads.example^");
        let b = IdAllocator::new().allocate("||ads.example^");
        assert_eq!(a, b);
        assert!((MIN_RULE_ID..=MAX_RULE_ID).contains(&a));
    }

    #[test]
    fn duplicate_text_is_salted() {
        let ids = IdAllocator::new();
        let first = ids.allocate("||ads.example^");
        let second = ids.allocate("||ads.example^");
        assert_ne!(first, second);
        assert_eq!(second, text_id("||ads.example^1"));
    }

    #[test]
    fn salt_keeps_increasing_past_taken_suffixes() {
        let ids = IdAllocator::new();
        let plain = ids.allocate("||ads.example^");
        let suffixed = ids.allocate("||ads.example^1");
        let duplicate = ids.allocate("||ads.example^");

        assert_eq!(suffixed, text_id("||ads.example^1"));
        assert_eq!(duplicate, text_id("||ads.example^2"));
        assert_ne!(plain, suffixed);
        assert_ne!(suffixed, duplicate);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn reserved_ids_are_skipped() {
        let ids = IdAllocator::new();
        let natural = text_id("||tracker.example^");
        assert!(ids.reserve(natural));
        assert!(!ids.reserve(natural));

        let allocated = ids.allocate("||tracker.example^");
        assert_ne!(allocated, natural);
        assert!(ids.contains(allocated));
    }

    #[test]
    fn clones_share_the_used_set() {
        let ids = IdAllocator::new();
        let clone = ids.clone();
        let a = ids.allocate("||a.example^");
        assert!(clone.contains(a));
        assert_ne!(clone.allocate("||a.example^"), a);
    }
}
