//! Abandoned tags
//!
//! Tags whose remaining replies must be skipped: requests that timed out,
//! trapped or were cancelled. An entry is cleared by the `!done` that ends
//! the old request. RouterOS follows every `!trap` with such a `!done`; a
//! peer that does not would leave entries behind, so the set is capped and
//! the oldest entry is evicted first.

use std::collections::{HashSet, VecDeque};

use crate::protocol::Tag;

/// Default number of abandoned tags remembered per connection
pub const MAX_ABANDONED_TAGS: usize = 1024;

#[derive(Debug)]
pub(crate) struct AbandonedTags {
    tags: HashSet<Tag>,

    /// Insertion order, oldest first
    order: VecDeque<Tag>,

    capacity: usize,
}

impl Default for AbandonedTags {
    fn default() -> Self {
        Self::with_capacity(MAX_ABANDONED_TAGS)
    }
}

impl AbandonedTags {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            tags: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn insert(&mut self, tag: Tag) {
        if !self.tags.insert(tag) {
            return;
        }
        self.order.push_back(tag);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.tags.remove(&oldest);
                tracing::debug!("Forgetting abandoned tag {}; no !done seen for it", oldest);
            }
        }
    }

    pub(crate) fn contains(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    pub(crate) fn remove(&mut self, tag: Tag) -> bool {
        if !self.tags.remove(&tag) {
            return false;
        }
        if let Some(pos) = self.order.iter().position(|t| *t == tag) {
            self.order.remove(pos);
        }
        true
    }

    pub(crate) fn clear(&mut self) {
        self.tags.clear();
        self.order.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tags.len()
    }
}
