use std::collections::BTreeMap;

/// Releases items in index order regardless of arrival order.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self { next: 0, pending: BTreeMap::new() }
    }

    /// Accept item `index` and return every item now releasable, in order.
    /// An index that was already released or is already held is ignored.
    pub fn push(&mut self, index: usize, item: T) -> Vec<T> {
        if index < self.next || self.pending.contains_key(&index) {
            return Vec::new();
        }
        self.pending.insert(index, item);
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push(item);
            self.next += 1;
        }
        ready
    }

    /// Items released so far.
    pub fn released(&self) -> usize {
        self.next
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
