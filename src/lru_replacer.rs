use std::collections::HashMap;
use std::hash::Hash;

use log::trace;
use parking_lot::Mutex;

use crate::replacer::Replacer;

/// Link value marking the end of the list.
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: usize,
    next: usize,
}

/// Recency list plus value index. Nodes live in an arena and links are
/// arena slots, so the back-links are plain indices rather than second
/// owners; freed slots are recycled through a free list.
#[derive(Debug)]
struct LruList<T> {
    index: HashMap<T, usize>,
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl<T> LruList<T>
where
    T: Hash + Eq + Clone,
{
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    fn insert(&mut self, value: T) {
        if let Some(&slot) = self.index.get(&value) {
            if slot != self.tail {
                self.unlink(slot);
                self.push_back(slot);
            }
            return;
        }
        let slot = self.alloc(value.clone());
        self.push_back(slot);
        self.index.insert(value, slot);
    }

    fn victim(&mut self) -> Option<T> {
        if self.head == NIL {
            return None;
        }
        let slot = self.head;
        let value = self.nodes[slot].value.clone();
        self.unlink(slot);
        self.free.push(slot);
        self.index.remove(&value);
        trace!("evicted lru head, {} values remain", self.index.len());
        Some(value)
    }

    fn erase(&mut self, value: &T) -> bool {
        match self.index.remove(value) {
            Some(slot) => {
                self.unlink(slot);
                self.free.push(slot);
                true
            }
            None => false,
        }
    }

    fn alloc(&mut self, value: T) -> usize {
        let node = Node {
            value,
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
    }

    fn push_back(&mut self, slot: usize) {
        self.nodes[slot].prev = self.tail;
        self.nodes[slot].next = NIL;
        if self.tail == NIL {
            self.head = slot;
        } else {
            self.nodes[self.tail].next = slot;
        }
        self.tail = slot;
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let mut count = 0;
        let mut prev = NIL;
        let mut slot = self.head;
        while slot != NIL {
            assert_eq!(self.nodes[slot].prev, prev, "back link out of sync");
            assert_eq!(
                self.index.get(&self.nodes[slot].value),
                Some(&slot),
                "index out of sync with list"
            );
            prev = slot;
            slot = self.nodes[slot].next;
            count += 1;
            assert!(count <= self.index.len(), "cycle in recency list");
        }
        assert_eq!(prev, self.tail, "tail out of sync");
        assert_eq!(count, self.index.len(), "node count differs from index");
    }
}

/// Least-recently-used replacer.
///
/// Values are kept in insertion order; re-inserting a tracked value is
/// the touch operation and moves it to the most-recently-used end.
/// `victim` pops the other end. Every operation is O(1) and runs under
/// the structure's single mutex.
#[derive(Debug)]
pub struct LruReplacer<T> {
    inner: Mutex<LruList<T>>,
}

impl<T> LruReplacer<T>
where
    T: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruList::new()),
        }
    }

    /// Track `value`, or move it to the most-recently-used end if it is
    /// already tracked.
    pub fn insert(&self, value: T) {
        self.inner.lock().insert(value);
    }

    /// Remove and return the least recently inserted value. Returns
    /// `None` when nothing is tracked.
    pub fn victim(&self) -> Option<T> {
        self.inner.lock().victim()
    }

    /// Stop tracking `value`; reports whether a removal occurred.
    pub fn erase(&self, value: &T) -> bool {
        self.inner.lock().erase(value)
    }

    /// Number of tracked values.
    pub fn size(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<T> Default for LruReplacer<T>
where
    T: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Replacer<T> for LruReplacer<T>
where
    T: Hash + Eq + Clone + Send,
{
    fn insert(&self, value: T) {
        LruReplacer::insert(self, value);
    }

    fn victim(&self) -> Option<T> {
        LruReplacer::victim(self)
    }

    fn erase(&self, value: &T) -> bool {
        LruReplacer::erase(self, value)
    }

    fn size(&self) -> usize {
        LruReplacer::size(self)
    }
}
