use bufpool::{ExtendibleHashTable, HashTable, LruReplacer, Replacer};

type PageId = u64;
type FrameId = usize;

/// Drives the page table and the victim picker the way a buffer pool
/// does: fetching a page pins its frame (and withdraws it from the
/// replacer), unpinning makes the frame evictable again, and a fetch
/// with no free frame victimizes the least recently unpinned one.
struct MiniPool {
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruReplacer<FrameId>,
    frames: Vec<Option<PageId>>,
    free: Vec<FrameId>,
}

impl MiniPool {
    fn new(pool_size: usize) -> Self {
        Self {
            page_table: ExtendibleHashTable::new(4),
            replacer: LruReplacer::new(),
            frames: vec![None; pool_size],
            free: (0..pool_size).collect(),
        }
    }

    /// Returns the frame now holding `page_id`, pinned, or `None` when
    /// every frame is pinned.
    fn fetch(&mut self, page_id: PageId) -> Option<FrameId> {
        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.replacer.erase(&frame_id);
            return Some(frame_id);
        }

        let frame_id = match self.free.pop() {
            Some(frame_id) => frame_id,
            None => {
                let victim = self.replacer.victim()?;
                let evicted = self.frames[victim].take().unwrap();
                assert!(self.page_table.remove(&evicted));
                victim
            }
        };

        self.frames[frame_id] = Some(page_id);
        self.page_table.insert(page_id, frame_id);
        Some(frame_id)
    }

    fn unpin(&mut self, frame_id: FrameId) {
        self.replacer.insert(frame_id);
    }
}

#[test]
fn test_scan_larger_than_pool_evicts_in_lru_order() {
    let mut pool = MiniPool::new(4);

    let mut frames = Vec::new();
    for page_id in 0..4 {
        let frame_id = pool.fetch(page_id).unwrap();
        pool.unpin(frame_id);
        frames.push(frame_id);
    }
    assert_eq!(pool.page_table.len(), 4);
    assert_eq!(pool.replacer.size(), 4);

    // The next fetches must recycle frames in unpin order.
    for (i, page_id) in (4..8).enumerate() {
        let frame_id = pool.fetch(page_id).unwrap();
        assert_eq!(frame_id, frames[i]);
        assert_eq!(pool.page_table.find(&(i as PageId)), None);
        pool.unpin(frame_id);
    }

    assert_eq!(pool.page_table.len(), 4);
    for page_id in 4..8 {
        assert!(pool.page_table.find(&page_id).is_some());
    }
    pool.page_table.verify_integrity();
}

#[test]
fn test_pinned_frames_are_never_victimized() {
    let mut pool = MiniPool::new(3);

    let pinned = pool.fetch(100).unwrap();
    let evictable_a = pool.fetch(101).unwrap();
    let evictable_b = pool.fetch(102).unwrap();
    pool.unpin(evictable_a);
    pool.unpin(evictable_b);

    // Two more fetches recycle the two evictable frames.
    assert_eq!(pool.fetch(103), Some(evictable_a));
    assert_eq!(pool.fetch(104), Some(evictable_b));

    // Everything is pinned now, so nothing can be fetched.
    assert_eq!(pool.fetch(105), None);

    assert_eq!(pool.page_table.find(&100), Some(pinned));
    assert_eq!(pool.page_table.find(&101), None);
    assert_eq!(pool.page_table.find(&102), None);
}

#[test]
fn test_repinning_refreshes_recency() {
    let mut pool = MiniPool::new(3);

    let frame_a = pool.fetch(1).unwrap();
    let frame_b = pool.fetch(2).unwrap();
    let frame_c = pool.fetch(3).unwrap();
    pool.unpin(frame_a);
    pool.unpin(frame_b);
    pool.unpin(frame_c);

    // Touching page 1 makes its frame the most recently used.
    assert_eq!(pool.fetch(1), Some(frame_a));
    pool.unpin(frame_a);

    assert_eq!(pool.fetch(4), Some(frame_b));
    assert_eq!(pool.fetch(5), Some(frame_c));
    assert_eq!(pool.fetch(6), Some(frame_a));
}

#[test]
fn test_collaborators_through_trait_objects() {
    let table = ExtendibleHashTable::<PageId, FrameId>::new(2);
    let replacer = LruReplacer::<FrameId>::new();

    let page_table: &dyn HashTable<PageId, FrameId> = &table;
    let picker: &dyn Replacer<FrameId> = &replacer;

    for page_id in 0..32 {
        page_table.insert(page_id, page_id as FrameId);
        picker.insert(page_id as FrameId);
    }
    assert_eq!(page_table.len(), 32);
    assert_eq!(picker.size(), 32);

    assert!(page_table.remove(&7));
    assert!(picker.erase(&7));
    assert_eq!(page_table.len(), 31);
    assert_eq!(picker.size(), 31);
    assert_eq!(picker.victim(), Some(0));
}
