use crate::frame::Frame;
use common::{DbResult, CACHE_MIN, CACHE_SIZE, MAX_DELETE, SWEEP_INTERVAL};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use storage::{Page, PageStore};
use tracing::debug;

/// Page-id-keyed resident cache with used-counter sweep eviction.
///
/// The recency list is newest-at-front; `Get` moves a hit to the front
/// under the same exclusive lock used for eviction, sidestepping the
/// source's known `RLock`-during-splice data race (see DESIGN.md).
pub struct BufferCache {
    store: Arc<PageStore>,
    inner: RwLock<Inner>,
    hits: AtomicU64,
    capacity: usize,
    floor: usize,
}

struct Inner {
    frames: HashMap<u64, Arc<Frame>>,
    order: VecDeque<u64>,
}

impl BufferCache {
    pub fn new(store: Arc<PageStore>, capacity: usize, floor: usize) -> Self {
        Self {
            store,
            inner: RwLock::new(Inner {
                frames: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            capacity,
            floor,
        }
    }

    pub fn with_defaults(store: Arc<PageStore>) -> Self {
        Self::new(store, CACHE_SIZE, CACHE_MIN)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the resident frame for `id`, fetching it from the page
    /// store on a miss.
    pub fn fetch(&self, id: u64) -> DbResult<Arc<Frame>> {
        {
            let mut inner = self.inner.write().unwrap();
            if let Some(frame) = inner.frames.get(&id).cloned() {
                frame.bump_used();
                inner.order.retain(|&x| x != id);
                inner.order.push_front(id);
                let hits = self.hits.fetch_add(1, Ordering::AcqRel) + 1;
                if hits >= SWEEP_INTERVAL {
                    self.hits.store(0, Ordering::Release);
                    self.run_sweep(&mut inner);
                }
                return Ok(frame);
            }
        }

        let page = self.store.read_page(id)?;
        self.insert(page)
    }

    /// Installs a freshly-allocated or freshly-read page as the newest
    /// entry, running eviction if the cache is now at or over capacity.
    pub fn insert(&self, page: Page) -> DbResult<Arc<Frame>> {
        let id = page.id();
        let frame = Arc::new(Frame::new(page));
        let mut inner = self.inner.write().unwrap();
        inner.frames.insert(id, Arc::clone(&frame));
        inner.order.push_front(id);

        if inner.frames.len() >= self.capacity {
            self.handle_full_cache(&mut inner)?;
        } else {
            let hits = self.hits.fetch_add(1, Ordering::AcqRel) + 1;
            if hits >= SWEEP_INTERVAL {
                self.hits.store(0, Ordering::Release);
                self.run_sweep(&mut inner);
            }
        }
        Ok(frame)
    }

    /// Traverses newest to oldest, decrementing each entry's used counter.
    /// Unpinned entries whose counter reaches zero are evicted; pinned
    /// entries are revived instead.
    fn run_sweep(&self, inner: &mut Inner) {
        let ids: Vec<u64> = inner.order.iter().copied().collect();
        for id in ids {
            let Some(frame) = inner.frames.get(&id).cloned() else {
                continue;
            };
            if frame.in_use() {
                frame.bump_used();
                continue;
            }
            let mut remaining = 0u8;
            let _ = frame
                .used
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |u| {
                    remaining = u.saturating_sub(1);
                    Some(remaining)
                });
            if remaining == 0 {
                self.evict_one(inner, id);
            }
        }
        debug!(resident = inner.frames.len(), "ran cache sweep");
    }

    /// Traverses oldest to newest, evicting up to `MAX_DELETE` unpinned
    /// entries until the cache drops back to the floor.
    fn handle_full_cache(&self, inner: &mut Inner) -> DbResult<()> {
        let ids: Vec<u64> = inner.order.iter().rev().copied().collect();
        let mut deleted = 0;
        for id in ids {
            if deleted >= MAX_DELETE || inner.frames.len() <= self.floor {
                break;
            }
            let Some(frame) = inner.frames.get(&id).cloned() else {
                continue;
            };
            if frame.in_use() {
                continue;
            }
            self.evict_one(inner, id);
            deleted += 1;
        }
        debug!(deleted, resident = inner.frames.len(), "handled full cache");
        Ok(())
    }

    fn evict_one(&self, inner: &mut Inner, id: u64) {
        let Some(frame) = inner.frames.remove(&id) else {
            return;
        };
        inner.order.retain(|&x| x != id);
        if frame.is_dirty() {
            if let Err(err) = self.store.write_page(&frame.snapshot()) {
                tracing::warn!(page = id, %err, "failed to flush dirty page on eviction");
            }
        }
    }

    /// Flushes every dirty resident frame without evicting it.
    pub fn flush_all(&self) -> DbResult<()> {
        let inner = self.inner.read().unwrap();
        for frame in inner.frames.values() {
            if frame.is_dirty() {
                self.store.write_page(&frame.snapshot())?;
                frame.clear_dirty();
            }
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }
}
