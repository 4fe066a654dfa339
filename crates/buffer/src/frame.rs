use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use storage::Page;

/// A resident page plus its pin/latch and sweep-eviction bookkeeping.
/// Holding either guard sets the frame `in_use`, which blocks eviction;
/// the executor and B+tree are responsible for dropping every guard on
/// every exit path (Rust's scope-based drop makes that automatic here,
/// unlike the source's manual `Unlock`/`RUnlock` calls).
pub struct Frame {
    pub id: u64,
    page: RwLock<Page>,
    pins: AtomicUsize,
    pub(crate) used: AtomicU8,
    dirty: AtomicBool,
}

impl Frame {
    pub fn new(page: Page) -> Self {
        Self {
            id: page.id(),
            page: RwLock::new(page),
            pins: AtomicUsize::new(0),
            used: AtomicU8::new(5),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn in_use(&self) -> bool {
        self.pins.load(Ordering::Acquire) > 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub fn bump_used(&self) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |u| {
                Some(u.saturating_add(1).min(5))
            });
    }

    /// Acquires the shared latch (`RLock`).
    pub fn rlock(&self) -> FrameReadGuard<'_> {
        self.pins.fetch_add(1, Ordering::AcqRel);
        FrameReadGuard {
            guard: self.page.read().unwrap(),
            pins: &self.pins,
        }
    }

    /// Acquires the exclusive latch (`Lock`).
    pub fn lock(&self) -> FrameWriteGuard<'_> {
        self.pins.fetch_add(1, Ordering::AcqRel);
        FrameWriteGuard {
            guard: self.page.write().unwrap(),
            pins: &self.pins,
            dirty: &self.dirty,
        }
    }

    pub fn snapshot(&self) -> Page {
        self.page.read().unwrap().clone()
    }
}

pub struct FrameReadGuard<'a> {
    guard: RwLockReadGuard<'a, Page>,
    pins: &'a AtomicUsize,
}

impl Deref for FrameReadGuard<'_> {
    type Target = Page;
    fn deref(&self) -> &Page {
        &self.guard
    }
}

impl Drop for FrameReadGuard<'_> {
    fn drop(&mut self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct FrameWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, Page>,
    pins: &'a AtomicUsize,
    dirty: &'a AtomicBool,
}

impl Deref for FrameWriteGuard<'_> {
    type Target = Page;
    fn deref(&self) -> &Page {
        &self.guard
    }
}

impl DerefMut for FrameWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Page {
        self.dirty.store(true, Ordering::Release);
        &mut self.guard
    }
}

impl Drop for FrameWriteGuard<'_> {
    fn drop(&mut self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
    }
}
