use std::sync::Mutex;

/// Serializes the handful of structural steps that touch two adjacent
/// leaves at once — splicing a new leaf into the sibling list, unlinking
/// a deleted one — so two concurrent splits can't deadlock each other
/// waiting on one another's leaf latch.
///
/// The source gives every leaf its own `waiting`/`on` marker plus a
/// condition variable (`LeafLock.LockSibling`/`UnlockSibling` in
/// `bTreeItem.go`) so only genuinely conflicting pairs ever block each
/// other. This tree coarsens that to one mutex per tree: splices are
/// already rare relative to searches and single-leaf inserts, so the
/// extra serialization is cheap, and it sidesteps needing a page-id
/// keyed table of per-leaf condvars that would outlive their frames
/// across eviction. See DESIGN.md.
#[derive(Default)]
pub struct SiblingCoordinator(Mutex<()>);

impl SiblingCoordinator {
    pub fn new() -> Self {
        Self(Mutex::new(()))
    }

    pub fn splice<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.0.lock().expect("sibling coordinator poisoned");
        f()
    }
}
