//! The B+tree indexing structure backing both user indexes and the
//! free-space map: byte-packed internal/leaf nodes, dirty-tombstone
//! deletion, lazy cleanup, leaf splits with sibling linkage, and
//! latch-coupled top-down traversal.

mod header;
mod internal;
mod leaf;
mod lock;
mod partial;

pub use header::NodeHeader;
pub use internal::InternalNode;
pub use leaf::{LeafNode, DIRTY_FLAG, LIVE_FLAG};
pub use lock::SiblingCoordinator;
pub use partial::{ExactMatch, PartialMatch};

use buffer::{BufferCache, Frame};
use common::{DataType, DbError, DbResult, OpCode, PageId, PageType, NODE_HEADER_LEN, PAGE_SIZE};
use std::sync::Arc;
use storage::Page;
use wal::{Action, Wal};

/// How a tree's root page id is read and updated. The in-tree root
/// changes whenever the root splits or the last leaf collapses; callers
/// (the FSM, the executor's per-index wiring in the engine crate) supply
/// an implementation that persists the new id into the owning meta-page
/// slot (see `engine`'s `MetaRootPointer`).
pub trait RootPointer: Send + Sync {
    fn get(&self) -> DbResult<u64>;
    fn set(&self, new_root: u64) -> DbResult<()>;
}

/// An in-memory-only root pointer, for tests and for trees whose root
/// never needs to survive a restart on its own (it will instead be
/// rediscovered from data already logged elsewhere).
pub struct VolatileRoot(std::sync::atomic::AtomicU64);

impl VolatileRoot {
    pub fn new(root: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(root))
    }
}

impl RootPointer for VolatileRoot {
    fn get(&self) -> DbResult<u64> {
        Ok(self.0.load(std::sync::atomic::Ordering::Acquire))
    }

    fn set(&self, new_root: u64) -> DbResult<()> {
        self.0.store(new_root, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}

/// Builds the on-disk key representation: `key` followed by a live-flag
/// byte. `key.len()` must be `key_size - 1`.
pub fn live_key(key: &[u8], key_size: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(key_size as usize);
    out.extend_from_slice(key);
    out.push(LIVE_FLAG);
    out
}

pub struct Tree<R: RootPointer> {
    cache: Arc<BufferCache>,
    key_size: u16,
    entry_size: u16,
    root: R,
    splice: SiblingCoordinator,
}

impl<R: RootPointer> Tree<R> {
    pub fn new(cache: Arc<BufferCache>, key_size: u16, entry_size: u16, root: R) -> Self {
        Self {
            cache,
            key_size,
            entry_size,
            root,
            splice: SiblingCoordinator::new(),
        }
    }

    pub fn root_id(&self) -> DbResult<u64> {
        self.root.get()
    }

    /// Allocates the first leaf of a brand-new, empty tree and points
    /// the root at it.
    pub fn init_empty(&self) -> DbResult<()> {
        let id = self.cache.store().claim_free_page(PageType::IndexLeaf)?;
        let leaf = LeafNode::empty(id.page, self.key_size, self.entry_size);
        let mut page = Page::new(id.page, PageType::IndexLeaf);
        self.encode_leaf(&leaf, &mut page);
        self.cache.store().write_page(&page)?;
        self.cache.insert(page)?;
        self.root.set(id.page)
    }

    fn decode_leaf(&self, page: &Page) -> DbResult<LeafNode> {
        let header = NodeHeader::decode(&page.body[..NODE_HEADER_LEN])?;
        LeafNode::decode(&page.body[NODE_HEADER_LEN..], header)
    }

    fn encode_leaf(&self, leaf: &LeafNode, page: &mut Page) {
        leaf.header.encode(&mut page.body[..NODE_HEADER_LEN]);
        leaf.encode(&mut page.body[NODE_HEADER_LEN..]);
    }

    fn decode_internal(&self, page: &Page) -> DbResult<InternalNode> {
        let header = NodeHeader::decode(&page.body[..NODE_HEADER_LEN])?;
        InternalNode::decode(&page.body[NODE_HEADER_LEN..], header)
    }

    fn encode_internal(&self, node: &InternalNode, page: &mut Page) {
        node.header.encode(&mut page.body[..NODE_HEADER_LEN]);
        node.encode(&mut page.body[NODE_HEADER_LEN..]);
    }

    /// Descends from the root to the leaf that may hold `key`, taking
    /// the shared latch on each internal node just long enough to read
    /// out the next child pointer. The ancestor chain (root-to-parent,
    /// in order) is returned alongside the still-unlatched leaf id so
    /// callers can re-latch whichever they need exclusively.
    fn descend(&self, key: &[u8]) -> DbResult<(Vec<u64>, u64)> {
        let mut ancestors = Vec::new();
        let mut id = self.root.get()?;
        loop {
            let frame = self.cache.fetch(id)?;
            let ty = frame.rlock().ty();
            if ty == PageType::IndexLeaf {
                return Ok((ancestors, id));
            }
            let child = {
                let guard = frame.rlock();
                self.decode_internal(&guard)?.find_child(key)
            };
            ancestors.push(id);
            id = child;
        }
    }

    fn fetch(&self, id: u64) -> DbResult<Arc<Frame>> {
        self.cache.fetch(id)
    }

    /// Point lookup. Returns the entry's payload bytes (everything after
    /// the `key_size`-byte key) if a live entry for `key` exists.
    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        let (_, leaf_id) = self.descend(key)?;
        let frame = self.fetch(leaf_id)?;
        let guard = frame.rlock();
        let leaf = self.decode_leaf(&guard)?;
        let lookup = live_key(key, self.key_size);
        let (cursor, found) = leaf.bin_search_body(&lookup);
        if !found {
            return Ok(None);
        }
        Ok(Some(leaf.entries[cursor][self.key_size as usize..].to_vec()))
    }

    fn log_leaf_snapshot(&self, wal: &Wal, trx_id: i32, leaf_id: u64, page: &Page) -> DbResult<()> {
        let bytes = page.to_bytes().to_vec();
        let action = Action {
            op: OpCode::Snapshot,
            dest: leaf_id * PAGE_SIZE as u64,
            v_type: DataType::Page,
            v_len: bytes.len() as u16,
        };
        wal.log(trx_id, action, bytes)?;
        Ok(())
    }

    /// Inserts `key -> payload`. Fails with `AlreadyExists` if a live
    /// entry for `key` is already present.
    pub fn insert(&self, key: &[u8], payload: &[u8], wal: &Wal, trx_id: i32) -> DbResult<()> {
        let (ancestors, leaf_id) = self.descend(key)?;
        let frame = self.fetch(leaf_id)?;
        let mut guard = frame.lock();
        let mut leaf = self.decode_leaf(&guard)?;

        let mut entry = live_key(key, self.key_size);
        entry.extend_from_slice(payload);
        let (_, found) = leaf.bin_search_body(&entry);
        if found {
            return Err(DbError::AlreadyExists);
        }

        if !leaf.is_full() {
            leaf.insert_entry(entry);
            self.encode_leaf(&leaf, &mut guard);
            self.log_leaf_snapshot(wal, trx_id, leaf_id, &guard)?;
            return Ok(());
        }

        if leaf.dirty > 0 {
            leaf.clean();
            leaf.insert_entry(entry);
            self.encode_leaf(&leaf, &mut guard);
            self.log_leaf_snapshot(wal, trx_id, leaf_id, &guard)?;
            return Ok(());
        }

        // SplitAndAdd.
        let right_id = self.cache.store().claim_free_page(PageType::IndexLeaf)?;
        let (promoted, mut right) = leaf.split(right_id.page);

        self.splice.splice(|| -> DbResult<()> {
            right.next = leaf.next;
            right.prev = leaf.header.id;
            leaf.next = right.header.id;
            if right.next != 0 {
                let sib_frame = self.fetch(right.next)?;
                let mut sib_guard = sib_frame.lock();
                let mut sib = self.decode_leaf(&sib_guard)?;
                sib.prev = right.header.id;
                self.encode_leaf(&sib, &mut sib_guard);
                self.log_leaf_snapshot(wal, trx_id, sib.header.id, &sib_guard)?;
            }
            Ok(())
        })?;

        if entry[..self.key_size as usize] < promoted[..] {
            leaf.insert_entry(entry);
        } else {
            right.insert_entry(entry);
        }

        self.encode_leaf(&leaf, &mut guard);
        self.log_leaf_snapshot(wal, trx_id, leaf_id, &guard)?;

        let mut right_page = Page::new(right_id.page, PageType::IndexLeaf);
        self.encode_leaf(&right, &mut right_page);
        self.cache.store().write_page(&right_page)?;
        self.cache.insert(right_page)?;
        wal.log(
            trx_id,
            Action {
                op: OpCode::NewPage,
                dest: right_id.page * PAGE_SIZE as u64,
                v_type: DataType::Nil,
                v_len: 0,
            },
            Vec::new(),
        )?;

        drop(guard);
        self.insert_into_parent(ancestors, leaf_id, promoted, right_id.page, wal, trx_id)
    }

    fn insert_into_parent(
        &self,
        mut ancestors: Vec<u64>,
        left_id: u64,
        promoted: Vec<u8>,
        right_id: u64,
        wal: &Wal,
        trx_id: i32,
    ) -> DbResult<()> {
        let Some(parent_id) = ancestors.pop() else {
            let new_root_id = self.cache.store().claim_free_page(PageType::IndexInternal)?;
            let mut root = InternalNode::empty(new_root_id.page, self.key_size);
            root.children.push(left_id);
            root.insert_key(promoted, right_id);
            let mut page = Page::new(new_root_id.page, PageType::IndexInternal);
            self.encode_internal(&root, &mut page);
            self.cache.store().write_page(&page)?;
            self.cache.insert(page)?;
            wal.log(
                trx_id,
                Action {
                    op: OpCode::NewPage,
                    dest: new_root_id.page * PAGE_SIZE as u64,
                    v_type: DataType::Nil,
                    v_len: 0,
                },
                Vec::new(),
            )?;
            return self.root.set(new_root_id.page);
        };

        let frame = self.fetch(parent_id)?;
        let mut guard = frame.lock();
        let mut node = self.decode_internal(&guard)?;

        if !node.is_full() {
            node.insert_key(promoted, right_id);
            self.encode_internal(&node, &mut guard);
            let bytes = guard.to_bytes().to_vec();
            wal.log(
                trx_id,
                Action {
                    op: OpCode::Snapshot,
                    dest: parent_id * PAGE_SIZE as u64,
                    v_type: DataType::Page,
                    v_len: bytes.len() as u16,
                },
                bytes,
            )?;
            return Ok(());
        }

        let new_id = self.cache.store().claim_free_page(PageType::IndexInternal)?;
        let (mid, mut right_node) = node.split(new_id.page);
        if promoted.as_slice() < mid.as_slice() {
            node.insert_key(promoted, right_id);
        } else {
            right_node.insert_key(promoted, right_id);
        }

        self.encode_internal(&node, &mut guard);
        let left_bytes = guard.to_bytes().to_vec();
        wal.log(
            trx_id,
            Action {
                op: OpCode::Snapshot,
                dest: parent_id * PAGE_SIZE as u64,
                v_type: DataType::Page,
                v_len: left_bytes.len() as u16,
            },
            left_bytes,
        )?;

        let mut right_page = Page::new(new_id.page, PageType::IndexInternal);
        self.encode_internal(&right_node, &mut right_page);
        self.cache.store().write_page(&right_page)?;
        self.cache.insert(right_page)?;
        wal.log(
            trx_id,
            Action {
                op: OpCode::NewPage,
                dest: new_id.page * PAGE_SIZE as u64,
                v_type: DataType::Nil,
                v_len: 0,
            },
            Vec::new(),
        )?;

        drop(guard);
        self.insert_into_parent(ancestors, parent_id, mid, new_id.page, wal, trx_id)
    }

    /// Removes `key` if present. Silently returns `Ok(())` on a miss, per
    /// the source's delete semantics.
    pub fn delete(&self, key: &[u8], wal: &Wal, trx_id: i32) -> DbResult<()> {
        let (ancestors, leaf_id) = self.descend(key)?;
        let frame = self.fetch(leaf_id)?;
        let mut guard = frame.lock();
        let mut leaf = self.decode_leaf(&guard)?;

        let lookup = live_key(key, self.key_size);
        let (cursor, found) = leaf.bin_search_body(&lookup);
        if !found {
            return Ok(());
        }
        leaf.delete_at(cursor);

        if leaf.live_count() == 0 {
            let dead_key = leaf.leaf_key.clone();
            self.splice.splice(|| -> DbResult<()> {
                if leaf.prev != 0 {
                    let prev_frame = self.fetch(leaf.prev)?;
                    let mut prev_guard = prev_frame.lock();
                    let mut prev_leaf = self.decode_leaf(&prev_guard)?;
                    prev_leaf.next = leaf.next;
                    self.encode_leaf(&prev_leaf, &mut prev_guard);
                    self.log_leaf_snapshot(wal, trx_id, prev_leaf.header.id, &prev_guard)?;
                }
                if leaf.next != 0 {
                    let next_frame = self.fetch(leaf.next)?;
                    let mut next_guard = next_frame.lock();
                    let mut next_leaf = self.decode_leaf(&next_guard)?;
                    next_leaf.prev = leaf.prev;
                    self.encode_leaf(&next_leaf, &mut next_guard);
                    self.log_leaf_snapshot(wal, trx_id, next_leaf.header.id, &next_guard)?;
                }
                Ok(())
            })?;
            drop(guard);
            self.cache.store().new_free_page(PageId::new(leaf_id))?;
            wal.log(
                trx_id,
                Action {
                    op: OpCode::Delete,
                    dest: leaf_id * PAGE_SIZE as u64,
                    v_type: DataType::Page,
                    v_len: 0,
                },
                Vec::new(),
            )?;
            return self.remove_from_parent(ancestors, leaf_id, dead_key, wal, trx_id);
        }

        if (leaf.dirty as usize) > LeafNode::max_entries(self.key_size, self.entry_size) / 2 {
            leaf.clean();
        }
        self.encode_leaf(&leaf, &mut guard);
        self.log_leaf_snapshot(wal, trx_id, leaf_id, &guard)
    }

    fn remove_from_parent(
        &self,
        mut ancestors: Vec<u64>,
        child_id: u64,
        key: Vec<u8>,
        wal: &Wal,
        trx_id: i32,
    ) -> DbResult<()> {
        let Some(parent_id) = ancestors.pop() else {
            return Ok(());
        };
        let frame = self.fetch(parent_id)?;
        let mut guard = frame.lock();
        let mut node = self.decode_internal(&guard)?;

        if node.keys.len() == 1 {
            let surviving = if node.children[0] == child_id {
                node.children[1]
            } else {
                node.children[0]
            };
            let collapsed_key = node.keys[0].clone();
            drop(guard);
            self.cache.store().new_free_page(PageId::new(parent_id))?;
            wal.log(
                trx_id,
                Action {
                    op: OpCode::Delete,
                    dest: parent_id * PAGE_SIZE as u64,
                    v_type: DataType::Page,
                    v_len: 0,
                },
                Vec::new(),
            )?;
            if ancestors.is_empty() {
                return self.root.set(surviving);
            }
            self.remove_from_parent(ancestors, parent_id, collapsed_key, wal, trx_id)
        } else {
            node.remove_key(&key);
            self.encode_internal(&node, &mut guard);
            let bytes = guard.to_bytes().to_vec();
            wal.log(
                trx_id,
                Action {
                    op: OpCode::Snapshot,
                    dest: parent_id * PAGE_SIZE as u64,
                    v_type: DataType::Page,
                    v_len: bytes.len() as u16,
                },
                bytes,
            )?;
            Ok(())
        }
    }

    /// Scans forward from `key`'s lower-bound cursor, applying `matcher`
    /// to each entry and following sibling links as needed, up to
    /// `limit` matches. If `exact` is set and the scan's starting key
    /// was not found, fails with `EntryNotFound`.
    pub fn find_matching_entries(
        &self,
        query_key: &[u8],
        matcher: &impl PartialMatch,
        exact: bool,
        limit: usize,
    ) -> DbResult<Vec<Vec<u8>>> {
        let (_, leaf_id) = self.descend(query_key)?;
        let mut current = leaf_id;
        let mut results = Vec::new();
        let mut first_iteration = true;
        let mut scan_key = query_key.to_vec();

        loop {
            let frame = self.fetch(current)?;
            let guard = frame.rlock();
            let leaf = self.decode_leaf(&guard)?;
            let (start, found) = leaf.bin_search_body(&live_key(&scan_key, self.key_size));

            if first_iteration && exact && !found {
                return Err(DbError::EntryNotFound);
            }
            first_iteration = false;

            for entry in leaf.entries.iter().skip(start) {
                if results.len() >= limit {
                    return Ok(results);
                }
                match matcher.compare(&scan_key, entry) {
                    std::cmp::Ordering::Less => return Ok(results),
                    std::cmp::Ordering::Equal => results.push(entry.clone()),
                    std::cmp::Ordering::Greater => {}
                }
            }

            if leaf.next == 0 || results.len() >= limit {
                return Ok(results);
            }
            scan_key = leaf.leaf_key[..self.key_size as usize - 1].to_vec();
            current = leaf.next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PageType as PT;
    use storage::PageStore;
    use tempfile::NamedTempFile;

    fn new_tree() -> Tree<VolatileRoot> {
        let tmp = NamedTempFile::new().unwrap();
        let (store, _) = PageStore::open(tmp.path()).unwrap();
        let store = Arc::new(store);
        let cache = Arc::new(BufferCache::with_defaults(Arc::clone(&store)));
        let id = store.claim_free_page(PT::IndexLeaf).unwrap();
        let tree = Tree::new(cache, 5, 13, VolatileRoot::new(id.page));
        let leaf = LeafNode::empty(id.page, 5, 13);
        let mut page = Page::new(id.page, PT::IndexLeaf);
        tree.encode_leaf(&leaf, &mut page);
        tree.cache.store().write_page(&page).unwrap();
        tree.cache.insert(page).unwrap();
        tree
    }

    fn entry_key(n: u32) -> Vec<u8> {
        n.to_be_bytes().to_vec()
    }

    fn open_wal(store: &Arc<PageStore>) -> (Wal, usize) {
        let offset = 64usize;
        let (wal, _) = Wal::open(Arc::clone(store), offset, 1024 * 1024).unwrap();
        (wal, offset)
    }

    #[test]
    fn insert_then_get_round_trips() {
        let tree = new_tree();
        let store = Arc::clone(tree.cache.store());
        let (wal, _) = open_wal(&store);
        tree.insert(&entry_key(1), b"12345678", &wal, 1).unwrap();
        wal.commit_txn(1).unwrap();
        let got = tree.get(&entry_key(1)).unwrap();
        assert_eq!(got.unwrap(), b"12345678".to_vec());
    }

    #[test]
    fn duplicate_insert_fails() {
        let tree = new_tree();
        let store = Arc::clone(tree.cache.store());
        let (wal, _) = open_wal(&store);
        tree.insert(&entry_key(1), b"12345678", &wal, 1).unwrap();
        wal.commit_txn(1).unwrap();
        let err = tree.insert(&entry_key(1), b"abcdefgh", &wal, 2);
        assert!(matches!(err, Err(DbError::AlreadyExists)));
    }

    #[test]
    fn delete_then_get_returns_none() {
        let tree = new_tree();
        let store = Arc::clone(tree.cache.store());
        let (wal, _) = open_wal(&store);
        tree.insert(&entry_key(1), b"12345678", &wal, 1).unwrap();
        wal.commit_txn(1).unwrap();
        tree.delete(&entry_key(1), &wal, 2).unwrap();
        wal.commit_txn(2).unwrap();
        assert!(tree.get(&entry_key(1)).unwrap().is_none());
    }

    #[test]
    fn many_inserts_force_leaf_splits() {
        let tree = new_tree();
        let store = Arc::clone(tree.cache.store());
        let (wal, _) = open_wal(&store);
        for i in 0..300u32 {
            tree.insert(&entry_key(i), b"........", &wal, i as i32 + 1).unwrap();
            wal.commit_txn(i as i32 + 1).unwrap();
        }
        for i in 0..300u32 {
            assert!(tree.get(&entry_key(i)).unwrap().is_some(), "missing key {i}");
        }
    }
}
