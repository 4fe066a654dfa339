//! Free-space map: a B+tree specialization mapping
//! `(isFixed, size, slotCount)` to a page id, used to recycle intra-page
//! space left over from deleted fixed-slot rows and variable-length heap
//! chunks instead of growing the page file for every allocation.
//!
//! The tree's own tombstone byte (trailing dirty flag on every key) does
//! double duty as the FSM's own "this tracking entry is spent" marker —
//! there is no separate FSM-level dirty bit distinct from the generic
//! leaf tombstone.

use btree::{PartialMatch, RootPointer, Tree};
use buffer::BufferCache;
use common::{
    DataType, DbResult, OpCode, PageId, PageType, FSM_ENTRY_SIZE, FSM_KEY_SIZE, PAGE_SIZE,
    TUPLE_SIZE,
};
use std::cmp::Ordering;
use std::sync::Arc;
use storage::{FixedSlotAllocator, TupleDirectory, BODY_LEN};
use wal::{Action, Wal};

const SIZE_OFFSET: usize = 1;
const COUNT_OFFSET: usize = 3;
const DIRTY_OFFSET: usize = 4;
const IS_DIRTY: u8 = btree::DIRTY_FLAG;

/// Tolerant prefix match over an FSM leaf: a candidate belongs to the
/// query if its `(isFixed, size)` bytes agree, regardless of slot count.
/// Whether a tombstoned (dirty) candidate counts as a match depends on
/// the caller — `GetFixedSpace` only wants a live entry to reuse,
/// `PutFixedSpace` also wants to find a dirty one to revive.
struct FsmMatch {
    accept_dirty: bool,
}

impl PartialMatch for FsmMatch {
    fn compare(&self, query_key: &[u8], candidate: &[u8]) -> Ordering {
        if candidate[..COUNT_OFFSET] != query_key[..COUNT_OFFSET] {
            return Ordering::Less;
        }
        if candidate[DIRTY_OFFSET] == IS_DIRTY && !self.accept_dirty {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

fn fixed_key(size: u16, count: u8) -> [u8; FSM_KEY_SIZE - 1] {
    let mut key = [0u8; FSM_KEY_SIZE - 1];
    key[0] = 1;
    key[SIZE_OFFSET..SIZE_OFFSET + 2].copy_from_slice(&size.to_le_bytes());
    key[COUNT_OFFSET] = count;
    key
}

fn var_key(size: u16) -> [u8; FSM_KEY_SIZE - 1] {
    let mut key = [0u8; FSM_KEY_SIZE - 1];
    key[SIZE_OFFSET..SIZE_OFFSET + 2].copy_from_slice(&size.to_le_bytes());
    key
}

fn entry_size_field(entry: &[u8]) -> u16 {
    u16::from_le_bytes([entry[SIZE_OFFSET], entry[SIZE_OFFSET + 1]])
}

fn entry_page_field(entry: &[u8]) -> u64 {
    u64::from_le_bytes(entry[FSM_KEY_SIZE..FSM_ENTRY_SIZE].try_into().unwrap())
}

/// The free-space map. Wraps a `btree::Tree` keyed
/// `(isFixed, size, slotCount)` -> page id.
pub struct Fsm<R: RootPointer> {
    cache: Arc<BufferCache>,
    tree: Tree<R>,
}

impl<R: RootPointer> Fsm<R> {
    pub fn new(cache: Arc<BufferCache>, root: R) -> Self {
        let tree = Tree::new(
            Arc::clone(&cache),
            FSM_KEY_SIZE as u16,
            FSM_ENTRY_SIZE as u16,
            root,
        );
        Self { cache, tree }
    }

    /// Formats the first, empty leaf of a brand-new FSM.
    pub fn init_empty(&self) -> DbResult<()> {
        self.tree.init_empty()
    }

    /// Finds (or claims) a fixed-slot page of `page_type` with room for a
    /// `size`-byte row, claims a free bit from its bitmap, and returns
    /// the slot's address.
    pub fn get_fixed_space(
        &self,
        size: u16,
        page_type: PageType,
        wal: &Wal,
        trx_id: i32,
    ) -> DbResult<PageId> {
        wal.log(
            trx_id,
            Action {
                op: OpCode::GetFixSpace,
                dest: 0,
                v_type: DataType::NlBlob,
                v_len: size,
            },
            Vec::new(),
        )?;

        let query = fixed_key(size, 0);
        let matches = self
            .tree
            .find_matching_entries(&query, &FsmMatch { accept_dirty: false }, false, 1)?;

        let page_id = if let Some(entry) = matches.into_iter().next() {
            let old_count = entry[COUNT_OFFSET];
            let page = entry_page_field(&entry);
            self.tree.delete(&entry[..FSM_KEY_SIZE - 1], wal, trx_id)?;
            if old_count != 2 {
                let new_count = old_count.saturating_sub(1);
                let key = fixed_key(size, new_count);
                self.tree.insert(&key, &page.to_le_bytes(), wal, trx_id)?;
            }
            // old_count == 2: the entry stays tombstoned (this is the
            // "mark dirty" transition) rather than being reinserted.
            page
        } else {
            let claimed = self.cache.store().claim_free_page(page_type)?;
            let capacity = (BODY_LEN / (size as usize).max(1)).min(u8::MAX as usize) as u8;
            let key = fixed_key(size, capacity);
            self.tree
                .insert(&key, &claimed.page.to_le_bytes(), wal, trx_id)?;
            wal.log(
                trx_id,
                Action {
                    op: OpCode::NewPage,
                    dest: claimed.page * PAGE_SIZE as u64,
                    v_type: DataType::Nil,
                    v_len: 0,
                },
                Vec::new(),
            )?;
            claimed.page
        };

        let frame = self.cache.fetch(page_id)?;
        let mut guard = frame.lock();
        let mut alloc = FixedSlotAllocator::new(&mut guard.body, size as usize);
        let slot = alloc.grab_free_slot()?;
        Ok(PageId::with_slot(page_id, slot as u8))
    }

    /// Returns a fixed-size slot to the free-space map, reviving or
    /// incrementing an existing tracking entry for `size` where
    /// possible rather than growing the tree.
    pub fn put_fixed_space(&self, size: u16, pid: PageId, wal: &Wal, trx_id: i32) -> DbResult<()> {
        wal.log(
            trx_id,
            Action {
                op: OpCode::PutFixSpace,
                dest: 0,
                v_type: DataType::NlBlob,
                v_len: size,
            },
            Vec::new(),
        )?;

        let query = fixed_key(size, 0);
        let matches = self
            .tree
            .find_matching_entries(&query, &FsmMatch { accept_dirty: true }, false, 8)?;

        let reusable = matches.into_iter().find(|entry| {
            entry[DIRTY_OFFSET] == IS_DIRTY || entry_page_field(entry) == pid.page
        });

        match reusable {
            Some(entry) => {
                let old_count = entry[COUNT_OFFSET];
                self.tree.delete(&entry[..FSM_KEY_SIZE - 1], wal, trx_id)?;
                let new_count = if old_count == 0 { 2 } else { old_count.saturating_add(1) };
                let key = fixed_key(size, new_count);
                self.tree.insert(&key, &pid.page.to_le_bytes(), wal, trx_id)?;
            }
            None => {
                let key = fixed_key(size, 2);
                self.tree.insert(&key, &pid.page.to_le_bytes(), wal, trx_id)?;
            }
        }

        let frame = self.cache.fetch(pid.page)?;
        let mut guard = frame.lock();
        let mut alloc = FixedSlotAllocator::new(&mut guard.body, size as usize);
        alloc.release_slot(pid.slot as usize)
    }

    /// Finds (or claims) a variable-heap chunk with room for `size`
    /// bytes. A chunk big enough is split: the requested portion is
    /// returned and the remainder is reinserted under its reduced size.
    pub fn get_var_space(&self, size: u16, wal: &Wal, trx_id: i32) -> DbResult<PageId> {
        wal.log(
            trx_id,
            Action {
                op: OpCode::GetVarSpace,
                dest: 0,
                v_type: DataType::NlBlob,
                v_len: size,
            },
            Vec::new(),
        )?;

        let query = var_key(size);
        let matches =
            self.tree
                .find_matching_entries(&query, &FsmMatch { accept_dirty: false }, false, 8)?;
        let bigger = matches
            .into_iter()
            .find(|entry| entry_size_field(entry) > size);

        if let Some(entry) = bigger {
            let entry_size = entry_size_field(&entry);
            let located = PageId::from_bytes(
                entry[FSM_KEY_SIZE..FSM_ENTRY_SIZE].try_into().unwrap(),
            );
            self.tree.delete(&entry[..FSM_KEY_SIZE - 1], wal, trx_id)?;

            let leftover_id = {
                let frame = self.cache.fetch(located.page)?;
                let mut guard = frame.lock();
                let mut dir = TupleDirectory::new(&mut guard.body);
                dir.get_var_space(located.slot)?;
                dir.get_leftover(located.slot, size)?
            };

            if let Some(leftover_id) = leftover_id {
                let delta = entry_size.saturating_sub(size).saturating_sub(TUPLE_SIZE as u16);
                if delta > 0 {
                    let leftover_key = var_key(delta);
                    let payload = PageId::with_slot(located.page, leftover_id).to_bytes();
                    self.tree
                        .insert(&leftover_key, &payload, wal, trx_id)?;
                }
            }

            return Ok(PageId::with_slot(located.page, located.slot));
        }

        let claimed = self.cache.store().claim_free_page(PageType::VarHeap)?;
        wal.log(
            trx_id,
            Action {
                op: OpCode::NewPage,
                dest: claimed.page * PAGE_SIZE as u64,
                v_type: DataType::Nil,
                v_len: 0,
            },
            Vec::new(),
        )?;

        let tuple_id = {
            let frame = self.cache.fetch(claimed.page)?;
            let mut guard = frame.lock();
            let mut dir = TupleDirectory::new(&mut guard.body);
            dir.insert_new(0, size)?
        };
        Ok(PageId::with_slot(claimed.page, tuple_id))
    }

    /// Returns a variable-length chunk to the free-space map as a fresh
    /// tracking entry keyed by `size`.
    pub fn put_var_space(&self, pid: PageId, size: u16, wal: &Wal, trx_id: i32) -> DbResult<()> {
        wal.log(
            trx_id,
            Action {
                op: OpCode::PutVarSpace,
                dest: 0,
                v_type: DataType::NlBlob,
                v_len: size,
            },
            Vec::new(),
        )?;

        let key = var_key(size);
        let payload = pid.to_bytes();
        self.tree.insert(&key, &payload, wal, trx_id)?;

        let frame = self.cache.fetch(pid.page)?;
        let mut guard = frame.lock();
        let mut dir = TupleDirectory::new(&mut guard.body);
        dir.put_free_space_var(pid.slot)
    }
}
