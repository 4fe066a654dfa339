use crate::header::NodeHeader;
use common::{DbError, DbResult, PageType, LEAF_HEADER_EXTRA, NODE_HEADER_LEN, PAGE_SIZE};

pub const DIRTY_FLAG: u8 = 1;
pub const LIVE_FLAG: u8 = 0;

/// A B+tree leaf: the shared node header, sibling links, the leaf's
/// high-water key (used by range scans to resume on the correct sibling
/// without re-descending the tree), and the packed entry array.
///
/// Every entry is `entry_size` bytes: the first `key_size` bytes are the
/// lookup key, whose last byte doubles as a dirty flag (`DIRTY_FLAG` for
/// a tombstoned entry); the remaining `entry_size - key_size` bytes are
/// the payload (a `RecordId`, an FSM page id, ...). Entries stay sorted
/// by their semantic key (the first `key_size - 1` bytes) across live
/// and tombstoned alike — only `clean`/`clean_and_insert` remove dead
/// entries from the array.
#[derive(Clone, Debug)]
pub struct LeafNode {
    pub header: NodeHeader,
    pub dirty: u16,
    pub next: u64,
    pub prev: u64,
    pub leaf_key: Vec<u8>,
    pub entries: Vec<Vec<u8>>,
}

impl LeafNode {
    pub fn empty(id: u64, key_size: u16, entry_size: u16) -> Self {
        Self {
            header: NodeHeader {
                ty: PageType::IndexLeaf,
                id,
                key_size,
                entry_size,
                n: 0,
                lsn: 0,
            },
            dirty: 0,
            next: 0,
            prev: 0,
            leaf_key: vec![0u8; key_size as usize],
            entries: Vec::new(),
        }
    }

    pub fn max_entries(key_size: u16, entry_size: u16) -> usize {
        let body_offset = LEAF_HEADER_EXTRA + key_size as usize;
        (PAGE_SIZE - NODE_HEADER_LEN - body_offset) / entry_size as usize
    }

    fn search_key_len(&self) -> usize {
        self.header.key_size as usize - 1
    }

    pub fn decode(body: &[u8], header: NodeHeader) -> DbResult<Self> {
        if body.len() < LEAF_HEADER_EXTRA {
            return Err(DbError::InvalidPage("leaf extra header truncated".into()));
        }
        let key_size = header.key_size as usize;
        let entry_size = header.entry_size as usize;
        let dirty = u16::from_le_bytes(body[0..2].try_into().unwrap());
        let next = u64::from_le_bytes(body[2..10].try_into().unwrap());
        let prev = u64::from_le_bytes(body[10..18].try_into().unwrap());
        let key_start = LEAF_HEADER_EXTRA;
        let entries_start = key_start + key_size;
        let leaf_key = body[key_start..entries_start].to_vec();

        let total = header.n as usize + dirty as usize;
        let mut entries = Vec::with_capacity(total);
        let mut cursor = entries_start;
        for _ in 0..total {
            if cursor + entry_size > body.len() {
                return Err(DbError::InvalidPage("leaf entry body truncated".into()));
            }
            entries.push(body[cursor..cursor + entry_size].to_vec());
            cursor += entry_size;
        }

        Ok(Self {
            header,
            dirty,
            next,
            prev,
            leaf_key,
            entries,
        })
    }

    pub fn encode(&self, body: &mut [u8]) {
        let key_size = self.header.key_size as usize;
        let entry_size = self.header.entry_size as usize;
        body[0..2].copy_from_slice(&self.dirty.to_le_bytes());
        body[2..10].copy_from_slice(&self.next.to_le_bytes());
        body[10..18].copy_from_slice(&self.prev.to_le_bytes());
        let key_start = LEAF_HEADER_EXTRA;
        let entries_start = key_start + key_size;
        body[key_start..entries_start].copy_from_slice(&self.leaf_key);

        let mut cursor = entries_start;
        for entry in &self.entries {
            body[cursor..cursor + entry_size].copy_from_slice(entry);
            cursor += entry_size;
        }
        for b in &mut body[cursor..] {
            *b = 0;
        }
    }

    pub fn is_live(entry: &[u8]) -> bool {
        entry[entry.len().saturating_sub(1)] == LIVE_FLAG
    }

    /// Binary search over the packed entries by semantic key (ignoring
    /// the trailing dirty-flag byte, so tombstones stay findable).
    /// Returns `(cursor, found)`: on a miss, `cursor` is the sorted
    /// insertion point.
    pub fn bin_search_body(&self, key: &[u8]) -> (usize, bool) {
        let key_len = self.search_key_len();
        debug_assert!(key.len() >= key_len);
        let key = &key[..key_len];
        let mut lo = 0usize;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let candidate = &self.entries[mid][..key_len];
            match candidate.cmp(key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    if Self::is_live(&self.entries[mid]) {
                        return (mid, true);
                    }
                    return (mid, false);
                }
            }
        }
        (lo, false)
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= Self::max_entries(self.header.key_size, self.header.entry_size)
    }

    /// Inserts a new live entry at its sorted position. Caller must have
    /// already verified the key is absent and the leaf has room (either
    /// genuinely, or after `clean`).
    pub fn insert_entry(&mut self, entry: Vec<u8>) {
        let (cursor, found) = self.bin_search_body(&entry);
        debug_assert!(!found, "insert_entry called with a live duplicate key");
        self.entries.insert(cursor, entry);
        self.header.n += 1;
    }

    /// Tombstones the live entry at `cursor` in place.
    pub fn delete_at(&mut self, cursor: usize) {
        let key_size = self.header.key_size as usize;
        self.entries[cursor][key_size - 1] = DIRTY_FLAG;
        self.header.n -= 1;
        self.dirty += 1;
    }

    pub fn live_count(&self) -> usize {
        self.header.n as usize
    }

    /// Compacts the entry array in place, dropping every tombstoned
    /// entry and zeroing the rest.
    pub fn clean(&mut self) {
        self.entries.retain(|e| Self::is_live(e));
        self.dirty = 0;
    }

    /// Splits the leaf in half by entry count, keeping the lower half in
    /// place. Returns `(promoted_key, right_sibling)`; `right_id` is the
    /// page id already claimed for the new leaf. The caller is
    /// responsible for splicing the sibling list and updating the
    /// parent with the promoted key.
    pub fn split(&mut self, right_id: u64) -> (Vec<u8>, LeafNode) {
        let half = self.entries.len() / 2;
        let right_entries = self.entries.split_off(half);
        self.header.n = self.entries.len() as u16;
        self.dirty = 0;

        let mut right = LeafNode::empty(right_id, self.header.key_size, self.header.entry_size);
        let promoted = right_entries[0][..self.header.key_size as usize].to_vec();
        right.header.n = right_entries.len() as u16;
        right.header.lsn = self.header.lsn;
        right.leaf_key = self.leaf_key.clone();
        right.entries = right_entries;
        (promoted, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: u32, payload: u64) -> Vec<u8> {
        let mut e = vec![0u8; 13];
        e[0..4].copy_from_slice(&key.to_be_bytes());
        e[4] = LIVE_FLAG;
        e[5..13].copy_from_slice(&payload.to_le_bytes());
        e
    }

    fn leaf() -> LeafNode {
        LeafNode::empty(1, 5, 13)
    }

    #[test]
    fn insert_and_find_round_trip() {
        let mut l = leaf();
        l.insert_entry(entry(10, 100));
        l.insert_entry(entry(5, 50));
        l.insert_entry(entry(20, 200));
        let (cursor, found) = l.bin_search_body(&entry(10, 0));
        assert!(found);
        assert_eq!(l.entries[cursor][5..13], 100u64.to_le_bytes());
    }

    #[test]
    fn delete_marks_tombstone_and_decrements_live_count() {
        let mut l = leaf();
        l.insert_entry(entry(1, 1));
        let (cursor, _) = l.bin_search_body(&entry(1, 0));
        l.delete_at(cursor);
        assert_eq!(l.live_count(), 0);
        assert_eq!(l.dirty, 1);
        let (_, found) = l.bin_search_body(&entry(1, 0));
        assert!(!found);
    }

    #[test]
    fn clean_drops_tombstones() {
        let mut l = leaf();
        l.insert_entry(entry(1, 1));
        l.insert_entry(entry(2, 2));
        let (cursor, _) = l.bin_search_body(&entry(1, 0));
        l.delete_at(cursor);
        l.clean();
        assert_eq!(l.entries.len(), 1);
        assert_eq!(l.dirty, 0);
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut l = leaf();
        l.insert_entry(entry(3, 33));
        l.next = 7;
        l.prev = 9;
        let mut body = vec![0u8; PAGE_SIZE - NODE_HEADER_LEN];
        l.encode(&mut body);
        let back = LeafNode::decode(&body, l.header).unwrap();
        assert_eq!(back.entries, l.entries);
        assert_eq!(back.next, 7);
        assert_eq!(back.prev, 9);
    }
}
