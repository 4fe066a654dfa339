use common::{DbError, DbResult, TUPLE_SIZE};
use std::cmp::Ordering;

/// One entry of a variable-heap page's tuple directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TupleEntry {
    pub id: u8,
    pub inset: u16,
    pub length: u16,
    pub dead: bool,
}

/// Tuple-directory allocator over a variable-heap page body: a leading
/// 2-byte entry count, then a sorted-by-id directory of 5-byte entries,
/// then the heap the directory's `inset`s point into.
///
/// Ids are assigned densely from 0, matching the invariant that they form
/// a prefix of `[0, 255]`.
pub struct TupleDirectory<'a> {
    body: &'a mut [u8],
}

const COUNT_LEN: usize = 2;

impl<'a> TupleDirectory<'a> {
    pub fn new(body: &'a mut [u8]) -> Self {
        Self { body }
    }

    pub fn count(&self) -> usize {
        u16::from_le_bytes([self.body[0], self.body[1]]) as usize
    }

    fn set_count(&mut self, n: usize) {
        self.body[0..COUNT_LEN].copy_from_slice(&(n as u16).to_le_bytes());
    }

    fn entry_offset(idx: usize) -> usize {
        COUNT_LEN + idx * TUPLE_SIZE
    }

    fn read_entry(&self, idx: usize) -> TupleEntry {
        let off = Self::entry_offset(idx);
        let len_word = u16::from_le_bytes([self.body[off], self.body[off + 1]]);
        let dead = len_word & 0x8000 != 0;
        let length = len_word & 0x7FFF;
        let inset = u16::from_le_bytes([self.body[off + 2], self.body[off + 3]]);
        let id = self.body[off + 4];
        TupleEntry {
            id,
            inset,
            length,
            dead,
        }
    }

    fn write_entry(&mut self, idx: usize, e: &TupleEntry) {
        let off = Self::entry_offset(idx);
        let mut len_word = e.length & 0x7FFF;
        if e.dead {
            len_word |= 0x8000;
        }
        self.body[off..off + 2].copy_from_slice(&len_word.to_le_bytes());
        self.body[off + 2..off + 4].copy_from_slice(&e.inset.to_le_bytes());
        self.body[off + 4] = e.id;
    }

    pub fn entries(&self) -> Vec<TupleEntry> {
        (0..self.count()).map(|i| self.read_entry(i)).collect()
    }

    /// Binary-searches the directory by tuple index against the `id`
    /// field (not by raw byte offset — the source's byte-indexed search
    /// here is a known bug, not reproduced).
    pub fn get_var_space(&mut self, id: u8) -> DbResult<TupleEntry> {
        let n = self.count();
        let mut lo = 0usize;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let e = self.read_entry(mid);
            match e.id.cmp(&id) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => {
                    let mut e = e;
                    e.dead = false;
                    self.write_entry(mid, &e);
                    return Ok(e);
                }
            }
        }
        Err(DbError::EntryNotFound)
    }

    pub fn put_free_space_var(&mut self, id: u8) -> DbResult<()> {
        let n = self.count();
        for i in 0..n {
            let mut e = self.read_entry(i);
            if e.id == id {
                e.dead = true;
                self.write_entry(i, &e);
                return Ok(());
            }
        }
        Err(DbError::EntryNotFound)
    }

    /// Splits an existing chunk: shrinks it to `size` bytes, and inserts a
    /// new dead directory entry (at the first gap in the id namespace)
    /// covering the leftover remainder. Returns the remainder entry's id,
    /// or `None` if the split left nothing over.
    pub fn get_leftover(&mut self, id: u8, size: u16) -> DbResult<Option<u8>> {
        let n = self.count();
        let idx = (0..n)
            .find(|&i| self.read_entry(i).id == id)
            .ok_or(DbError::EntryNotFound)?;

        let mut entry = self.read_entry(idx);
        if entry.length < size {
            return Err(DbError::NoFreeSpace(
                "chunk smaller than requested size".into(),
            ));
        }
        let remainder_len = entry.length - size;
        let remainder_inset = entry.inset + size;
        entry.length = size;
        self.write_entry(idx, &entry);

        if remainder_len == 0 {
            return Ok(None);
        }

        let used: Vec<u8> = (0..n).map(|i| self.read_entry(i).id).collect();
        let mut new_id = 0u8;
        while used.contains(&new_id) {
            new_id = new_id.checked_add(1).ok_or_else(|| {
                DbError::NoFreeSpace("tuple id namespace exhausted".into())
            })?;
        }

        let new_entry = TupleEntry {
            id: new_id,
            inset: remainder_inset,
            length: remainder_len,
            dead: true,
        };
        self.insert_sorted(new_entry)?;
        Ok(Some(new_id))
    }

    fn insert_sorted(&mut self, entry: TupleEntry) -> DbResult<()> {
        let n = self.count();
        let needed = Self::entry_offset(n + 1);
        if needed > self.body.len() {
            return Err(DbError::NoFreeSpace("tuple directory full".into()));
        }
        let mut pos = n;
        for i in 0..n {
            if self.read_entry(i).id > entry.id {
                pos = i;
                break;
            }
        }
        for i in (pos..n).rev() {
            let e = self.read_entry(i);
            self.write_entry(i + 1, &e);
        }
        self.write_entry(pos, &entry);
        self.set_count(n + 1);
        Ok(())
    }

    /// Inserts a brand-new live chunk directory entry, used by the first
    /// allocation into a fresh page (there is no existing chunk to split).
    pub fn insert_new(&mut self, inset: u16, length: u16) -> DbResult<u8> {
        let n = self.count();
        let used: Vec<u8> = (0..n).map(|i| self.read_entry(i).id).collect();
        let mut new_id = 0u8;
        while used.contains(&new_id) {
            new_id = new_id.checked_add(1).ok_or_else(|| {
                DbError::NoFreeSpace("tuple id namespace exhausted".into())
            })?;
        }
        self.insert_sorted(TupleEntry {
            id: new_id,
            inset,
            length,
            dead: false,
        })?;
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_put_round_trip() {
        let mut body = vec![0u8; 4000];
        let mut dir = TupleDirectory::new(&mut body);
        let id = dir.insert_new(0, 64).unwrap();
        dir.put_free_space_var(id).unwrap();
        let got = dir.get_var_space(id).unwrap();
        assert!(!got.dead);
        assert_eq!(got.length, 64);
    }

    #[test]
    fn get_leftover_splits_chunk() {
        let mut body = vec![0u8; 4000];
        let mut dir = TupleDirectory::new(&mut body);
        let id = dir.insert_new(0, 100).unwrap();
        let remainder = dir.get_leftover(id, 40).unwrap().unwrap();
        assert_ne!(remainder, id);
        let shrunk = dir.entries().into_iter().find(|e| e.id == id).unwrap();
        assert_eq!(shrunk.length, 40);
        let leftover = dir.entries().into_iter().find(|e| e.id == remainder).unwrap();
        assert_eq!(leftover.length, 60);
        assert!(leftover.dead);
    }

    #[test]
    fn directory_stays_sorted_by_id() {
        let mut body = vec![0u8; 4000];
        let mut dir = TupleDirectory::new(&mut body);
        for _ in 0..5 {
            dir.insert_new(0, 10).unwrap();
        }
        let ids: Vec<u8> = dir.entries().iter().map(|e| e.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
