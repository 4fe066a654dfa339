use common::{DbError, DbResult};

/// Fixed-slot bitmap allocator over a page body: a leading bitmap marking
/// occupied slots, followed by `capacity` slots of `slot_size` bytes each.
pub struct FixedSlotAllocator<'a> {
    body: &'a mut [u8],
    slot_size: usize,
    capacity: usize,
    bitmap_len: usize,
}

impl<'a> FixedSlotAllocator<'a> {
    pub fn new(body: &'a mut [u8], slot_size: usize) -> Self {
        let capacity = body.len() / slot_size;
        let bitmap_len = capacity.div_ceil(8);
        Self {
            body,
            slot_size,
            capacity,
            bitmap_len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Scans the bitmap for the first clear bit, sets it, and returns the
    /// claimed slot index.
    pub fn grab_free_slot(&mut self) -> DbResult<usize> {
        for byte_idx in 0..self.bitmap_len {
            let byte = self.body[byte_idx];
            if byte == 0xFF {
                continue;
            }
            for bit in 0..8 {
                let slot = byte_idx * 8 + bit;
                if slot >= self.capacity {
                    break;
                }
                if byte & (1 << bit) == 0 {
                    self.body[byte_idx] |= 1 << bit;
                    return Ok(slot);
                }
            }
        }
        Err(DbError::NoFreeSpace("fixed-slot page exhausted".into()))
    }

    pub fn release_slot(&mut self, slot: usize) -> DbResult<()> {
        if slot >= self.capacity {
            return Err(DbError::InvalidPage(format!(
                "slot {slot} out of range (capacity {})",
                self.capacity
            )));
        }
        let byte_idx = slot / 8;
        let bit = slot % 8;
        self.body[byte_idx] &= !(1 << bit);
        Ok(())
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        let byte_idx = slot / 8;
        let bit = slot % 8;
        self.body[byte_idx] & (1 << bit) != 0
    }

    /// The byte range of a claimed row within the body.
    pub fn row_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = self.bitmap_len + slot * self.slot_size;
        start..start + self.slot_size
    }

    pub fn row(&self, slot: usize) -> &[u8] {
        &self.body[self.row_range(slot)]
    }

    pub fn row_mut(&mut self, slot: usize) -> &mut [u8] {
        let range = self.row_range(slot);
        &mut self.body[range]
    }
}

/// Bytes reserved for the bitmap at a given slot size, used by callers that
/// need to size a fresh body buffer ahead of constructing the allocator.
pub fn bitmap_reserved_bytes(body_len: usize, slot_size: usize) -> usize {
    (body_len / slot_size).div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grab_and_release_round_trip() {
        let mut body = vec![0u8; 4068];
        let mut alloc = FixedSlotAllocator::new(&mut body, 72);
        let a = alloc.grab_free_slot().unwrap();
        let b = alloc.grab_free_slot().unwrap();
        assert_ne!(a, b);
        assert!(alloc.is_occupied(a));
        alloc.release_slot(a).unwrap();
        assert!(!alloc.is_occupied(a));
    }

    #[test]
    fn exhausts_capacity() {
        let mut body = vec![0u8; 200];
        let mut alloc = FixedSlotAllocator::new(&mut body, 72);
        let cap = alloc.capacity();
        for _ in 0..cap {
            alloc.grab_free_slot().unwrap();
        }
        assert!(alloc.grab_free_slot().is_err());
    }
}
