use crate::header::NodeHeader;
use common::{DbError, DbResult, PageType, CHILD_SIZE, NODE_HEADER_LEN, PAGE_SIZE};

/// An internal B+tree node, decoded from its page body into owned keys
/// and child pointers: `N` keys of `key_size` bytes, interleaved with
/// `N+1` child page ids, matching the physical layout `key0 child0 key1
/// child1 ... key(N-1) child(N-1) childN`.
#[derive(Clone, Debug)]
pub struct InternalNode {
    pub header: NodeHeader,
    pub keys: Vec<Vec<u8>>,
    pub children: Vec<u64>,
}

impl InternalNode {
    pub fn empty(id: u64, key_size: u16) -> Self {
        Self {
            header: NodeHeader {
                ty: PageType::IndexInternal,
                id,
                key_size,
                entry_size: key_size + CHILD_SIZE as u16,
                n: 0,
                lsn: 0,
            },
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn max_keys(key_size: u16) -> usize {
        (PAGE_SIZE - NODE_HEADER_LEN - CHILD_SIZE) / (key_size as usize + CHILD_SIZE)
    }

    pub fn decode(body: &[u8], header: NodeHeader) -> DbResult<Self> {
        let key_size = header.key_size as usize;
        let n = header.n as usize;
        let mut keys = Vec::with_capacity(n);
        let mut children = Vec::with_capacity(n + 1);
        let mut cursor = 0usize;
        for _ in 0..n {
            if cursor + key_size + CHILD_SIZE > body.len() {
                return Err(DbError::InvalidPage("internal node body truncated".into()));
            }
            keys.push(body[cursor..cursor + key_size].to_vec());
            cursor += key_size;
            children.push(u64::from_le_bytes(body[cursor..cursor + 8].try_into().unwrap()));
            cursor += CHILD_SIZE;
        }
        children.push(u64::from_le_bytes(body[cursor..cursor + 8].try_into().unwrap()));
        Ok(Self {
            header,
            keys,
            children,
        })
    }

    pub fn encode(&self, body: &mut [u8]) {
        let key_size = self.header.key_size as usize;
        let mut cursor = 0usize;
        for i in 0..self.keys.len() {
            body[cursor..cursor + key_size].copy_from_slice(&self.keys[i]);
            cursor += key_size;
            body[cursor..cursor + 8].copy_from_slice(&self.children[i].to_le_bytes());
            cursor += CHILD_SIZE;
        }
        body[cursor..cursor + 8].copy_from_slice(&self.children[self.keys.len()].to_le_bytes());
    }

    /// Descends toward the child subtree that may contain `key`: the
    /// first child whose separator key is strictly greater than `key`,
    /// or the last (rightmost) child if none is.
    pub fn find_child(&self, key: &[u8]) -> u64 {
        for (i, k) in self.keys.iter().enumerate() {
            if key.as_ref() < k.as_slice() {
                return self.children[i];
            }
        }
        *self.children.last().expect("internal node always has N+1 children")
    }

    pub fn is_full(&self) -> bool {
        self.keys.len() >= Self::max_keys(self.header.key_size)
    }

    /// Inserts `key` with its right-hand child pointer in sorted order.
    /// Caller must have already verified `!is_full()`.
    pub fn insert_key(&mut self, key: Vec<u8>, child: u64) {
        let pos = self.keys.iter().position(|k| key < *k).unwrap_or(self.keys.len());
        self.keys.insert(pos, key);
        self.children.insert(pos + 1, child);
        self.header.n = self.keys.len() as u16;
    }

    /// Splits a full node in half, returning `(promoted_key, right_sibling)`.
    /// `self` retains the left half in place; `right_id` is the page id
    /// already claimed for the new sibling.
    pub fn split(&mut self, right_id: u64) -> (Vec<u8>, InternalNode) {
        let mid = self.keys.len() / 2;
        let promoted = self.keys[mid].clone();

        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        self.keys.truncate(mid);
        self.header.n = self.keys.len() as u16;

        let mut right = InternalNode::empty(right_id, self.header.key_size);
        right.keys = right_keys;
        right.children = right_children;
        right.header.n = right.keys.len() as u16;
        right.header.lsn = self.header.lsn;
        (promoted, right)
    }

    /// Removes `key` (and the child to its right) from the node. Returns
    /// `true` if found.
    pub fn remove_key(&mut self, key: &[u8]) -> bool {
        if let Some(pos) = self.keys.iter().position(|k| k.as_slice() == key) {
            self.keys.remove(pos);
            self.children.remove(pos + 1);
            self.header.n = self.keys.len() as u16;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InternalNode {
        let mut n = InternalNode::empty(1, 4);
        n.children.push(10);
        n.insert_key(b"bbbb".to_vec(), 20);
        n.insert_key(b"dddd".to_vec(), 30);
        n
    }

    #[test]
    fn find_child_picks_correct_subtree() {
        let n = sample();
        assert_eq!(n.find_child(b"aaaa"), 10);
        assert_eq!(n.find_child(b"cccc"), 20);
        assert_eq!(n.find_child(b"zzzz"), 30);
    }

    #[test]
    fn encode_decode_round_trip() {
        let n = sample();
        let mut body = vec![0u8; PAGE_SIZE - NODE_HEADER_LEN];
        n.encode(&mut body);
        let back = InternalNode::decode(&body, n.header).unwrap();
        assert_eq!(back.keys, n.keys);
        assert_eq!(back.children, n.children);
    }

    #[test]
    fn split_distributes_keys_and_promotes_middle() {
        let mut n = InternalNode::empty(1, 4);
        n.children.push(100);
        for (i, k) in [b"aaaa", b"bbbb", b"cccc", b"dddd", b"eeee"].iter().enumerate() {
            n.insert_key(k.to_vec(), 200 + i as u64);
        }
        let (promoted, right) = n.split(999);
        assert_eq!(promoted, b"cccc".to_vec());
        assert!(n.keys.len() < right.keys.len() + 2);
        assert_eq!(right.header.id, 999);
    }
}
