use common::{DbError, DbResult, PageType, NODE_HEADER_LEN};

/// Shared prefix of every B+tree page, internal or leaf: `[type:1][id:8]
/// [keySize:2][entrySize:2][N:2][lsn:8]`, padded to `NODE_HEADER_LEN`.
/// Leaves append their own `dirty/next/prev/leafKey` fields right after
/// this (see `leaf::LeafNode`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeHeader {
    pub ty: PageType,
    pub id: u64,
    pub key_size: u16,
    pub entry_size: u16,
    pub n: u16,
    pub lsn: u64,
}

impl NodeHeader {
    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= NODE_HEADER_LEN);
        buf[0] = self.ty as u8;
        buf[1..9].copy_from_slice(&self.id.to_le_bytes());
        buf[9..11].copy_from_slice(&self.key_size.to_le_bytes());
        buf[11..13].copy_from_slice(&self.entry_size.to_le_bytes());
        buf[13..15].copy_from_slice(&self.n.to_le_bytes());
        buf[15..23].copy_from_slice(&self.lsn.to_le_bytes());
        for b in &mut buf[23..NODE_HEADER_LEN] {
            *b = 0;
        }
    }

    pub fn decode(buf: &[u8]) -> DbResult<Self> {
        if buf.len() < NODE_HEADER_LEN {
            return Err(DbError::InvalidPage("btree node header truncated".into()));
        }
        Ok(Self {
            ty: PageType::try_from(buf[0])?,
            id: u64::from_le_bytes(buf[1..9].try_into().unwrap()),
            key_size: u16::from_le_bytes(buf[9..11].try_into().unwrap()),
            entry_size: u16::from_le_bytes(buf[11..13].try_into().unwrap()),
            n: u16::from_le_bytes(buf[13..15].try_into().unwrap()),
            lsn: u64::from_le_bytes(buf[15..23].try_into().unwrap()),
        })
    }
}
