use common::{DbError, DbResult, PageType, PAGE_HEADER_LEN};

/// The 28-byte per-page header: type tag, page id, the intra-type free-list
/// or sibling-list `next`/`prev`, the page's last-touching LSN, and the
/// fixed-row tuple length (only meaningful on `FileFixedRow` pages).
///
/// Page ids are stored as 4 bytes on disk (matching `next`/`prev`, which
/// are also page ids) and widened to `u64` once resident; six bytes of the
/// header are reserved/unused padding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageHeader {
    pub ty: PageType,
    pub id: u64,
    pub next: u64,
    pub prev: u64,
    pub lsn: u64,
    pub tuple_len: u8,
}

impl PageHeader {
    pub fn new(ty: PageType, id: u64) -> Self {
        Self {
            ty,
            id,
            next: 0,
            prev: 0,
            lsn: 0,
            tuple_len: 0,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= PAGE_HEADER_LEN);
        buf[0] = self.ty as u8;
        buf[1..5].copy_from_slice(&(self.id as u32).to_le_bytes());
        buf[5..9].copy_from_slice(&(self.next as u32).to_le_bytes());
        buf[9..13].copy_from_slice(&(self.prev as u32).to_le_bytes());
        buf[13..21].copy_from_slice(&self.lsn.to_le_bytes());
        buf[21] = self.tuple_len;
        for b in &mut buf[22..PAGE_HEADER_LEN] {
            *b = 0;
        }
    }

    pub fn decode(buf: &[u8]) -> DbResult<Self> {
        if buf.len() < PAGE_HEADER_LEN {
            return Err(DbError::InvalidPage("page buffer shorter than header".into()));
        }
        let ty = PageType::try_from(buf[0])?;
        let id = u32::from_le_bytes(buf[1..5].try_into().unwrap()) as u64;
        let next = u32::from_le_bytes(buf[5..9].try_into().unwrap()) as u64;
        let prev = u32::from_le_bytes(buf[9..13].try_into().unwrap()) as u64;
        let lsn = u64::from_le_bytes(buf[13..21].try_into().unwrap());
        let tuple_len = buf[21];
        Ok(Self {
            ty,
            id,
            next,
            prev,
            lsn,
            tuple_len,
        })
    }

    /// The positional byte offset of the `next` field within a page, used
    /// by `PageStore::claim_free_page`'s direct read of bytes `5..9`.
    pub const NEXT_FIELD_OFFSET: u64 = 5;
}
