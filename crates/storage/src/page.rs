use crate::header::PageHeader;
use common::{DbResult, PageType, PAGE_HEADER_LEN, PAGE_SIZE};

pub const BODY_LEN: usize = PAGE_SIZE - PAGE_HEADER_LEN;

/// A typed view over one resident page buffer: header plus body. The body
/// is reinterpreted by the page-type tag — a bitmap-and-slots layout for
/// `FileFixedRow`, a tuple directory and heap for `VarHeap`, a key/child
/// array for B+tree nodes, and so on.
#[derive(Clone, Debug)]
pub struct Page {
    pub header: PageHeader,
    pub body: Vec<u8>,
}

impl Page {
    pub fn new(id: u64, ty: PageType) -> Self {
        Self {
            header: PageHeader::new(ty, id),
            body: vec![0u8; BODY_LEN],
        }
    }

    pub fn from_bytes(buf: &[u8; PAGE_SIZE]) -> DbResult<Self> {
        let header = PageHeader::decode(&buf[..PAGE_HEADER_LEN])?;
        let body = buf[PAGE_HEADER_LEN..].to_vec();
        Ok(Self { header, body })
    }

    pub fn to_bytes(&self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        self.header.encode(&mut buf[..PAGE_HEADER_LEN]);
        buf[PAGE_HEADER_LEN..].copy_from_slice(&self.body);
        buf
    }

    pub fn id(&self) -> u64 {
        self.header.id
    }

    pub fn ty(&self) -> PageType {
        self.header.ty
    }

    /// Zeroes the header and body in place, re-tagging the page as free.
    /// Used by `PageStore::new_free_page` before relinking onto the list.
    pub fn reset_as_free(&mut self) {
        self.header = PageHeader::new(PageType::Free, self.header.id);
        self.body.iter_mut().for_each(|b| *b = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut page = Page::new(3, PageType::VarHeap);
        page.body[0] = 0xAB;
        page.header.lsn = 99;
        let bytes = page.to_bytes();
        let back = Page::from_bytes(&bytes).unwrap();
        assert_eq!(back.header.lsn, 99);
        assert_eq!(back.body[0], 0xAB);
        assert_eq!(back.ty(), PageType::VarHeap);
    }
}
