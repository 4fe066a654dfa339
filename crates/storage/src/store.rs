use crate::header::PageHeader;
use crate::io::PageIo;
use crate::page::Page;
use common::{DbError, DbResult, PageId, PageType, GROWTH_PAGES, PAGE_SIZE};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// `total`, `max`, `free_head`, `free_tail`, each stored as a full `u64` —
/// this implementation's resolution of the meta page's field-width/overlap
/// ambiguity (see DESIGN.md): every field gets its own non-overlapping
/// 8-byte slot rather than the source's packed 4/8-byte mix.
pub const META_HEADER_LEN: usize = 32;

#[derive(Clone, Copy, Debug, Default)]
struct MetaState {
    total: u64,
    max: u64,
    free_head: u64,
    free_tail: u64,
}

impl MetaState {
    fn decode(buf: &[u8]) -> Self {
        Self {
            total: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            max: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            free_head: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            free_tail: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.total.to_le_bytes());
        buf[8..16].copy_from_slice(&self.max.to_le_bytes());
        buf[16..24].copy_from_slice(&self.free_head.to_le_bytes());
        buf[24..32].copy_from_slice(&self.free_tail.to_le_bytes());
    }
}

/// Owns the page file: the file descriptor, the meta page's total/max
/// page counts, and the free-page list head/tail. Assigns monotonically
/// increasing page ids and recycles freed pages LIFO.
pub struct PageStore {
    io: PageIo,
    state: Mutex<MetaState>,
}

impl PageStore {
    /// Opens (creating if missing) the page file at `path`. Returns the
    /// store plus the byte offset within page 0 where downstream
    /// components (WAL, FSM, indexes) should continue parsing their own
    /// meta-page cursors.
    pub fn open(path: impl AsRef<Path>) -> DbResult<(Self, usize)> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let io = PageIo::new(file);

        let len = io.len()?;
        let state = if len < PAGE_SIZE as u64 {
            io.set_len(PAGE_SIZE as u64)?;
            let initial = MetaState {
                total: 1,
                max: GROWTH_PAGES,
                free_head: 0,
                free_tail: 0,
            };
            let mut buf = [0u8; PAGE_SIZE];
            initial.encode(&mut buf[..META_HEADER_LEN]);
            io.write_page(0, &buf)?;
            initial
        } else {
            let buf = io.read_page(0)?;
            MetaState::decode(&buf[..META_HEADER_LEN])
        };

        Ok((
            Self {
                io,
                state: Mutex::new(state),
            },
            META_HEADER_LEN,
        ))
    }

    pub fn io(&self) -> &PageIo {
        &self.io
    }

    pub fn read_page(&self, id: u64) -> DbResult<Page> {
        let buf = self.io.read_page(id)?;
        Page::from_bytes(&buf)
    }

    pub fn write_page(&self, page: &Page) -> DbResult<()> {
        self.io.write_page(page.id(), &page.to_bytes())
    }

    /// Pops the head of the free-page list (or grows the file) and
    /// returns a fresh page of the given type.
    pub fn claim_free_page(&self, ty: PageType) -> DbResult<PageId> {
        let mut state = self.state.lock().unwrap();
        let id = if state.free_head == 0 {
            if state.total >= state.max.saturating_sub(1) {
                let new_max = state.max + GROWTH_PAGES;
                self.io.set_len(new_max * PAGE_SIZE as u64)?;
                state.max = new_max;
            }
            let id = state.total;
            state.total += 1;
            id
        } else {
            let claimed = state.free_head;
            // The free page's own `next` field tells us where the list head
            // moves to — read it directly rather than trusting any
            // in-memory shadow of it.
            let mut next_buf = [0u8; 4];
            self.io
                .read_at(claimed * PAGE_SIZE as u64 + PageHeader::NEXT_FIELD_OFFSET, &mut next_buf)?;
            state.free_head = u32::from_le_bytes(next_buf) as u64;
            if state.free_head == 0 {
                state.free_tail = 0;
            }
            claimed
        };

        let page = Page::new(id, ty);
        self.io.write_page(id, &page.to_bytes())?;
        self.flush_meta(&state)?;
        debug!(page = id, ty = %ty, "claimed page");
        Ok(PageId::new(id))
    }

    /// Zeroes `page_id` and pushes it onto the tail of the free-page list.
    pub fn new_free_page(&self, page_id: PageId) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let mut page = Page::new(page_id.page, PageType::Free);
        page.reset_as_free();
        self.io.write_page(page_id.page, &page.to_bytes())?;

        if state.free_tail != 0 {
            self.io.write_at(
                state.free_tail * PAGE_SIZE as u64 + PageHeader::NEXT_FIELD_OFFSET,
                &(page_id.page as u32).to_le_bytes(),
            )?;
        } else {
            state.free_head = page_id.page;
        }
        state.free_tail = page_id.page;
        self.flush_meta(&state)?;
        debug!(page = page_id.page, "freed page");
        Ok(())
    }

    fn flush_meta(&self, state: &MetaState) -> DbResult<()> {
        let mut buf = self.io.read_page(0)?;
        state.encode(&mut buf[..META_HEADER_LEN]);
        self.io.write_page(0, &buf)
    }

    /// Writes the raw per-component cursor bytes into page 0 at the given
    /// offset (continuing past `META_HEADER_LEN`).
    pub fn write_meta_region(&self, offset: usize, bytes: &[u8]) -> DbResult<()> {
        let mut buf = self.io.read_page(0)?;
        if offset + bytes.len() > PAGE_SIZE {
            return Err(DbError::InvalidPage("meta region out of bounds".into()));
        }
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.io.write_page(0, &buf)
    }

    pub fn read_meta_region(&self, offset: usize, len: usize) -> DbResult<Vec<u8>> {
        let buf = self.io.read_page(0)?;
        if offset + len > PAGE_SIZE {
            return Err(DbError::InvalidPage("meta region out of bounds".into()));
        }
        Ok(buf[offset..offset + len].to_vec())
    }

    pub fn close(&self) -> DbResult<()> {
        let state = self.state.lock().unwrap();
        self.flush_meta(&state)?;
        self.io.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn claim_then_free_then_claim_reuses_lifo() {
        let tmp = NamedTempFile::new().unwrap();
        let (store, _) = PageStore::open(tmp.path()).unwrap();
        let a = store.claim_free_page(PageType::VarHeap).unwrap();
        store.new_free_page(a).unwrap();
        let b = store.claim_free_page(PageType::VarHeap).unwrap();
        assert_eq!(a.page, b.page);
    }

    #[test]
    fn reopen_reconstructs_state() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        {
            let (store, _) = PageStore::open(&path).unwrap();
            store.claim_free_page(PageType::VarHeap).unwrap();
            store.close().unwrap();
        }
        let (store, _) = PageStore::open(&path).unwrap();
        let next = store.claim_free_page(PageType::VarHeap).unwrap();
        assert_eq!(next.page, 2);
    }
}
