use crate::action::Action;
use crate::record::LogRecord;
use common::{DbResult, PageType, PAGE_HEADER_LEN, PAGE_SIZE, TRX_SIZE};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use storage::PageStore;
use tracing::{debug, warn};

/// One unit of work for the single log-writer thread.
pub(crate) enum Cmd {
    Append {
        flag: u8,
        trx_id: i32,
        action: Action,
        payload: Vec<u8>,
    },
    Truncate {
        threshold: u64,
    },
}

pub(crate) struct Request {
    pub cmd: Cmd,
    pub reply: mpsc::Sender<DbResult<u64>>,
}

/// Persisted log cursor: the page currently being written to, the offset
/// within it, the total bytes ever written, and the oldest retained page
/// plus its read cursor (for truncation/recovery).
#[derive(Clone, Copy, Debug)]
pub struct LogCursor {
    pub write_page: u64,
    pub write_offset: u16,
    pub byte_count: u64,
    pub oldest_page: u64,
    pub oldest_cursor: u16,
}

pub const CURSOR_LEN: usize = 8 + 2 + 8 + 8 + 2;

impl LogCursor {
    pub fn encode(&self) -> [u8; CURSOR_LEN] {
        let mut buf = [0u8; CURSOR_LEN];
        buf[0..8].copy_from_slice(&self.write_page.to_le_bytes());
        buf[8..10].copy_from_slice(&self.write_offset.to_le_bytes());
        buf[10..18].copy_from_slice(&self.byte_count.to_le_bytes());
        buf[18..26].copy_from_slice(&self.oldest_page.to_le_bytes());
        buf[26..28].copy_from_slice(&self.oldest_cursor.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            write_page: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            write_offset: u16::from_le_bytes(buf[8..10].try_into().unwrap()),
            byte_count: u64::from_le_bytes(buf[10..18].try_into().unwrap()),
            oldest_page: u64::from_le_bytes(buf[18..26].try_into().unwrap()),
            oldest_cursor: u16::from_le_bytes(buf[26..28].try_into().unwrap()),
        }
    }
}

pub(crate) fn spawn(
    store: Arc<PageStore>,
    meta_offset: usize,
    mut cursor: LogCursor,
) -> (mpsc::Sender<Request>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Request>();

    let handle = std::thread::Builder::new()
        .name("wal-writer".into())
        .spawn(move || {
            for req in rx {
                let result = match req.cmd {
                    Cmd::Append {
                        flag,
                        trx_id,
                        action,
                        payload,
                    } => write_one(&store, meta_offset, &mut cursor, flag, trx_id, action, payload),
                    Cmd::Truncate { threshold } => truncate(&store, meta_offset, &mut cursor, threshold),
                };
                let _ = req.reply.send(result.map(|()| cursor.byte_count));
            }
        })
        .expect("failed to spawn wal writer thread");

    (tx, handle)
}

fn ensure_page(store: &PageStore, cursor: &mut LogCursor) -> DbResult<()> {
    if cursor.write_page == 0 {
        let id = store.claim_free_page(PageType::Logger)?;
        cursor.write_page = id.page;
        cursor.write_offset = PAGE_HEADER_LEN as u16;
        cursor.oldest_page = id.page;
        cursor.oldest_cursor = cursor.write_offset;
    }
    Ok(())
}

fn roll_page(store: &PageStore, cursor: &mut LogCursor) -> DbResult<()> {
    let next_id = store.claim_free_page(PageType::Logger)?;
    let mut current = store.read_page(cursor.write_page)?;
    current.header.next = next_id.page;
    store.write_page(&current)?;

    let mut next_page = store.read_page(next_id.page)?;
    next_page.header.prev = cursor.write_page;
    store.write_page(&next_page)?;

    cursor.write_page = next_id.page;
    cursor.write_offset = PAGE_HEADER_LEN as u16;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_one(
    store: &PageStore,
    meta_offset: usize,
    cursor: &mut LogCursor,
    flag: u8,
    trx_id: i32,
    action: Action,
    payload: Vec<u8>,
) -> DbResult<()> {
    ensure_page(store, cursor)?;

    if cursor.write_offset as usize + TRX_SIZE > PAGE_SIZE {
        roll_page(store, cursor)?;
    }

    let record = LogRecord {
        flag,
        trx_id,
        action,
    };
    let header_offset = cursor.write_page * PAGE_SIZE as u64 + cursor.write_offset as u64;
    store.io().write_at(header_offset, &record.encode())?;
    cursor.write_offset += TRX_SIZE as u16;
    cursor.byte_count += TRX_SIZE as u64;

    let mut remaining = payload.as_slice();
    while !remaining.is_empty() {
        if cursor.write_offset as usize >= PAGE_SIZE {
            roll_page(store, cursor)?;
        }
        let space = PAGE_SIZE - cursor.write_offset as usize;
        let take = space.min(remaining.len());
        let offset = cursor.write_page * PAGE_SIZE as u64 + cursor.write_offset as u64;
        store.io().write_at(offset, &remaining[..take])?;
        cursor.write_offset += take as u16;
        cursor.byte_count += take as u64;
        remaining = &remaining[take..];
    }

    store.write_meta_region(meta_offset, &cursor.encode())?;
    debug!(trx_id, flag, "wal record written");
    Ok(())
}

/// Truncates the log from `oldest_page`/`oldest_cursor` forward while
/// `byte_count > threshold / 4`, freeing exhausted pages.
pub(crate) fn truncate(
    store: &PageStore,
    meta_offset: usize,
    cursor: &mut LogCursor,
    threshold: u64,
) -> DbResult<()> {
    while cursor.byte_count > threshold / 4 && cursor.oldest_page != 0 {
        let page = store.read_page(cursor.oldest_page)?;
        let mut pos = cursor.oldest_cursor as usize;
        let mut reclaimed = 0u64;
        while pos + TRX_SIZE <= PAGE_SIZE {
            let record = match LogRecord::decode(&page.body[pos - PAGE_HEADER_LEN..]) {
                Ok(r) => r,
                Err(_) => break,
            };
            let skip = TRX_SIZE + record.action.v_len as usize;
            pos += skip;
            reclaimed += skip as u64;
        }
        cursor.byte_count = cursor.byte_count.saturating_sub(reclaimed);

        let next = page.header.next;
        if next == 0 {
            warn!("wal truncation reached the write head; stopping early");
            break;
        }
        let import_id = common::PageId::new(cursor.oldest_page);
        store.new_free_page(import_id)?;
        cursor.oldest_page = next;
        cursor.oldest_cursor = PAGE_HEADER_LEN as u16;
    }
    store.write_meta_region(meta_offset, &cursor.encode())?;
    Ok(())
}

pub(crate) fn load_cursor(store: &PageStore, meta_offset: usize) -> DbResult<LogCursor> {
    let bytes = store.read_meta_region(meta_offset, CURSOR_LEN)?;
    Ok(LogCursor::decode(&bytes))
}
