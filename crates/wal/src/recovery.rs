use crate::action::ResolvedAction;
use crate::record::LogRecord;
use crate::writer::{load_cursor, LogCursor};
use common::{
    DbResult, OpCode, PageId, PAGE_HEADER_LEN, PAGE_SIZE, TRX_SIZE, TXN_CANCEL, TXN_COMMIT,
    TXN_PENDING,
};
use std::collections::HashMap;
use storage::PageStore;
use tracing::{debug, info};

/// What startup recovery found: one `Vec<ResolvedAction>` per committed
/// transaction (in commit order), plus the cursor to resume logging from.
pub struct RecoveryOutcome {
    pub committed: Vec<(i32, Vec<ResolvedAction>)>,
    pub cursor: LogCursor,
}

/// Reads the log from its saved oldest cursor up to the live write cursor,
/// grouping pending actions per transaction. `TxnCommit` delivers the
/// group (plus the commit record's own action); `TxnCancel` or an
/// unreadable record terminates that transaction's recovery. Afterward,
/// any transaction left pending (neither committed nor cancelled) has its
/// `NewPage` claims returned to the free list.
pub fn recover(store: &PageStore, meta_offset: usize) -> DbResult<RecoveryOutcome> {
    let cursor = load_cursor(store, meta_offset)?;
    let mut pending: HashMap<i32, Vec<ResolvedAction>> = HashMap::new();
    let mut committed = Vec::new();
    let mut terminated: Vec<i32> = Vec::new();

    if cursor.write_page == 0 {
        return Ok(RecoveryOutcome { committed, cursor });
    }

    let mut page_id = cursor.oldest_page;
    let mut pos = cursor.oldest_cursor as usize;

    'outer: loop {
        loop {
            if page_id == cursor.write_page && pos >= cursor.write_offset as usize {
                break 'outer;
            }
            if pos + TRX_SIZE > PAGE_SIZE {
                break;
            }
            let page = store.read_page(page_id)?;
            let body_idx = pos - PAGE_HEADER_LEN;
            let record = match LogRecord::decode(&page.body[body_idx..]) {
                Ok(r) => r,
                Err(_) => break,
            };
            pos += TRX_SIZE;

            let payload = if record.action.v_len > 0 {
                read_payload(store, &mut page_id, &mut pos, record.action.v_len as usize)?
            } else {
                Vec::new()
            };
            let resolved = ResolvedAction {
                action: record.action,
                payload,
            };

            match record.flag {
                TXN_PENDING => pending.entry(record.trx_id).or_default().push(resolved),
                TXN_COMMIT => {
                    let mut list = pending.remove(&record.trx_id).unwrap_or_default();
                    list.push(resolved);
                    committed.push((record.trx_id, list));
                }
                TXN_CANCEL => {
                    pending.remove(&record.trx_id);
                    terminated.push(record.trx_id);
                }
                _ => {}
            }
        }

        let page = store.read_page(page_id)?;
        if page.header.next == 0 || page_id == cursor.write_page {
            break;
        }
        page_id = page.header.next;
        pos = PAGE_HEADER_LEN;
    }

    for (trx_id, actions) in pending.drain() {
        debug!(trx_id, "rolling back pending transaction left by crash");
        for resolved in &actions {
            if resolved.action.op == OpCode::NewPage {
                let freed_page = resolved.action.dest / PAGE_SIZE as u64;
                store.new_free_page(PageId::new(freed_page))?;
            }
        }
    }

    info!(committed = committed.len(), "startup recovery complete");
    Ok(RecoveryOutcome { committed, cursor })
}

fn read_payload(
    store: &PageStore,
    page_id: &mut u64,
    pos: &mut usize,
    len: usize,
) -> DbResult<Vec<u8>> {
    let mut out = Vec::with_capacity(len);
    let mut remaining = len;
    while remaining > 0 {
        let page = store.read_page(*page_id)?;
        let space = PAGE_SIZE - *pos;
        let take = space.min(remaining);
        let start = *pos - PAGE_HEADER_LEN;
        out.extend_from_slice(&page.body[start..start + take]);
        *pos += take;
        remaining -= take;
        if remaining > 0 {
            if page.header.next == 0 {
                return Err(common::DbError::CorruptLog(
                    "payload spans past end of log".into(),
                ));
            }
            *page_id = page.header.next;
            *pos = PAGE_HEADER_LEN;
        }
    }
    Ok(out)
}
