//! Write-ahead log: per-transaction action records appended through a
//! single writer thread, with startup recovery and threshold-triggered
//! truncation.

mod action;
mod record;
mod recovery;
mod writer;

pub use action::{Action, ResolvedAction};
pub use record::LogRecord;
pub use recovery::RecoveryOutcome;
pub use writer::{LogCursor, CURSOR_LEN};

use common::{DataType, DbError, DbResult, OpCode, PAGE_SIZE, TXN_CANCEL, TXN_COMMIT, TXN_PENDING};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use storage::{PageStore, Page};
use tracing::warn;
use writer::{Cmd, Request};

/// The write-ahead log. Owns the single writer thread and the in-memory
/// table of not-yet-committed transactions' logged actions.
pub struct Wal {
    store: Arc<PageStore>,
    meta_offset: usize,
    threshold: u64,
    sender: mpsc::Sender<Request>,
    writer_handle: Option<JoinHandle<()>>,
    pending: Mutex<HashMap<i32, Vec<ResolvedAction>>>,
}

impl Wal {
    /// Opens the log, replaying any committed-but-uncheckpointed
    /// transactions found since the last clean shutdown. Returns the log
    /// alongside what recovery found, so the caller can replay committed
    /// actions into the rest of the engine before serving new work.
    pub fn open(
        store: Arc<PageStore>,
        meta_offset: usize,
        threshold_bytes: u64,
    ) -> DbResult<(Self, RecoveryOutcome)> {
        let outcome = recovery::recover(&store, meta_offset)?;
        let (sender, writer_handle) = writer::spawn(Arc::clone(&store), meta_offset, outcome.cursor);
        let wal = Self {
            store,
            meta_offset,
            threshold: threshold_bytes,
            sender,
            writer_handle: Some(writer_handle),
            pending: Mutex::new(HashMap::new()),
        };
        Ok((wal, outcome))
    }

    fn send(&self, flag: u8, trx_id: i32, action: Action, payload: Vec<u8>) -> DbResult<u64> {
        let (reply_tx, reply_rx) = mpsc::channel();
        let request = Request {
            cmd: Cmd::Append {
                flag,
                trx_id,
                action,
                payload,
            },
            reply: reply_tx,
        };
        self.sender
            .send(request)
            .map_err(|_| DbError::CorruptLog("wal writer thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| DbError::CorruptLog("wal writer thread dropped reply".into()))?
    }

    /// Appends one `TXN_PENDING` record and accumulates it onto the
    /// transaction's in-memory action list. This is the primitive the
    /// B+tree/FSM call as they work, one structural step at a time,
    /// mirroring the source's pattern of building up an action list
    /// across several calls before a single eventual commit.
    pub fn log(&self, trx_id: i32, action: Action, payload: Vec<u8>) -> DbResult<ResolvedAction> {
        if trx_id == 0 {
            return Err(DbError::InvalidTxn("transaction id must be non-zero".into()));
        }
        let count = self.send(TXN_PENDING, trx_id, action.clone(), payload.clone())?;
        let resolved = ResolvedAction { action, payload };
        self.pending
            .lock()
            .expect("wal pending lock poisoned")
            .entry(trx_id)
            .or_default()
            .push(resolved.clone());
        self.maybe_truncate(count)?;
        Ok(resolved)
    }

    /// Logs a full transaction's actions as `TXN_PENDING` records, then
    /// issues the final `TXN_COMMIT` marker. Returns the actions the
    /// executor should now apply, including the commit marker's own
    /// (typically empty) action.
    pub fn new_txn(&self, trx_id: i32, actions: Vec<(Action, Vec<u8>)>) -> DbResult<Vec<ResolvedAction>> {
        let mut resolved = Vec::with_capacity(actions.len());
        for (action, payload) in actions {
            resolved.push(self.log(trx_id, action, payload)?);
        }
        Ok(resolved)
    }

    /// Appends `TXN_COMMIT`, drops the transaction's pending entry, and
    /// returns the full action list (pending actions plus the commit
    /// marker) for the executor to apply.
    pub fn commit_txn(&self, trx_id: i32) -> DbResult<Vec<ResolvedAction>> {
        let commit_action = Action {
            op: OpCode::None,
            dest: 0,
            v_type: DataType::Nil,
            v_len: 0,
        };
        let count = self.send(TXN_COMMIT, trx_id, commit_action.clone(), Vec::new())?;
        let mut list = self
            .pending
            .lock()
            .expect("wal pending lock poisoned")
            .remove(&trx_id)
            .unwrap_or_default();
        list.push(ResolvedAction {
            action: commit_action,
            payload: Vec::new(),
        });
        self.maybe_truncate(count)?;
        Ok(list)
    }

    /// Appends `TXN_CANCEL` and drops the transaction's pending entry
    /// without returning anything for the executor to apply.
    pub fn cancel_txn(&self, trx_id: i32) -> DbResult<()> {
        let cancel_action = Action {
            op: OpCode::Cancel,
            dest: 0,
            v_type: DataType::Nil,
            v_len: 0,
        };
        let count = self.send(TXN_CANCEL, trx_id, cancel_action, Vec::new())?;
        self.pending
            .lock()
            .expect("wal pending lock poisoned")
            .remove(&trx_id);
        self.maybe_truncate(count)?;
        Ok(())
    }

    /// Logs a full-page snapshot under `trx_id`, for operations (like a
    /// B+tree split) that find it cheaper to log the resulting page
    /// whole rather than as a sequence of field-level actions.
    pub fn snapshot_page(&self, trx_id: i32, page: &Page) -> DbResult<ResolvedAction> {
        let bytes = page.to_bytes().to_vec();
        let action = Action {
            op: OpCode::Snapshot,
            dest: page.id() * PAGE_SIZE as u64,
            v_type: DataType::Page,
            v_len: bytes.len() as u16,
        };
        self.log(trx_id, action, bytes)
    }

    fn maybe_truncate(&self, byte_count: u64) -> DbResult<()> {
        if byte_count <= self.threshold {
            return Ok(());
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        let request = Request {
            cmd: Cmd::Truncate {
                threshold: self.threshold,
            },
            reply: reply_tx,
        };
        self.sender
            .send(request)
            .map_err(|_| DbError::CorruptLog("wal writer thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| DbError::CorruptLog("wal writer thread dropped reply".into()))??;
        Ok(())
    }

    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    pub fn meta_offset(&self) -> usize {
        self.meta_offset
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Some(handle) = self.writer_handle.take() {
            self.sender = mpsc::channel().0;
            if let Err(err) = handle.join() {
                warn!(?err, "wal writer thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{DataType, OpCode, PageType};
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> (Arc<PageStore>, usize) {
        let path = dir.path().join("data.db");
        let (store, cursor_offset) = PageStore::open(&path).unwrap();
        (Arc::new(store), cursor_offset)
    }

    #[test]
    fn commit_round_trip_returns_actions() {
        let dir = tempdir().unwrap();
        let (store, offset) = open_store(&dir);
        let (wal, outcome) = Wal::open(Arc::clone(&store), offset, 1024 * 1024).unwrap();
        assert!(outcome.committed.is_empty());

        let action = Action {
            op: OpCode::Insert,
            dest: 4096 + 30,
            v_type: DataType::Int32,
            v_len: 4,
        };
        wal.new_txn(7, vec![(action.clone(), vec![1, 2, 3, 4])]).unwrap();
        let applied = wal.commit_txn(7).unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].action, action);
        assert_eq!(applied[0].payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn cancel_drops_pending_without_delivering() {
        let dir = tempdir().unwrap();
        let (store, offset) = open_store(&dir);
        let (wal, _) = Wal::open(Arc::clone(&store), offset, 1024 * 1024).unwrap();

        let action = Action {
            op: OpCode::Insert,
            dest: 4096 + 30,
            v_type: DataType::Int32,
            v_len: 4,
        };
        wal.new_txn(3, vec![(action, vec![9, 9, 9, 9])]).unwrap();
        wal.cancel_txn(3).unwrap();
        assert!(wal
            .pending
            .lock()
            .unwrap()
            .get(&3)
            .is_none());
    }

    #[test]
    fn recovery_after_reopen_delivers_committed_transaction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");

        let action = Action {
            op: OpCode::Insert,
            dest: 4096 + 30,
            v_type: DataType::Int32,
            v_len: 4,
        };
        {
            let (store, offset) = {
                let (s, o) = PageStore::open(&path).unwrap();
                (Arc::new(s), o)
            };
            let (wal, _) = Wal::open(Arc::clone(&store), offset, 1024 * 1024).unwrap();
            wal.new_txn(11, vec![(action.clone(), vec![5, 6, 7, 8])]).unwrap();
            wal.commit_txn(11).unwrap();
        }

        let (store, offset) = {
            let (s, o) = PageStore::open(&path).unwrap();
            (Arc::new(s), o)
        };
        let (_wal, outcome) = Wal::open(store, offset, 1024 * 1024).unwrap();
        assert_eq!(outcome.committed.len(), 1);
        let (trx_id, actions) = &outcome.committed[0];
        assert_eq!(*trx_id, 11);
        assert_eq!(actions[0].action, action);
        assert_eq!(actions[0].payload, vec![5, 6, 7, 8]);
    }

    #[test]
    fn uncommitted_page_claims_are_rolled_back_on_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");

        {
            let (store, offset) = {
                let (s, o) = PageStore::open(&path).unwrap();
                (Arc::new(s), o)
            };
            let claimed = store.claim_free_page(PageType::VarHeap).unwrap();
            let (wal, _) = Wal::open(Arc::clone(&store), offset, 1024 * 1024).unwrap();
            let action = Action {
                op: OpCode::NewPage,
                dest: claimed.page * PAGE_SIZE as u64,
                v_type: DataType::Nil,
                v_len: 0,
            };
            wal.new_txn(21, vec![(action, Vec::new())]).unwrap();
            // Deliberately never commit or cancel: simulates a crash mid-transaction.
        }

        let (store, offset) = {
            let (s, o) = PageStore::open(&path).unwrap();
            (Arc::new(s), o)
        };
        let (_wal, outcome) = Wal::open(Arc::clone(&store), offset, 1024 * 1024).unwrap();
        assert!(outcome.committed.is_empty());

        let reclaimed = store.claim_free_page(PageType::VarHeap).unwrap();
        assert_eq!(reclaimed.page, 2);
    }
}
