//! On-disk and cache-tuning constants. Every offset here matches the byte
//! layouts in the external-interfaces section of the design: change one,
//! and the file format version must change with it.

/// Fixed page size. Page id N lives at byte offset `N * PAGE_SIZE`.
pub const PAGE_SIZE: usize = 4096;

/// `[type:1][pageId:4][next:8][prev:8][lsn:8][tupleLen:1]` padded to this width.
pub const PAGE_HEADER_LEN: usize = 28;

/// `[type:1][id:8][keySize:2][entrySize:2][N:2][lsn:8]`
pub const NODE_HEADER_LEN: usize = 30;

/// `[dirty:2][next:8][prev:8]` appended to `NODE_HEADER_LEN` for leaves,
/// followed by the `keySize`-byte leaf high-water key.
pub const LEAF_HEADER_EXTRA: usize = 18;

/// Variable-heap directory entry: `[lengthAndDeadBit:2][inset:2][id:1]`.
pub const TUPLE_SIZE: usize = 5;

/// FSM key: `[isFixed:1][size:2][slotCount:1][dirty:1]`.
pub const FSM_KEY_SIZE: usize = 5;

/// FSM entry: key plus an 8-byte page id.
pub const FSM_ENTRY_SIZE: usize = FSM_KEY_SIZE + 8;

/// Width of a child pointer in a B+tree internal node, and of the page-id
/// payload trailing an FSM entry's key.
pub const CHILD_SIZE: usize = 8;

/// `[op:1][dest:8][vType:1][vLen:2]`, the on-log-record action body.
pub const ACTION_LEN: usize = 13;

/// `[begin:1][trxId:4] + ACTION_LEN + [commit:1]`, padded to this width.
pub const TRX_SIZE: usize = 34;

pub const TXN_BEGIN: u8 = 120;
pub const TXN_PENDING: u8 = 121;
pub const TXN_COMMIT: u8 = 122;
pub const TXN_CANCEL: u8 = 123;

pub const CACHE_SIZE: usize = 256;
pub const CACHE_MIN: usize = 25;
pub const MAX_DELETE: usize = 200;
pub const SWEEP_INTERVAL: u64 = 1000;

/// Bytes threshold before the WAL spawns a truncation pass.
pub const LOG_THRESHOLD: u64 = 40 * 1024 * 1024;

/// Page-file growth burst, in pages.
pub const GROWTH_PAGES: u64 = 100;

/// Fixed-row slot size for the `FileFixedRow` page type.
pub const FILE_ROW_SLOT_SIZE: usize = 72;
