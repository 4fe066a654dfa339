use thiserror::Error;

/// Canonical error type shared across the storage engine's subsystems.
///
/// Mirrors the error kinds in use: a page-level structural complaint, the
/// three B+tree search/insert outcomes, an intra-page allocator exhaustion,
/// raw I/O failure, and the two WAL-recovery complaints.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("invalid page: {0}")]
    InvalidPage(String),
    #[error("entry not found")]
    EntryNotFound,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("no free space: {0}")]
    NoFreeSpace(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid transaction: {0}")]
    InvalidTxn(String),
    #[error("corrupt log: {0}")]
    CorruptLog(String),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;
