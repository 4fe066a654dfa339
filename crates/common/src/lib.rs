//! Shared types threaded through every subsystem of the storage engine:
//! the error taxonomy, runtime `Config`, on-disk constants, and the small
//! tagged enums (`PageType`, `OpCode`, `DataType`) that every page header
//! and log record is built from.

mod config;
mod constants;
mod error;
mod logging;
mod page_id;
mod tags;


pub use config::Config;
pub use constants::*;
pub use error::{DbError, DbResult};
pub use logging::init_logging;
pub use page_id::PageId;
pub use tags::{DataType, OpCode, PageType};

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, DataType, OpCode, PageId, PageType};
}
