//! The buffer cache: page-id-keyed resident pages with pin/latch
//! discipline, used-counter sweep eviction, and the bounded object pools
//! that back it.

mod cache;
mod frame;
mod pool;

pub use cache::BufferCache;
pub use frame::{Frame, FrameReadGuard, FrameWriteGuard};
pub use pool::Pool;
