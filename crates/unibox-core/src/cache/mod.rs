//! In-memory folder cache.
//!
//! Message listings are kept per folder for a fixed time-to-live so that
//! moving between folders does not hit the network every time.

mod model;
mod store;

pub use model::CacheEntry;
pub use store::FolderCache;
