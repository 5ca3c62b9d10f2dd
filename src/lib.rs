//! Asynchronous block prefetching for file I/O.
//!
//! A consumer requests scattered byte ranges of a large file; a dedicated
//! background thread resolves them overlapped with the consumer's own work,
//! serving point-queries from a bounded in-memory ready list and optionally
//! memoizing resolved blocks in a content-addressed disk cache.

pub mod block;
pub mod disk_cache;
pub mod error;
pub mod pending_queue;
pub mod prefetcher;
pub mod ready_list;
pub mod semaphore;
pub mod source;

pub use block::{Block, BlockRange};
pub use disk_cache::DiskCache;
pub use error::{PrefetchError, PrefetchResult};
pub use prefetcher::{BlockHandle, Prefetcher};
pub use ready_list::DEFAULT_CAPACITY;
pub use source::{FileSource, IoInstrumentation, RangeSource};
