use std::io;

use thiserror::Error;

pub type PrefetchResult<T> = Result<T, PrefetchError>;

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("{0}")]
    Io(#[from] io::Error),

    /// The queried range is not present in the ready list. Returned by the
    /// bounded-wait read variant; the range was either never requested or was
    /// already evicted.
    #[error("range [{offset}, +{length}) not found in the ready list")]
    NotFound { offset: i64, length: i32 },

    /// The physical read resolving the block covering this range failed.
    #[error("read of the block covering [{offset}, +{length}) failed")]
    ReadFailed { offset: i64, length: i32 },
}
