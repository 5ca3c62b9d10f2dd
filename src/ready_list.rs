use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::block::Block;
use crate::error::{PrefetchError, PrefetchResult};

/// Default bound on the number of resolved blocks kept in memory.
pub const DEFAULT_CAPACITY: usize = 2;

/// Bounded list of resolved blocks, in resolution order.
///
/// When the list is full the oldest block is dropped on push, strict FIFO by
/// resolution time. A block can therefore be evicted before it was ever read
/// if newer blocks keep arriving.
pub struct ReadyList {
    blocks: Mutex<VecDeque<Block>>,
    ready: Condvar,
    capacity: usize,
}

impl ReadyList {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ready list capacity must be positive");
        Self {
            blocks: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Publish a resolved block, evicting the oldest one when full, and wake
    /// readers blocked on it.
    pub fn push(&self, block: Block) {
        {
            let mut blocks = self.blocks.lock();
            while blocks.len() >= self.capacity {
                blocks.pop_front();
            }
            blocks.push_back(block);
        }
        self.ready.notify_all();
    }

    /// Pop the oldest block for reuse if the list is full. Saves the buffer
    /// reallocation for the next request.
    pub fn take_recyclable(&self) -> Option<Block> {
        let mut blocks = self.blocks.lock();
        if blocks.len() >= self.capacity {
            blocks.pop_front()
        } else {
            None
        }
    }

    pub fn clear(&self) {
        self.blocks.lock().clear();
    }

    /// Copy `[offset, offset + length)` out of the first block containing it,
    /// blocking until such a block is published.
    ///
    /// With a `timeout` the wait is bounded and expires to `NotFound`;
    /// without one the caller must guarantee a matching request was issued.
    /// Time spent blocked on the condvar is accumulated into `wait_time_us`.
    pub fn wait_find(
        &self,
        offset: i64,
        length: i32,
        timeout: Option<Duration>,
        wait_time_us: &AtomicU64,
    ) -> PrefetchResult<Vec<u8>> {
        // A negative length would satisfy the containment check of any range
        // it starts in and then wrap on the slice.
        if length < 0 {
            return Err(PrefetchError::NotFound { offset, length });
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut blocks = self.blocks.lock();
        loop {
            if let Some(result) = find_in(&blocks, offset, length) {
                return result;
            }

            let start = Instant::now();
            let timed_out = match deadline {
                Some(deadline) => self.ready.wait_until(&mut blocks, deadline).timed_out(),
                None => {
                    self.ready.wait(&mut blocks);
                    false
                }
            };
            wait_time_us.fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);

            if timed_out {
                return match find_in(&blocks, offset, length) {
                    Some(result) => result,
                    None => Err(PrefetchError::NotFound { offset, length }),
                };
            }
        }
    }
}

fn find_in(
    blocks: &VecDeque<Block>,
    offset: i64,
    length: i32,
) -> Option<PrefetchResult<Vec<u8>>> {
    for block in blocks {
        let Some(index) = block.locate(offset, length) else {
            continue;
        };
        if block.is_failed() {
            return Some(Err(PrefetchError::ReadFailed { offset, length }));
        }
        let piece = block.slice(index);
        let skip = (offset - block.ranges()[index].offset) as usize;
        return Some(Ok(piece[skip..skip + length as usize].to_vec()));
    }
    None
}
