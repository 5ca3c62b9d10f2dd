use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::block::{Block, BlockRange};
use crate::disk_cache::DiskCache;
use crate::error::PrefetchResult;
use crate::pending_queue::PendingQueue;
use crate::ready_list::{DEFAULT_CAPACITY, ReadyList};
use crate::semaphore::Semaphore;
use crate::source::{IoInstrumentation, RangeSource};

/// How long the worker sleeps on an empty queue before re-checking its stop
/// signal.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Identifier of an enqueued block request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub id: u64,
    pub data_size: usize,
}

/// Asynchronous block-prefetch engine.
///
/// Requests for scattered byte ranges are queued and resolved by a dedicated
/// background thread, overlapping I/O with the caller's computation. Resolved
/// blocks are served from a bounded in-memory ready list and optionally
/// persisted in a content-addressed disk cache.
///
/// `request` and `read` may be called from any thread. The source file can
/// be swapped mid-flight with `set_source`; the swap is fenced by a
/// semaphore handshake with the worker so no read is torn.
pub struct Prefetcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    source: RwLock<Arc<dyn RangeSource>>,
    cache: RwLock<Option<Arc<DiskCache>>>,
    instrumentation: RwLock<Option<Arc<dyn IoInstrumentation>>>,

    pending: PendingQueue,
    ready: ReadyList,

    /// Single token passed back and forth between the worker and a caller
    /// swapping the source. The worker posts it whenever it is parked between
    /// drain cycles; `set_source` takes it for the duration of the swap.
    change_source: Semaphore,
    /// Posted once by `shutdown` to stop the worker.
    stop: Semaphore,

    active: AtomicBool,
    wait_time_us: AtomicU64,
    next_block_id: AtomicU64,
}

impl Prefetcher {
    /// Start the engine with the default ready-list capacity.
    pub fn new(source: Arc<dyn RangeSource>) -> PrefetchResult<Self> {
        Self::with_ready_capacity(source, DEFAULT_CAPACITY)
    }

    /// Start the engine keeping up to `capacity` resolved blocks in memory.
    /// Callers that read long after requesting should size this generously,
    /// since eviction is strict FIFO by resolution time.
    pub fn with_ready_capacity(
        source: Arc<dyn RangeSource>,
        capacity: usize,
    ) -> PrefetchResult<Self> {
        let shared = Arc::new(Shared {
            source: RwLock::new(source),
            cache: RwLock::new(None),
            instrumentation: RwLock::new(None),
            pending: PendingQueue::new(),
            ready: ReadyList::new(capacity),
            change_source: Semaphore::new(0),
            stop: Semaphore::new(0),
            active: AtomicBool::new(true),
            wait_time_us: AtomicU64::new(0),
            next_block_id: AtomicU64::new(0),
        });

        let worker = thread::Builder::new()
            .name("prefetch-worker".to_string())
            .spawn({
                let shared = shared.clone();
                move || worker_loop(&shared)
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Enable the disk cache rooted at `path`. Without this call every block
    /// is resolved by a physical read.
    pub fn set_cache_root(&self, path: impl AsRef<Path>) -> PrefetchResult<()> {
        let cache = DiskCache::new(path.as_ref())?;
        *self.shared.cache.write() = Some(Arc::new(cache));
        Ok(())
    }

    /// Install a hook notified after every physical read and cache fetch.
    pub fn set_instrumentation(&self, instrumentation: Arc<dyn IoInstrumentation>) {
        *self.shared.instrumentation.write() = Some(instrumentation);
    }

    /// Queue a scatter-gather read. Ranges must be sorted by offset and
    /// non-overlapping, which later point-queries rely on.
    ///
    /// When the ready list is full, the oldest resolved block is recycled for
    /// this request instead of allocating a fresh buffer.
    pub fn request(&self, ranges: &[BlockRange]) -> BlockHandle {
        let block = match self.shared.ready.take_recyclable() {
            Some(mut recycled) => {
                recycled.reinit(ranges);
                recycled
            }
            None => Block::new(ranges),
        };
        let handle = BlockHandle {
            id: self.shared.next_block_id.fetch_add(1, Ordering::Relaxed),
            data_size: block.data_size(),
        };
        self.shared.pending.push(block);
        handle
    }

    /// Serve `[offset, offset + length)` from the ready list, blocking until
    /// a block containing it is resolved.
    ///
    /// The caller must have issued a covering `request`; there is no timeout,
    /// so a read for a never-requested range blocks forever. Use
    /// `read_timeout` when that contract cannot be guaranteed.
    pub fn read(&self, offset: i64, length: i32) -> PrefetchResult<Vec<u8>> {
        self.shared
            .ready
            .wait_find(offset, length, None, &self.shared.wait_time_us)
    }

    /// Bounded-wait variant of `read`, returning `NotFound` on expiry.
    pub fn read_timeout(
        &self,
        offset: i64,
        length: i32,
        timeout: Duration,
    ) -> PrefetchResult<Vec<u8>> {
        self.shared
            .ready
            .wait_find(offset, length, Some(timeout), &self.shared.wait_time_us)
    }

    /// Replace the source file while the worker is active.
    ///
    /// Waits until the worker is parked between drain cycles, then discards
    /// all pending and ready blocks and installs the new source. In-flight
    /// results are dropped; the caller must not have outstanding `read` calls
    /// spanning the swap.
    pub fn set_source(&self, source: Arc<dyn RangeSource>) {
        let active = self.shared.active.load(Ordering::Acquire);
        if active {
            self.shared.change_source.wait();
        }

        self.shared.pending.clear();
        self.shared.ready.clear();
        *self.shared.source.write() = source;

        if active {
            self.shared.change_source.post();
        }
    }

    /// Whether the background worker thread is running.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Cumulative time callers spent blocked in `read`, in microseconds.
    pub fn wait_time_micros(&self) -> i64 {
        self.shared.wait_time_us.load(Ordering::Relaxed) as i64
    }

    /// Stop and join the worker thread, then drain both lists. Blocks queued
    /// but not yet resolved are dropped.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.active.store(false, Ordering::Release);
        self.shared.stop.post();
        self.shared.pending.notify();
        if worker.join().is_err() {
            log::error!("prefetch worker thread panicked");
        }
        self.shared.pending.clear();
        self.shared.ready.clear();
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker thread: drain the pending queue, resolve each block via the disk
/// cache or the source, publish to the ready list. Between drain cycles the
/// change-source token is posted so the caller can retarget the source
/// without tearing a read.
fn worker_loop(shared: &Shared) {
    shared.change_source.post();
    shared.pending.wait_added(IDLE_POLL_INTERVAL);
    shared.change_source.wait();

    while !shared.stop.try_wait() {
        while let Some(mut block) = shared.pending.pop_front() {
            resolve_block(shared, &mut block);
            shared.ready.push(block);
        }

        shared.change_source.post();
        shared.pending.wait_added(IDLE_POLL_INTERVAL);
        shared.change_source.wait();
    }

    // Release the handshake token on the way out so a source swap that
    // observed the worker as active cannot block on it forever.
    shared.change_source.post();
}

fn resolve_block(shared: &Shared, block: &mut Block) {
    let cache = shared.cache.read().clone();

    if let Some(cache) = &cache {
        if let Some(path) = cache.lookup(block.ranges()) {
            let start = Instant::now();
            match cache.fetch(&path, block.data_size()) {
                Ok(buffer) => {
                    record_read(shared, buffer.len(), start.elapsed());
                    block.resolve(buffer);
                    return;
                }
                Err(err) => {
                    log::warn!(
                        "failed to fetch cached block from {}, falling back to a physical read: {err}",
                        path.display(),
                    );
                }
            }
        }
    }

    let source = shared.source.read().clone();
    let offsets = block.offsets();
    let lengths = block.lengths();

    let start = Instant::now();
    match source.read_ranges(&offsets, &lengths) {
        Ok(buffer) if buffer.len() == block.data_size() => {
            record_read(shared, buffer.len(), start.elapsed());
            block.resolve(buffer);

            let base_offset = source.base_offset();
            if base_offset != 0 {
                block.shift_offsets(-base_offset);
            }

            if let Some(cache) = &cache {
                if let Err(err) = cache.store(block.ranges(), block.buffer()) {
                    log::warn!("failed to store block in the disk cache: {err}");
                }
            }
        }
        Ok(buffer) => {
            log::error!(
                "source returned {} bytes for a {}-byte block, marking it failed",
                buffer.len(),
                block.data_size(),
            );
            block.mark_failed();
        }
        Err(err) => {
            log::error!("physical read of a prefetch block failed: {err}");
            block.mark_failed();
        }
    }
}

fn record_read(shared: &Shared, bytes: usize, elapsed: Duration) {
    if let Some(instrumentation) = shared.instrumentation.read().clone() {
        instrumentation.record_read(bytes, elapsed);
    }
}
