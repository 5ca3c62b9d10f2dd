use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::block::Block;

/// FIFO of blocks awaiting resolution.
///
/// The caller appends, the worker pops from the front. A condvar is signalled
/// on every push so the worker can sleep while the queue is empty.
pub struct PendingQueue {
    blocks: Mutex<VecDeque<Block>>,
    added: Condvar,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(VecDeque::new()),
            added: Condvar::new(),
        }
    }

    pub fn push(&self, block: Block) {
        {
            let mut blocks = self.blocks.lock();
            blocks.push_back(block);
        }
        self.added.notify_one();
    }

    pub fn pop_front(&self) -> Option<Block> {
        self.blocks.lock().pop_front()
    }

    pub fn clear(&self) {
        self.blocks.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Wait until a block is queued, for at most `timeout`. Returns whether
    /// the queue is non-empty. The bounded wait lets the worker periodically
    /// re-check its stop signal.
    pub fn wait_added(&self, timeout: Duration) -> bool {
        let mut blocks = self.blocks.lock();
        if blocks.is_empty() {
            self.added.wait_for(&mut blocks, timeout);
        }
        !blocks.is_empty()
    }

    /// Wake a waiter without queueing anything, used during shutdown.
    pub fn notify(&self) {
        self.added.notify_all();
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::block::BlockRange;

    #[test]
    fn test_fifo_order() {
        let queue = PendingQueue::new();
        queue.push(Block::new(&[BlockRange::new(0, 1)]));
        queue.push(Block::new(&[BlockRange::new(10, 1)]));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front().unwrap().offsets(), vec![0]);
        assert_eq!(queue.pop_front().unwrap().offsets(), vec![10]);
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_wait_added_signalled() {
        let queue = Arc::new(PendingQueue::new());
        let producer = thread::spawn({
            let queue = queue.clone();
            move || {
                thread::sleep(Duration::from_millis(10));
                queue.push(Block::new(&[BlockRange::new(0, 1)]));
            }
        });

        assert!(queue.wait_added(Duration::from_secs(5)));
        producer.join().unwrap();
    }

    #[test]
    fn test_wait_added_timeout() {
        let queue = PendingQueue::new();
        assert!(!queue.wait_added(Duration::from_millis(10)));
    }
}
