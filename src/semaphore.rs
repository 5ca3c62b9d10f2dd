use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Counting semaphore built on a mutex and condvar.
///
/// Used for the worker stop signal and for the source-retarget handshake,
/// where a single token is passed back and forth between the worker and the
/// caller swapping the source.
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    /// Release one permit and wake one waiter.
    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.condvar.notify_one();
    }

    /// Block until a permit is available, then take it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    /// Take a permit if one is available without blocking.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Wait for a permit for at most `timeout`. Returns `true` if a permit
    /// was taken.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count == 0 {
            if self.condvar.wait_until(&mut count, deadline).timed_out() {
                break;
            }
        }
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_try_wait() {
        let sem = Semaphore::new(1);
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
        sem.post();
        assert!(sem.try_wait());
    }

    #[test]
    fn test_wait_for_timeout() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert!(!sem.wait_for(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cross_thread_handoff() {
        let sem = Arc::new(Semaphore::new(0));
        let handle = thread::spawn({
            let sem = sem.clone();
            move || {
                thread::sleep(Duration::from_millis(10));
                sem.post();
            }
        });
        sem.wait();
        handle.join().unwrap();
    }
}
