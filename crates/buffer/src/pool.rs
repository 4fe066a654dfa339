use std::sync::{Condvar, Mutex};

/// A bounded stack of reusable objects, guarded by a condition variable:
/// `get` blocks while the pool is empty, `put` wakes exactly one waiter.
/// Pre-seeded with `capacity` items at construction, so the total number
/// of objects ever in circulation is bounded — this backs the cache's
/// buffer and node/leaf shell pools so steady-state operation doesn't
/// allocate on every page fetch or B+tree node split.
pub struct Pool<T> {
    inner: Mutex<Vec<T>>,
    not_empty: Condvar,
}

impl<T: Send> Pool<T> {
    pub fn new(capacity: usize, factory: impl Fn() -> T) -> Self {
        let items = (0..capacity).map(|_| factory()).collect();
        Self {
            inner: Mutex::new(items),
            not_empty: Condvar::new(),
        }
    }

    /// Blocks until an object is available.
    pub fn get(&self) -> T {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(item) = guard.pop() {
                return item;
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    /// Returns an object to the pool, waking exactly one waiter.
    pub fn put(&self, item: T) {
        let mut guard = self.inner.lock().unwrap();
        guard.push(item);
        self.not_empty.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn reuses_returned_items() {
        let pool: Pool<Vec<u8>> = Pool::new(2, || vec![0u8; 4096]);
        let a = pool.get();
        let b = pool.get();
        assert!(pool.is_empty());
        pool.put(a);
        pool.put(b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn get_blocks_until_put() {
        let pool = Arc::new(Pool::new(1, || 0u8));
        let only = pool.get();
        assert!(pool.is_empty());

        let waiter_pool = Arc::clone(&pool);
        let handle = std::thread::spawn(move || waiter_pool.get());

        std::thread::sleep(Duration::from_millis(50));
        pool.put(only);

        let got = handle.join().unwrap();
        assert_eq!(got, 0);
    }
}
