use crate::loom::sync::atomic::{AtomicI32, Ordering};
use crate::loom::sync::Arc;

/// A shared lifetime counter for a pooled buffer.
///
/// Several parties on a connection may hold an interest in the same
/// buffer (the codec that produced it, a filter inspecting it, the sink
/// that will eventually write it). Each buffer starts with a count of
/// one; holders [`adjust`] the count as they acquire and release their
/// interest and act on the value it returns. The counter itself never
/// frees anything: deciding that zero means "recycle now" belongs to
/// whoever owns the buffer's lifetime.
///
/// Handles are cheap clones of the same underlying counter.
///
/// [`adjust`]: SharedCount::adjust
#[derive(Debug, Clone)]
pub struct SharedCount {
    inner: Arc<AtomicI32>,
}

impl SharedCount {
    pub(crate) fn new(initial: i32) -> Self {
        Self {
            inner: Arc::new(AtomicI32::new(initial)),
        }
    }

    /// Atomically adds `delta` (which may be negative) and returns the
    /// updated value.
    pub fn adjust(&self, delta: i32) -> i32 {
        self.inner.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// The current value.
    ///
    /// By the time the caller looks at it another holder may have
    /// adjusted it again; only the value returned by [`adjust`] itself
    /// is a stable decision point.
    ///
    /// [`adjust`]: SharedCount::adjust
    pub fn get(&self) -> i32 {
        self.inner.load(Ordering::Acquire)
    }
}

#[cfg(all(not(loom), test))]
mod tests {
    use super::SharedCount;

    use std::thread;

    #[test]
    fn test_adjust_returns_updated_value() {
        let count = SharedCount::new(1);

        assert_eq!(count.adjust(1), 2);
        assert_eq!(count.adjust(3), 5);
        assert_eq!(count.adjust(-5), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_handles_share_one_counter() {
        let count = SharedCount::new(1);
        let handle = count.clone();

        handle.adjust(4);
        assert_eq!(count.get(), 5);
    }

    #[test]
    fn test_adjust_threads() {
        const THREADS: usize = 4;
        const ITERATIONS: i32 = 100_000;

        let count = SharedCount::new(1);

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let count = count.clone();

                thread::spawn(move || {
                    for _ in 0..ITERATIONS {
                        count.adjust(1);
                        count.adjust(-1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(count.get(), 1);
    }
}

#[cfg(all(loom, test))]
mod loom_tests {
    use super::SharedCount;

    use loom::thread;

    #[test]
    fn test_adjust_loom() {
        loom::model(|| {
            let count = SharedCount::new(1);

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let count = count.clone();

                    thread::spawn(move || {
                        count.adjust(1);
                        count.adjust(-1);
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(count.get(), 1);
        });
    }
}
