//! The size-classed storage pool behind [`IoBuffer`](crate::IoBuffer).

use std::array;
use std::fmt::{self, Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::{debug, trace};

/// Capacity of the smallest size class.
const MIN_CLASS: usize = 1 << 4;
/// Capacity of the largest size class. Requests beyond this are served
/// with exact-size unpooled storage.
const MAX_CLASS: usize = 1 << 17;
/// log2 of [`MIN_CLASS`].
const MIN_CLASS_SHIFT: u32 = MIN_CLASS.trailing_zeros();
/// Number of size classes (powers of two from 16 B to 128 KiB).
const CLASS_COUNT: usize = (MAX_CLASS.trailing_zeros() - MIN_CLASS_SHIFT + 1) as usize;
/// Spare regions kept per class; recycles beyond this are dropped so an
/// idle pool does not pin a burst's worth of memory forever.
const CLASS_SPARES: usize = 32;

/// An owned region of storage checked out from a [`Pool`].
///
/// The region is always initialized but may contain stale bytes from a
/// previous user; callers track how much of it holds live data.
pub struct Storage {
    buf: Box<[u8]>,
    /// Index into the pool's class table, or `None` for regions the pool
    /// will not keep (oversize or adopted allocations).
    class: Option<usize>,
}

impl Storage {
    /// Total size of the region in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl Default for Storage {
    /// An empty unpooled region.
    fn default() -> Self {
        Self {
            buf: Box::default(),
            class: None,
        }
    }
}

impl From<Vec<u8>> for Storage {
    /// Adopts an existing allocation as an unpooled region of exactly
    /// `vec.len()` bytes.
    fn from(vec: Vec<u8>) -> Self {
        Self {
            buf: vec.into_boxed_slice(),
            class: None,
        }
    }
}

impl Deref for Storage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for Storage {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Debug for Storage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("capacity", &self.capacity())
            .field("class", &self.class)
            .finish()
    }
}

/// A thread-safe pool of byte regions, bucketed into power-of-two size
/// classes from 16 B to 128 KiB.
///
/// [`checkout`] returns a region of at least the requested size, reusing
/// a recycled one when the class has spares. [`recycle`] gives a region
/// back. Requests larger than the top class get exact-size storage that
/// the pool never retains.
///
/// Buffers share the process-wide [`Pool::global`]; standalone pools are
/// for isolating pool behavior itself in tests and benchmarks.
///
/// [`checkout`]: Pool::checkout
/// [`recycle`]: Pool::recycle
pub struct Pool {
    classes: [Mutex<Vec<Box<[u8]>>>; CLASS_COUNT],
    checkouts: AtomicU64,
    reuses: AtomicU64,
    recycles: AtomicU64,
}

impl Pool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            classes: array::from_fn(|_| Mutex::new(Vec::new())),
            checkouts: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            recycles: AtomicU64::new(0),
        }
    }

    /// The process-wide pool.
    pub fn global() -> &'static Pool {
        static GLOBAL: OnceLock<Pool> = OnceLock::new();
        GLOBAL.get_or_init(Pool::new)
    }

    /// Checks out a region of at least `size` bytes.
    pub fn checkout(&self, size: usize) -> Storage {
        self.checkouts.fetch_add(1, Ordering::Relaxed);

        let Some(class) = class_of(size) else {
            debug!(capacity = size, "allocating unpooled storage");
            return Storage {
                buf: vec![0; size].into_boxed_slice(),
                class: None,
            };
        };

        let spare = self.classes[class].lock().pop();
        let buf = match spare {
            Some(buf) => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                trace!(capacity = buf.len(), "reusing pooled storage");
                buf
            }
            None => {
                let capacity = class_capacity(class);
                debug!(capacity, "allocating pooled storage");
                vec![0; capacity].into_boxed_slice()
            }
        };

        Storage {
            buf,
            class: Some(class),
        }
    }

    /// Returns a region to its class, dropping it if the region is
    /// unpooled or the class already holds enough spares.
    pub fn recycle(&self, storage: Storage) {
        let Some(class) = storage.class else {
            return;
        };
        debug_assert_eq!(storage.buf.len(), class_capacity(class));

        let mut spares = self.classes[class].lock();
        if spares.len() < CLASS_SPARES {
            spares.push(storage.buf);
            drop(spares);
            self.recycles.fetch_add(1, Ordering::Relaxed);
            trace!(class, "recycled storage");
        }
    }

    /// A snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            checkouts: self.checkouts.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            recycles: self.recycles.load(Ordering::Relaxed),
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Pool {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Counters accumulated over a pool's lifetime.
///
/// `reuses` counts checkouts served from a free list instead of a fresh
/// allocation; `recycles` counts regions accepted back. Both trail
/// `checkouts` which counts every request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub checkouts: u64,
    pub reuses: u64,
    pub recycles: u64,
}

/// The class serving `size`-byte requests, or `None` for oversize
/// requests the pool will not retain.
fn class_of(size: usize) -> Option<usize> {
    if size > MAX_CLASS {
        return None;
    }
    let capacity = size.max(MIN_CLASS).next_power_of_two();
    Some((capacity.trailing_zeros() - MIN_CLASS_SHIFT) as usize)
}

fn class_capacity(class: usize) -> usize {
    MIN_CLASS << class
}
