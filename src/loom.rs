#[cfg(not(all(test, loom)))]
pub mod sync {
    pub use std::sync::Arc;

    pub mod atomic {
        pub use core::sync::atomic::{AtomicI32, Ordering};
    }
}

#[cfg(all(test, loom))]
pub mod sync {
    pub use loom::sync::Arc;

    pub mod atomic {
        pub use loom::sync::atomic::{AtomicI32, Ordering};
    }
}
