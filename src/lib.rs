#![forbid(unsafe_code)]

pub(crate) mod buffer;
pub(crate) mod count;
pub(crate) mod error;
pub(crate) mod fmt;
pub(crate) mod growth;
pub(crate) mod loom;
pub(crate) mod pool;
pub(crate) mod source;

pub use buffer::{IoBuffer, DEFAULT_SIZE, MAX_READ, MIN_READ};
pub use count::SharedCount;
pub use error::Error;
pub use fmt::FmtBuffer;
pub use pool::{Pool, PoolStats, Storage};
pub use source::{DeadlineRead, ReadSource};
