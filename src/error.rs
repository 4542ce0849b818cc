use std::io;

use thiserror::Error;

/// Errors reported by fallible buffer operations.
///
/// Only two conditions are worth an `Err`: reading from an empty buffer
/// and a failure of the underlying source or sink. Insufficient buffered
/// data for a speculative [`peek`]/[`cut`] is a normal outcome and comes
/// back as `None`, while the fatal contract violations (capacity
/// overflow, a sink claiming to have written more than it was offered)
/// panic because the buffer's accounting can no longer be trusted.
///
/// [`peek`]: crate::IoBuffer::peek
/// [`cut`]: crate::IoBuffer::cut
#[derive(Debug, Error)]
pub enum Error {
    /// `read` was called with a non-empty destination while no unread
    /// bytes remain.
    #[error("end of input")]
    Eof,

    /// The underlying source or sink failed. Bytes moved before the
    /// failure are preserved: for fills they are already appended to the
    /// buffer, for drains they were already accepted by the sink, and
    /// `transferred` says how many.
    #[error("{source} after {transferred} bytes")]
    Io {
        /// Bytes moved by this call before the failure.
        transferred: u64,
        /// The underlying I/O error, unchanged.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Bytes moved by the failing call; zero for [`Error::Eof`].
    pub fn transferred(&self) -> u64 {
        match self {
            Error::Eof => 0,
            Error::Io { transferred, .. } => *transferred,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Eof => io::Error::new(io::ErrorKind::UnexpectedEof, "end of input"),
            Error::Io { source, .. } => source,
        }
    }
}
