//! Sources for [`IoBuffer::read_once`](crate::IoBuffer::read_once).

use std::io;
use std::net::TcpStream;
use std::time::Duration;

/// A readable source whose per-read blocking time can be bounded.
///
/// `set_read_deadline(Some(d))` bounds every subsequent read to at most
/// `d`; `None` restores unbounded blocking. An expired deadline must
/// surface from `read` as [`io::ErrorKind::WouldBlock`] or
/// [`io::ErrorKind::TimedOut`], which is what socket receive timeouts
/// produce on Unix and Windows respectively.
pub trait DeadlineRead: io::Read {
    fn set_read_deadline(&mut self, deadline: Option<Duration>) -> io::Result<()>;
}

impl DeadlineRead for TcpStream {
    /// Maps onto `SO_RCVTIMEO` via [`TcpStream::set_read_timeout`]. Note
    /// that a zero duration is rejected there, not treated as an
    /// immediate expiry.
    fn set_read_deadline(&mut self, deadline: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(deadline)
    }
}

/// A streaming source with its deadline capability resolved at the call
/// site.
///
/// The adaptive read loop only risks a second read when it can bound how
/// long that read blocks, so the capability is part of the type instead
/// of being probed at run time: [`Deadline`] sources may be read several
/// times per fill call, [`Plain`] sources exactly once.
///
/// [`Deadline`]: ReadSource::Deadline
/// [`Plain`]: ReadSource::Plain
pub enum ReadSource<'a> {
    /// A source with per-read deadlines, typically a socket.
    Deadline(&'a mut dyn DeadlineRead),
    /// A source that blocks until data arrives, with no way to cap the
    /// wait.
    Plain(&'a mut dyn io::Read),
}

impl<'a> ReadSource<'a> {
    /// Wraps a deadline-capable source.
    pub fn deadline<R: DeadlineRead>(src: &'a mut R) -> Self {
        ReadSource::Deadline(src)
    }

    /// Wraps a source without deadline support.
    pub fn plain<R: io::Read>(src: &'a mut R) -> Self {
        ReadSource::Plain(src)
    }
}

/// Whether `err` is a read-deadline expiry rather than a real failure.
pub(crate) fn is_deadline_expired(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
