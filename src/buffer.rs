use std::fmt::{self, Debug, Formatter};
use std::io;
use std::mem;
use std::time::Duration;

use tracing::debug;

use crate::count::SharedCount;
use crate::error::Error;
use crate::growth::{self, Growth};
use crate::pool::{Pool, Storage};
use crate::source::{is_deadline_expired, ReadSource};

/// Fewest bytes of free space worth offering a streaming source.
pub const MIN_READ: usize = 1 << 9;
/// Most bytes a single [`IoBuffer::read_once`] call will accumulate.
pub const MAX_READ: usize = 1 << 17;
/// Capacity used when a buffer is requested with a size of zero.
pub const DEFAULT_SIZE: usize = 1 << 4;

/// Deadline armed before every read attempt after the first, so a
/// source that has gone quiet releases the loop almost immediately.
const SHORT_DEADLINE: Duration = Duration::from_millis(10);

/// A pooled, growable byte buffer for a connection's receive path.
///
/// Bytes are appended at the write offset and consumed from the read
/// offset; the region between the two is the unread content that
/// [`len`], [`as_bytes`] and [`peek`] describe. Growth prefers cheap
/// moves over reallocation: spare tail capacity is used as-is, a mostly
/// consumed buffer slides its remnant back to offset zero, and only
/// when neither suffices does the buffer trade its storage for a larger
/// region from the [`Pool`].
///
/// A buffer is freed by dropping it (or [`free`], which reads better at
/// the end of a connection's lifecycle); its storage goes back to the
/// pool. Since freeing consumes the buffer, no view handed out by
/// [`peek`] or [`as_bytes`] can outlive it.
///
/// # Examples
///
/// ```
/// # use poolbuf::IoBuffer;
/// #
/// let mut buf = IoBuffer::new(0);
/// buf.put_slice(b"\x00\x02hi");
///
/// // Speculatively parse a length-prefixed frame.
/// let header: [u8; 2] = buf.peek(2).unwrap().try_into().unwrap();
/// let frame_len = u16::from_be_bytes(header) as usize;
///
/// if buf.len() >= 2 + frame_len {
///     buf.drain(2);
///     let frame = buf.cut(frame_len).unwrap();
///     assert_eq!(frame.as_bytes(), b"hi");
/// }
/// ```
///
/// [`len`]: IoBuffer::len
/// [`as_bytes`]: IoBuffer::as_bytes
/// [`peek`]: IoBuffer::peek
/// [`free`]: IoBuffer::free
pub struct IoBuffer {
    storage: Storage,
    read_off: usize,
    write_off: usize,
    mark: Option<usize>,
    eof: bool,
    count: SharedCount,
}

impl IoBuffer {
    /// Checks out a buffer with at least `capacity` bytes of storage
    /// from the global pool. Zero asks for [`DEFAULT_SIZE`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_SIZE } else { capacity };
        Self::with_storage(Pool::global().checkout(capacity))
    }

    /// An empty buffer already flagged end-of-stream, for signalling
    /// "the peer closed, nothing more is coming" through a buffer-typed
    /// channel.
    pub fn new_eof() -> Self {
        let mut buf = Self::new(0);
        buf.eof = true;
        buf
    }

    fn with_storage(storage: Storage) -> Self {
        Self {
            storage,
            read_off: 0,
            write_off: 0,
            mark: None,
            eof: false,
            count: SharedCount::new(1),
        }
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.write_off - self.read_off
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total capacity of the underlying storage.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// The unread bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage[self.read_off..self.write_off]
    }

    /// Whether the end of the stream feeding this buffer was observed.
    ///
    /// The flag is bookkeeping for the transport layer; no buffer
    /// operation sets it on its own and only [`reset`] (directly or via
    /// the auto-reset in [`read`]) clears it.
    ///
    /// [`reset`]: IoBuffer::reset
    /// [`read`]: IoBuffer::read
    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn set_eof(&mut self, eof: bool) {
        self.eof = eof;
    }

    /// Copies unread bytes into `dest` and consumes them, returning how
    /// many were copied.
    ///
    /// A drained buffer auto-resets to reclaim its space, then reports
    /// [`Error::Eof`] unless `dest` is empty.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
        if self.read_off >= self.write_off {
            self.reset();
            if dest.is_empty() {
                return Ok(0);
            }
            return Err(Error::Eof);
        }

        let n = dest.len().min(self.len());
        dest[..n].copy_from_slice(&self.storage[self.read_off..self.read_off + n]);
        self.read_off += n;
        Ok(n)
    }

    /// Appends `src`, growing as needed.
    pub fn put_slice(&mut self, src: &[u8]) {
        let insert = self.make_room(src.len());
        self.storage[insert..insert + src.len()].copy_from_slice(src);
    }

    /// Appends the UTF-8 bytes of `src`.
    pub fn put_str(&mut self, src: &str) {
        self.put_slice(src.as_bytes());
    }

    /// The next `n` unread bytes, or `None` if fewer are buffered.
    ///
    /// `None` is the ordinary "frame incomplete, read more first"
    /// outcome of speculative parsing, not a failure. Nothing is
    /// consumed either way.
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        if self.len() < n {
            return None;
        }
        Some(&self.storage[self.read_off..self.read_off + n])
    }

    /// Checkpoints the current read position for [`restore`].
    ///
    /// A single slot, not a stack: a new mark replaces the previous
    /// one. The mark does not survive compaction or reallocation, since
    /// the consumed prefix it may point into is reclaimed by both.
    ///
    /// [`restore`]: IoBuffer::restore
    pub fn mark(&mut self) {
        self.mark = Some(self.read_off);
    }

    /// Rewinds the read position to the mark and clears it; without an
    /// active mark this does nothing.
    pub fn restore(&mut self) {
        if let Some(mark) = self.mark.take() {
            self.read_off = mark;
        }
    }

    /// Discards `n` unread bytes and clears the mark.
    ///
    /// If fewer than `n` bytes are buffered the call has no effect at
    /// all; it never partially advances.
    pub fn drain(&mut self, n: usize) {
        if n > self.len() {
            return;
        }
        self.read_off += n;
        self.mark = None;
    }

    /// Splits off the first `n` unread bytes into an independent buffer
    /// with fresh pooled storage and its own counter, consuming them
    /// here and clearing the mark.
    ///
    /// `None` (with no effect) if fewer than `n` bytes are buffered.
    pub fn cut(&mut self, n: usize) -> Option<IoBuffer> {
        let head = self.peek(n)?;

        let mut piece = IoBuffer::new(n);
        piece.put_slice(head);

        self.read_off += n;
        self.mark = None;
        Some(piece)
    }

    /// Empties the buffer: offsets to zero, mark and end-of-stream flag
    /// cleared. Capacity is retained.
    pub fn reset(&mut self) {
        self.read_off = 0;
        self.write_off = 0;
        self.mark = None;
        self.eof = false;
    }

    /// Consumes the buffer and recycles its storage.
    ///
    /// Equivalent to dropping it; spelling the hand-back out marks the
    /// end of a buffer's pooled lifetime at the call site.
    pub fn free(self) {
        drop(self);
    }

    /// Atomically adds `delta` to the shared lifetime counter and
    /// returns the updated value.
    ///
    /// The counter is advisory: reaching zero does not recycle
    /// anything. See [`SharedCount`].
    pub fn adjust_count(&self, delta: i32) -> i32 {
        self.count.adjust(delta)
    }

    /// A handle on this buffer's counter for holders that track the
    /// buffer's lifetime without holding the buffer itself.
    pub fn count_handle(&self) -> SharedCount {
        self.count.clone()
    }

    /// Appends `src` using the fill-path space policy: a drained buffer
    /// resets first, then the consumed prefix is reclaimed by sliding
    /// when that covers the request, otherwise storage is reallocated.
    pub fn append(&mut self, src: &[u8]) {
        if self.read_off >= self.write_off {
            self.reset();
        }
        self.ensure_tail(src.len());

        let insert = self.write_off;
        self.storage[insert..insert + src.len()].copy_from_slice(src);
        self.write_off += src.len();
    }

    /// Appends a single byte with [`append`] semantics.
    ///
    /// [`append`]: IoBuffer::append
    pub fn append_byte(&mut self, byte: u8) {
        self.append(&[byte]);
    }

    /// Appends everything `src` yields until end of input, offering it
    /// at least [`MIN_READ`] bytes of space per read.
    ///
    /// Bytes read before a failure are already appended and counted in
    /// the error.
    pub fn read_from<R: io::Read>(&mut self, src: &mut R) -> Result<u64, Error> {
        if self.read_off >= self.write_off {
            self.reset();
        }

        let mut total = 0u64;
        loop {
            self.ensure_tail(MIN_READ);

            let start = self.write_off;
            match src.read(&mut self.storage[start..]) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    self.write_off += n;
                    total += n as u64;
                }
                Err(source) => {
                    return Err(Error::Io {
                        transferred: total,
                        source,
                    })
                }
            }
        }
    }

    /// Fills the buffer from `src`, gathering as much of a burst as
    /// possible behind a single call.
    ///
    /// The first read may block up to `duration`. For a deadline
    /// source, as long as each read fills exactly the space it was
    /// offered, the loop keeps reading behind a short follow-up
    /// deadline to absorb data that is already pending; it stops once a
    /// read comes up short, the total passes [`MAX_READ`], or a
    /// follow-up deadline expires. That last case means the burst is
    /// over and is folded into a successful return. A deadline expiry
    /// on the *first* read means no data arrived at all and is an
    /// error.
    ///
    /// A [`Plain`](ReadSource::Plain) source gets exactly one read and
    /// `duration` is ignored, since nothing could stop a second read
    /// from blocking indefinitely.
    ///
    /// A source at end of input yields `Ok` with whatever was gathered;
    /// flagging [`eof`](IoBuffer::eof) is the caller's business. Bytes
    /// read before a failure are already appended and counted in the
    /// error.
    pub fn read_once(&mut self, mut src: ReadSource<'_>, duration: Duration) -> Result<u64, Error> {
        let deadline_capable = matches!(src, ReadSource::Deadline(_));
        let mut total = 0u64;
        let mut first = true;

        if self.read_off >= self.write_off {
            self.reset();
        }
        // A small unread remnant sitting deep in the buffer wastes the
        // whole region before it; move it home while it is cheap.
        if self.read_off > 0 && self.len() < 4 * MIN_READ {
            self.slide();
        }
        if self.write_off == self.capacity() {
            self.reallocate(growth::doubled(self.capacity(), MIN_READ));
        }

        loop {
            if !first {
                self.ensure_tail(MIN_READ);
            }

            let start = self.write_off;
            let offered = self.capacity() - start;

            let attempt = match &mut src {
                ReadSource::Deadline(reader) => {
                    let deadline = if first { duration } else { SHORT_DEADLINE };
                    if let Err(source) = reader.set_read_deadline(Some(deadline)) {
                        return Err(Error::Io {
                            transferred: total,
                            source,
                        });
                    }
                    let attempt = reader.read(&mut self.storage[start..]);
                    // Best effort: a failed disarm only shortens the
                    // first read of the next fill call.
                    let _ = reader.set_read_deadline(None);
                    attempt
                }
                ReadSource::Plain(reader) => reader.read(&mut self.storage[start..]),
            };

            match attempt {
                Ok(n) => {
                    self.write_off += n;
                    total += n as u64;

                    let burst_continues =
                        deadline_capable && n == offered && total <= MAX_READ as u64;
                    if !burst_continues {
                        return Ok(total);
                    }
                }
                Err(source) => {
                    if deadline_capable && !first && is_deadline_expired(&source) {
                        // The source went quiet after yielding data;
                        // the fill succeeded.
                        return Ok(total);
                    }
                    return Err(Error::Io {
                        transferred: total,
                        source,
                    });
                }
            }

            first = false;
        }
    }

    /// Writes unread bytes to `sink` until the buffer drains or the
    /// sink accepts zero bytes, consuming what was accepted.
    ///
    /// On failure the unaccepted remainder stays buffered and the error
    /// carries how much was written first.
    ///
    /// # Panics
    ///
    /// Panics if the sink claims to have written more bytes than it was
    /// offered; the buffer's accounting cannot absorb that.
    pub fn write_to<W: io::Write>(&mut self, sink: &mut W) -> Result<u64, Error> {
        let mut total = 0u64;
        while self.read_off < self.write_off {
            let offered = self.len();
            match sink.write(self.as_bytes()) {
                Ok(accepted) => {
                    if accepted > offered {
                        panic!("sink reported writing {accepted} bytes of {offered} offered");
                    }
                    self.read_off += accepted;
                    total += accepted as u64;

                    if accepted == 0 || accepted == offered {
                        return Ok(total);
                    }
                }
                Err(source) => {
                    return Err(Error::Io {
                        transferred: total,
                        source,
                    })
                }
            }
        }
        Ok(total)
    }

    /// Makes room for `n` more bytes and returns the index to copy them
    /// to; the write offset is already advanced past the reservation.
    fn make_room(&mut self, n: usize) -> usize {
        // Hot path: the request fits in spare tail capacity.
        if n <= self.capacity() - self.write_off {
            let insert = self.write_off;
            self.write_off += n;
            return insert;
        }
        self.grow(n)
    }

    /// Makes room the expensive way.
    fn grow(&mut self, n: usize) -> usize {
        // A drained buffer gets its whole region back for free.
        if self.len() == 0 && self.read_off != 0 {
            self.reset();
        }

        match growth::plan(self.capacity(), self.write_off, self.len(), n) {
            Growth::Extend => {}
            Growth::Slide => self.slide(),
            Growth::Reallocate { new_capacity } => self.reallocate(new_capacity),
        }

        let insert = self.write_off;
        self.write_off += n;
        insert
    }

    /// Guarantees at least `need` bytes of free tail space: slides when
    /// the consumed prefix covers the deficit, otherwise reallocates to
    /// double the capacity plus the request.
    fn ensure_tail(&mut self, need: usize) {
        let free = self.capacity() - self.write_off;
        if free >= need {
            return;
        }
        if self.read_off + free < need {
            self.reallocate(growth::doubled(self.capacity(), need));
        } else {
            self.slide();
        }
    }

    /// Moves the unread region to offset zero, reclaiming the consumed
    /// prefix in place.
    fn slide(&mut self) {
        let len = self.len();
        self.storage.copy_within(self.read_off..self.write_off, 0);
        self.read_off = 0;
        self.write_off = len;
        self.mark = None;
    }

    /// Trades the current storage for a `new_capacity`-byte region from
    /// the pool, migrating the unread bytes to offset zero.
    fn reallocate(&mut self, new_capacity: usize) {
        let len = self.len();
        let mut storage = Pool::global().checkout(new_capacity);
        storage[..len].copy_from_slice(&self.storage[self.read_off..self.write_off]);

        let old = mem::replace(&mut self.storage, storage);
        Pool::global().recycle(old);

        self.read_off = 0;
        self.write_off = len;
        self.mark = None;
        debug!(capacity = self.capacity(), unread = len, "buffer reallocated");
    }
}

impl Drop for IoBuffer {
    fn drop(&mut self) {
        Pool::global().recycle(mem::take(&mut self.storage));
    }
}

impl Clone for IoBuffer {
    /// Snapshots the unread bytes and the end-of-stream flag into a
    /// freshly pooled buffer with its own counter. Clones share nothing
    /// with the original.
    fn clone(&self) -> Self {
        let mut clone = IoBuffer::new(self.len());
        clone.put_slice(self.as_bytes());
        clone.eof = self.eof;
        clone
    }
}

impl From<&[u8]> for IoBuffer {
    fn from(src: &[u8]) -> Self {
        let mut buf = IoBuffer::new(src.len());
        buf.put_slice(src);
        buf
    }
}

impl From<&str> for IoBuffer {
    fn from(src: &str) -> Self {
        src.as_bytes().into()
    }
}

impl From<Vec<u8>> for IoBuffer {
    /// Adopts the allocation as unpooled storage with its contents as
    /// the unread region.
    fn from(src: Vec<u8>) -> Self {
        let len = src.len();
        let mut buf = Self::with_storage(Storage::from(src));
        buf.write_off = len;
        buf
    }
}

impl io::Read for IoBuffer {
    /// Drains buffered bytes, reporting end of input as `Ok(0)` per the
    /// `io::Read` convention.
    fn read(&mut self, dest: &mut [u8]) -> io::Result<usize> {
        match IoBuffer::read(self, dest) {
            Ok(n) => Ok(n),
            Err(Error::Eof) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl io::Write for IoBuffer {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        self.put_slice(src);
        Ok(src.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Debug for IoBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuffer")
            .field("read_off", &self.read_off)
            .field("write_off", &self.write_off)
            .field("capacity", &self.capacity())
            .field("eof", &self.eof)
            .field("count", &self.count.get())
            .finish()
    }
}

#[cfg(all(not(loom), test))]
mod tests {
    use super::{IoBuffer, DEFAULT_SIZE};
    use crate::error::Error;

    use std::io;

    use proptest::collection::vec;
    use proptest::prelude::*;

    #[test]
    fn test_new_capacity() {
        assert_eq!(IoBuffer::new(0).capacity(), DEFAULT_SIZE);
        assert!(IoBuffer::new(100).capacity() >= 100);
        assert_eq!(IoBuffer::new(64).len(), 0);
    }

    #[test]
    fn test_put_read_round_trip() {
        let mut buf = IoBuffer::new(64);

        buf.put_slice(b"hello ");
        buf.put_str("world");
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.as_bytes(), b"hello world");

        let mut dest = [0; 6];
        assert_eq!(buf.read(&mut dest).unwrap(), 6);
        assert_eq!(&dest, b"hello ");
        assert_eq!(buf.as_bytes(), b"world");

        assert_eq!(buf.read(&mut dest).unwrap(), 5);
        assert_eq!(&dest[..5], b"world");

        assert!(matches!(buf.read(&mut dest), Err(Error::Eof)));
    }

    #[test]
    fn test_read_into_empty_dest() {
        let mut buf = IoBuffer::new_eof();

        // Draining into nothing is not end-of-input, but it still
        // triggers the auto-reset, which clears the eof flag.
        assert_eq!(buf.read(&mut []).unwrap(), 0);
        assert!(!buf.eof());

        buf.put_slice(b"x");
        assert_eq!(buf.read(&mut []).unwrap(), 0);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_grow_resets_drained_buffer() {
        let mut buf = IoBuffer::new(64);
        buf.put_slice(&[7; 64]);

        let mut sink = [0; 64];
        buf.read(&mut sink).unwrap();

        // Fully consumed: the next put reclaims the region in place.
        buf.put_slice(b"fresh");
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.as_bytes(), b"fresh");
    }

    #[test]
    fn test_grow_slides_small_remnant() {
        let mut buf = IoBuffer::new(64);
        buf.put_slice(&seq(64));

        let mut sink = [0; 60];
        buf.read(&mut sink).unwrap();

        buf.put_slice(&[0xaa; 10]);
        assert_eq!(buf.capacity(), 64);
        assert_eq!(&buf.as_bytes()[..4], &seq(64)[60..]);
        assert_eq!(&buf.as_bytes()[4..], &[0xaa; 10]);
    }

    #[test]
    fn test_grow_reallocates_large_remnant() {
        let mut buf = IoBuffer::new(64);
        buf.put_slice(&seq(64));

        let mut sink = [0; 10];
        buf.read(&mut sink).unwrap();

        // 54 unread bytes cannot slide into half of 64; the buffer
        // reallocates to 2 * 64 + 10, rounded up by the pool.
        buf.put_slice(&[0xbb; 10]);
        assert!(buf.capacity() >= 138);
        assert_eq!(buf.len(), 64);
        assert_eq!(&buf.as_bytes()[..54], &seq(64)[10..]);
        assert_eq!(&buf.as_bytes()[54..], &[0xbb; 10]);
    }

    #[test]
    fn test_peek() {
        let mut buf = IoBuffer::from("abcdef");

        assert_eq!(buf.peek(0), Some(&b""[..]));
        assert_eq!(buf.peek(4), Some(&b"abcd"[..]));
        assert_eq!(buf.peek(6), Some(&b"abcdef"[..]));
        assert_eq!(buf.peek(7), None);

        // Peeking consumes nothing.
        assert_eq!(buf.len(), 6);
        buf.drain(2);
        assert_eq!(buf.peek(4), Some(&b"cdef"[..]));
    }

    #[test]
    fn test_mark_restore() {
        let mut buf = IoBuffer::from("abcdef");

        buf.mark();
        let mut dest = [0; 3];
        buf.read(&mut dest).unwrap();
        assert_eq!(buf.as_bytes(), b"def");

        buf.restore();
        assert_eq!(buf.as_bytes(), b"abcdef");

        // The mark was consumed; restoring again changes nothing.
        buf.drain(3);
        buf.restore();
        assert_eq!(buf.as_bytes(), b"def");
    }

    #[test]
    fn test_drain() {
        let mut buf = IoBuffer::from("abcdef");

        buf.drain(2);
        assert_eq!(buf.as_bytes(), b"cdef");

        // Draining past the end has no effect at all.
        buf.drain(5);
        assert_eq!(buf.as_bytes(), b"cdef");

        buf.drain(4);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_drain_clears_mark() {
        let mut buf = IoBuffer::from("abcdef");

        buf.mark();
        buf.drain(4);
        buf.restore();
        assert_eq!(buf.as_bytes(), b"ef");
    }

    #[test]
    fn test_compaction_clears_mark() {
        let mut buf = IoBuffer::new(64);
        buf.put_slice(&seq(64));

        let mut sink = [0; 60];
        buf.read(&mut sink).unwrap();
        buf.mark();

        // This put slides the remnant to offset zero; the marked
        // position no longer exists, so restore must not rewind into
        // reclaimed space.
        buf.put_slice(&[0xaa; 10]);
        buf.restore();
        assert_eq!(buf.len(), 14);
    }

    #[test]
    fn test_cut() {
        let mut buf = IoBuffer::from("abcdef");

        let piece = buf.cut(4).unwrap();
        assert_eq!(piece.as_bytes(), b"abcd");
        assert_eq!(buf.as_bytes(), b"ef");
        assert_eq!(piece.adjust_count(0), 1);

        assert!(buf.cut(3).is_none());
        assert_eq!(buf.as_bytes(), b"ef");
    }

    #[test]
    fn test_cut_is_independent() {
        let mut buf = IoBuffer::from("abcdef");

        let mut piece = buf.cut(3).unwrap();
        piece.put_str("!");
        buf.put_str("?");

        assert_eq!(piece.as_bytes(), b"abc!");
        assert_eq!(buf.as_bytes(), b"def?");
    }

    #[test]
    fn test_clone_snapshots() {
        let mut buf = IoBuffer::from("abcdef");
        buf.drain(2);
        buf.set_eof(true);
        buf.adjust_count(5);

        let mut clone = buf.clone();
        assert_eq!(clone.as_bytes(), b"cdef");
        assert!(clone.eof());
        // The clone gets its own counter.
        assert_eq!(clone.adjust_count(0), 1);

        clone.put_str("!");
        assert_eq!(buf.as_bytes(), b"cdef");
    }

    #[test]
    fn test_count_handle_is_shared() {
        let buf = IoBuffer::new(0);
        let handle = buf.count_handle();

        assert_eq!(buf.adjust_count(2), 3);
        assert_eq!(handle.get(), 3);
        assert_eq!(handle.adjust(-3), 0);
        assert_eq!(buf.adjust_count(0), 0);
    }

    #[test]
    fn test_append_slides_when_prefix_covers() {
        let mut buf = IoBuffer::new(64);
        buf.put_slice(&seq(64));

        let mut sink = [0; 60];
        buf.read(&mut sink).unwrap();

        buf.append(&[0xcc; 20]);
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.len(), 24);
        assert_eq!(&buf.as_bytes()[..4], &seq(64)[60..]);
    }

    #[test]
    fn test_append_reallocates_otherwise() {
        let mut buf = IoBuffer::new(64);
        buf.put_slice(&seq(64));

        let mut sink = [0; 2];
        buf.read(&mut sink).unwrap();

        buf.append(&[0xcc; 20]);
        assert!(buf.capacity() >= 2 * 64 + 20);
        assert_eq!(buf.len(), 82);
        assert_eq!(&buf.as_bytes()[..62], &seq(64)[2..]);

        buf.append_byte(0xdd);
        assert_eq!(buf.len(), 83);
        assert_eq!(buf.as_bytes()[82], 0xdd);
    }

    #[test]
    fn test_read_from_appends_everything() {
        let data = seq(3000);
        let mut src = ChunkedReader::new(&data, 700);

        let mut buf = IoBuffer::from("head:");
        let total = buf.read_from(&mut src).unwrap();

        assert_eq!(total, 3000);
        assert_eq!(buf.len(), 5 + 3000);
        assert_eq!(&buf.as_bytes()[5..], &data[..]);
    }

    #[test]
    fn test_read_from_preserves_partial_progress() {
        let mut src = FailingReader {
            yield_first: 100,
            done: 0,
        };

        let mut buf = IoBuffer::new(0);
        let err = buf.read_from(&mut src).unwrap_err();

        assert_eq!(err.transferred(), 100);
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn test_write_to_drains_all() {
        let mut buf = IoBuffer::from("abcdef");
        let mut sink = Vec::new();

        assert_eq!(buf.write_to(&mut sink).unwrap(), 6);
        assert_eq!(sink, b"abcdef");
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_write_to_stops_on_zero_write() {
        let mut buf = IoBuffer::from("abcdefghijkl");
        let mut sink = LimitedSink {
            budget: 5,
            data: Vec::new(),
        };

        assert_eq!(buf.write_to(&mut sink).unwrap(), 5);
        assert_eq!(sink.data, b"abcde");
        assert_eq!(buf.as_bytes(), b"fghijkl");
    }

    #[test]
    fn test_write_to_error_preserves_progress() {
        let mut buf = IoBuffer::from("abcdefghijkl");
        let mut sink = FailingSink { accept_first: 4 };

        let err = buf.write_to(&mut sink).unwrap_err();
        assert_eq!(err.transferred(), 4);
        assert_eq!(buf.as_bytes(), b"efghijkl");
    }

    #[test]
    #[should_panic(expected = "sink reported writing")]
    fn test_write_to_overreporting_sink_panics() {
        let mut buf = IoBuffer::from("abc");
        buf.write_to(&mut OverreportingSink).unwrap();
    }

    #[test]
    fn test_free_then_checkout() {
        let mut buf = IoBuffer::new(1000);
        buf.put_slice(&seq(1000));
        buf.free();

        let buf = IoBuffer::new(1000);
        assert_eq!(buf.len(), 0);
        assert!(buf.capacity() >= 1000);
    }

    #[test]
    fn test_from_vec_adopts_allocation() {
        let mut buf = IoBuffer::from(vec![1, 2, 3]);

        assert_eq!(buf.as_bytes(), [1, 2, 3]);
        assert_eq!(buf.capacity(), 3);

        // Growing out of the adopted allocation moves to pooled storage.
        buf.put_slice(&[4, 5]);
        assert_eq!(buf.as_bytes(), [1, 2, 3, 4, 5]);
        assert!(buf.capacity() > 3);
    }

    #[test]
    fn test_new_eof() {
        let buf = IoBuffer::new_eof();
        assert!(buf.eof());
        assert_eq!(buf.len(), 0);

        let clone = buf.clone();
        assert!(clone.eof());
    }

    #[test]
    fn test_io_traits() {
        use std::io::Write;

        let mut buf = IoBuffer::new(0);
        buf.write_all(b"stream me").unwrap();

        let mut sink = Vec::new();
        // io::Read reports end of input as Ok(0), so copy terminates.
        assert_eq!(io::copy(&mut buf, &mut sink).unwrap(), 9);
        assert_eq!(sink, b"stream me");
    }

    /// 0, 1, 2, ... n-1 truncated to bytes.
    fn seq(n: usize) -> Vec<u8> {
        (0..n).map(|i| i as u8).collect()
    }

    struct ChunkedReader<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl<'a> ChunkedReader<'a> {
        fn new(data: &'a [u8], chunk: usize) -> Self {
            Self { data, chunk }
        }
    }

    impl io::Read for ChunkedReader<'_> {
        fn read(&mut self, dest: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(dest.len()).min(self.data.len());
            dest[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct FailingReader {
        yield_first: usize,
        done: usize,
    }

    impl io::Read for FailingReader {
        fn read(&mut self, dest: &mut [u8]) -> io::Result<usize> {
            if self.done >= self.yield_first {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = dest.len().min(self.yield_first - self.done);
            dest[..n].fill(0x11);
            self.done += n;
            Ok(n)
        }
    }

    struct LimitedSink {
        budget: usize,
        data: Vec<u8>,
    }

    impl io::Write for LimitedSink {
        fn write(&mut self, src: &[u8]) -> io::Result<usize> {
            let n = self.budget.min(src.len());
            self.budget -= n;
            self.data.extend_from_slice(&src[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingSink {
        accept_first: usize,
    }

    impl io::Write for FailingSink {
        fn write(&mut self, src: &[u8]) -> io::Result<usize> {
            if self.accept_first == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
            }
            let n = self.accept_first.min(src.len());
            self.accept_first = 0;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct OverreportingSink;

    impl io::Write for OverreportingSink {
        fn write(&mut self, src: &[u8]) -> io::Result<usize> {
            Ok(src.len() + 1)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(Vec<u8>),
        Append(Vec<u8>),
        Read(usize),
        Drain(usize),
        Reset,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            vec(any::<u8>(), 0..300).prop_map(Op::Put),
            vec(any::<u8>(), 0..300).prop_map(Op::Append),
            (0usize..400).prop_map(Op::Read),
            (0usize..400).prop_map(Op::Drain),
            Just(Op::Reset),
        ]
    }

    proptest! {
        /// Any sequence of operations leaves the unread region equal to
        /// what a plain vector of pending bytes would hold.
        #[test]
        fn test_matches_reference_model(ops in vec(op(), 0..40)) {
            let mut buf = IoBuffer::new(0);
            let mut model: Vec<u8> = Vec::new();

            for op in ops {
                match op {
                    Op::Put(data) => {
                        buf.put_slice(&data);
                        model.extend_from_slice(&data);
                    }
                    Op::Append(data) => {
                        buf.append(&data);
                        model.extend_from_slice(&data);
                    }
                    Op::Read(n) => {
                        let mut dest = vec![0; n];
                        match buf.read(&mut dest) {
                            Ok(got) => {
                                prop_assert_eq!(got, n.min(model.len()));
                                prop_assert_eq!(&dest[..got], &model[..got]);
                                model.drain(..got);
                            }
                            Err(err) => {
                                prop_assert!(matches!(&err, Error::Eof), "unexpected error: {}", err);
                                prop_assert!(model.is_empty());
                                prop_assert!(n > 0);
                            }
                        }
                    }
                    Op::Drain(n) => {
                        buf.drain(n);
                        if n <= model.len() {
                            model.drain(..n);
                        }
                    }
                    Op::Reset => {
                        buf.reset();
                        model.clear();
                    }
                }

                prop_assert_eq!(buf.len(), model.len());
                prop_assert_eq!(buf.as_bytes(), &model[..]);
            }
        }
    }
}
