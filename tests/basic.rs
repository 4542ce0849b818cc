use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::Duration;

use poolbuf::{DeadlineRead, Error, IoBuffer, ReadSource, MAX_READ, MIN_READ};

const SHORT_DEADLINE: Duration = Duration::from_millis(10);

/// A scripted stream: yields its pending bytes across however many
/// reads the caller makes, then reports an expired deadline. Records
/// every read attempt and deadline change for assertions.
struct ScriptedSource {
    pending: VecDeque<u8>,
    reads: usize,
    deadlines: Vec<Option<Duration>>,
}

impl ScriptedSource {
    fn with_total(total: usize) -> Self {
        Self {
            pending: (0..total).map(|i| i as u8).collect(),
            reads: 0,
            deadlines: Vec::new(),
        }
    }
}

impl Read for ScriptedSource {
    fn read(&mut self, dest: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        if self.pending.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "deadline expired",
            ));
        }

        let n = dest.len().min(self.pending.len());
        for slot in &mut dest[..n] {
            *slot = self.pending.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl DeadlineRead for ScriptedSource {
    fn set_read_deadline(&mut self, deadline: Option<Duration>) -> io::Result<()> {
        self.deadlines.push(deadline);
        Ok(())
    }
}

#[test]
fn test_read_once_gathers_pending_data() {
    let mut src = ScriptedSource::with_total(1200);
    let mut buf = IoBuffer::new(0);

    let duration = Duration::from_millis(50);
    let total = buf
        .read_once(ReadSource::deadline(&mut src), duration)
        .unwrap();

    assert_eq!(total, 1200);
    assert_eq!(buf.len(), 1200);
    let expected: Vec<u8> = (0..1200).map(|i| i as u8).collect();
    assert_eq!(buf.as_bytes(), &expected[..]);

    // Each attempt arms a deadline and disarms it afterwards: the
    // caller's duration first, the short follow-up for the rest.
    assert!(src.reads >= 2);
    assert_eq!(src.deadlines.len(), 2 * src.reads);
    assert_eq!(src.deadlines[0], Some(duration));
    for (i, deadline) in src.deadlines.iter().enumerate() {
        match (i % 2, i) {
            (0, 0) => assert_eq!(*deadline, Some(duration)),
            (0, _) => assert_eq!(*deadline, Some(SHORT_DEADLINE)),
            (1, _) => assert_eq!(*deadline, None),
            _ => unreachable!(),
        }
    }
}

#[test]
fn test_read_once_folds_followup_timeout_into_success() {
    // 1024 bytes fill the first two offers exactly, so the loop takes a
    // third read that times out. The timeout comes after data arrived
    // and must not surface as an error.
    let mut src = ScriptedSource::with_total(1024);
    let mut buf = IoBuffer::new(0);

    let total = buf
        .read_once(ReadSource::deadline(&mut src), Duration::from_secs(1))
        .unwrap();

    assert_eq!(total, 1024);
    assert_eq!(buf.len(), 1024);
    assert_eq!(src.reads, 3);
}

#[test]
fn test_read_once_first_timeout_is_an_error() {
    let mut src = ScriptedSource::with_total(0);
    let mut buf = IoBuffer::new(0);

    let err = buf
        .read_once(ReadSource::deadline(&mut src), Duration::from_millis(20))
        .unwrap_err();

    match err {
        Error::Io {
            transferred,
            source,
        } => {
            assert_eq!(transferred, 0);
            assert_eq!(source.kind(), io::ErrorKind::WouldBlock);
        }
        other => panic!("expected an I/O error, got {other:?}"),
    }
    assert_eq!(buf.len(), 0);
}

#[test]
fn test_read_once_stops_past_max_read() {
    let mut src = ScriptedSource::with_total(4 * MAX_READ);
    let mut buf = IoBuffer::new(0);

    let total = buf
        .read_once(ReadSource::deadline(&mut src), Duration::from_secs(1))
        .unwrap();

    // The loop stops at the first read that pushes the total past the
    // cap, so it overshoots by at most one offer.
    assert!(total > MAX_READ as u64);
    assert!(total < 2 * MAX_READ as u64);
    assert_eq!(buf.len(), total as usize);
}

#[test]
fn test_read_once_plain_source_reads_exactly_once() {
    let mut src = ScriptedSource::with_total(10_000);
    let mut buf = IoBuffer::new(0);

    let total = buf
        .read_once(ReadSource::plain(&mut src), Duration::from_secs(1))
        .unwrap();

    // One read, however much data is still pending, and no deadline
    // calls at all.
    assert_eq!(src.reads, 1);
    assert_eq!(total, buf.len() as u64);
    assert!(buf.len() < 10_000);
    assert!(src.deadlines.is_empty());
}

#[test]
fn test_read_once_appends_to_unread_data() {
    let mut buf = IoBuffer::from("header:");

    let mut src = ScriptedSource::with_total(600);
    let total = buf
        .read_once(ReadSource::deadline(&mut src), Duration::from_millis(20))
        .unwrap();

    assert_eq!(total, 600);
    assert_eq!(buf.len(), 7 + 600);
    assert_eq!(&buf.as_bytes()[..7], b"header:");
}

/// Frame a payload as [len u16 BE][payload].
fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(2 + payload.len());
    framed.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

#[test]
fn test_decode_loop_lifecycle() {
    let payloads: [&[u8]; 3] = [b"first frame", b"second", b"third and longest frame"];

    let mut wire = Vec::new();
    for payload in payloads {
        wire.extend_from_slice(&frame(payload));
    }
    // A trailing partial frame: length claims 500 bytes, only 3 arrive.
    wire.extend_from_slice(&500u16.to_be_bytes());
    wire.extend_from_slice(b"par");

    let mut src = ScriptedSource {
        pending: wire.iter().copied().collect(),
        reads: 0,
        deadlines: Vec::new(),
    };

    let mut buf = IoBuffer::new(0);
    buf.read_once(ReadSource::deadline(&mut src), Duration::from_millis(20))
        .unwrap();

    let mut decoded = Vec::new();
    loop {
        // Reading the header consumes it, so checkpoint the frame
        // boundary first; read preserves the mark.
        buf.mark();
        let mut header = [0u8; 2];
        match buf.read(&mut header) {
            Ok(2) => {}
            _ => {
                buf.restore();
                break;
            }
        }
        let frame_len = u16::from_be_bytes(header) as usize;

        match buf.cut(frame_len) {
            Some(frame) => decoded.push(frame),
            None => {
                // Incomplete frame: rewind to the marked boundary and
                // wait for more data.
                buf.restore();
                break;
            }
        }
    }

    assert_eq!(decoded.len(), 3);
    for (frame, payload) in decoded.iter().zip(payloads) {
        assert_eq!(frame.as_bytes(), payload);
    }
    // The partial frame is intact, header included.
    assert_eq!(buf.len(), 2 + 3);
    assert_eq!(buf.peek(2), Some(&500u16.to_be_bytes()[..]));

    for frame in decoded {
        frame.free();
    }
    buf.free();
}

#[test]
fn test_fill_drain_cycle_reuses_capacity() {
    let mut buf = IoBuffer::new(0);

    for round in 0..32 {
        let mut src = ScriptedSource::with_total(2 * MIN_READ);
        buf.read_once(ReadSource::deadline(&mut src), Duration::from_millis(20))
            .unwrap();

        let mut sink = Vec::new();
        buf.write_to(&mut sink).unwrap();
        assert_eq!(sink.len(), 2 * MIN_READ);
        assert_eq!(buf.len(), 0);

        // After the first round the buffer is already big enough; the
        // drained region is reclaimed in place instead of growing.
        if round > 0 {
            assert!(buf.capacity() >= 2 * MIN_READ);
        }
    }
}
