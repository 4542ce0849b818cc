use std::hint::black_box;
use std::io::{self, Read};
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use poolbuf::{DeadlineRead, IoBuffer, Pool, ReadSource};

/// Replays a fixed payload, then reports an expired deadline.
struct Replay {
    data: Vec<u8>,
    pos: usize,
}

impl Read for Replay {
    fn read(&mut self, dest: &mut [u8]) -> io::Result<usize> {
        let n = dest.len().min(self.data.len() - self.pos);
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "drained"));
        }
        dest[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl DeadlineRead for Replay {
    fn set_read_deadline(&mut self, _deadline: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

fn bench_put_read(c: &mut Criterion) {
    let payload = [0x5a; 1500];
    let mut buf = IoBuffer::new(2048);
    let mut dest = [0; 1500];

    c.bench_function("put_read_1500", |b| {
        b.iter(|| {
            buf.put_slice(black_box(&payload));
            buf.read(&mut dest).unwrap();
            black_box(&dest);
        })
    });
}

fn bench_grow_from_default(c: &mut Criterion) {
    let payload = [0x5a; 4096];

    c.bench_function("grow_from_default", |b| {
        b.iter(|| {
            let mut buf = IoBuffer::new(0);
            buf.put_slice(black_box(&payload));
            buf
        })
    });
}

fn bench_read_once(c: &mut Criterion) {
    let mut src = Replay {
        data: vec![0x5a; 64 * 1024],
        pos: 0,
    };
    let mut buf = IoBuffer::new(0);

    c.bench_function("read_once_64k", |b| {
        b.iter(|| {
            src.pos = 0;
            buf.reset();
            buf.read_once(ReadSource::deadline(&mut src), Duration::from_millis(10))
                .unwrap()
        })
    });
}

fn bench_pool_cycle(c: &mut Criterion) {
    let pool = Pool::new();

    c.bench_function("pool_cycle_1500", |b| {
        b.iter(|| {
            let storage = pool.checkout(1500);
            pool.recycle(black_box(storage));
        })
    });
}

criterion_group!(
    benches,
    bench_put_read,
    bench_grow_from_default,
    bench_read_once,
    bench_pool_cycle
);
criterion_main!(benches);
