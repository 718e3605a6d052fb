//! Asynchronous logger for the pipeline's data plane
//!
//! Producers format into pool-leased fixed-size records and enqueue them
//! onto a lock-free MPMC ring; one dedicated writer thread drains the
//! ring, prefixes each line with a nanosecond timestamp and flushes.
//! Nothing on the producer side blocks or allocates: an exhausted pool or
//! full ring drops the line and bumps a counter instead.
//!
//! Control-plane logging in the binaries goes through `tracing`; this
//! logger is the one handed to hot-path components.

#![deny(warnings)]
#![deny(clippy::all)]

use pool::{Lease, PoolAlloc, TaggedPool};
use queue::{MpmcRing, Queue};
use std::fmt::{self, Write as _};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Fixed formatting buffer per log record; longer lines truncate.
pub const RECORD_CAPACITY: usize = 512;

/// Consecutive empty dequeues before the writer downgrades from yielding
/// to sleeping.
const SPIN_LIMIT: u32 = 1000;

/// Idle sleep once the spin budget is spent.
const IDLE_SLEEP: Duration = Duration::from_micros(50);

/// One formatted log line in pool storage.
pub struct LogRecord {
    buffer: [u8; RECORD_CAPACITY],
    len: usize,
}

impl Default for LogRecord {
    fn default() -> Self {
        Self {
            buffer: [0; RECORD_CAPACITY],
            len: 0,
        }
    }
}

impl LogRecord {
    fn clear(&mut self) {
        self.len = 0;
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }
}

impl fmt::Write for LogRecord {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = RECORD_CAPACITY - self.len;
        let n = s.len().min(room);
        self.buffer[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

type RecordPool = TaggedPool<LogRecord>;

struct Shared {
    pool: Arc<RecordPool>,
    ring: MpmcRing<Lease<RecordPool>>,
    run: AtomicBool,
    dropped: AtomicU64,
}

/// Scoped asynchronous logger; releases its writer thread on drop after
/// draining everything still queued.
pub struct AsyncLogger {
    shared: Arc<Shared>,
    writer: Option<thread::JoinHandle<()>>,
}

impl AsyncLogger {
    /// Start the writer thread over the given sink.
    ///
    /// `capacity` sizes both the record pool and the ring (rounded up to
    /// a power of two for the ring).
    pub fn new(out: Box<dyn Write + Send>, capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            pool: Arc::new(TaggedPool::new(capacity)),
            ring: MpmcRing::new(capacity.next_power_of_two()),
            run: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
        });
        let writer = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("logger".to_string())
                .spawn(move || writer_loop(&shared, out))
                .expect("spawn logger thread")
        };
        Self {
            shared,
            writer: Some(writer),
        }
    }

    /// Queue one formatted line. Never blocks; drops the line when the
    /// pool or ring is saturated.
    pub fn log(&self, args: fmt::Arguments<'_>) {
        let Some(mut lease) = self.shared.pool.allocate() else {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        lease.clear();
        let _ = lease.write_fmt(args);
        if self.shared.ring.enqueue(lease).is_err() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Queue the line and mirror it to stderr for fatal conditions.
    pub fn fatal(&self, args: fmt::Arguments<'_>) {
        eprintln!("{args}");
        self.log(args);
    }

    /// Lines lost to pool or ring saturation so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for AsyncLogger {
    fn drop(&mut self) {
        self.shared.run.store(false, Ordering::Relaxed);
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

fn timestamp_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

fn write_record(out: &mut dyn Write, record: &LogRecord) {
    let _ = write!(out, "[{}] | ", timestamp_ns());
    let _ = out.write_all(record.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn writer_loop(shared: &Shared, mut out: Box<dyn Write + Send>) {
    let mut spin = 0u32;
    loop {
        if let Some(lease) = shared.ring.dequeue() {
            write_record(&mut *out, &lease);
            spin = 0;
            continue;
        }
        // Drain fully before honoring shutdown.
        if !shared.run.load(Ordering::Relaxed) {
            break;
        }
        spin += 1;
        if spin < SPIN_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(IDLE_SLEEP);
            spin = 0;
        }
    }
    let dropped = shared.dropped.load(Ordering::Relaxed);
    if dropped > 0 {
        let _ = writeln!(out, "[{}] | logger dropped {} lines", timestamp_ns(), dropped);
        let _ = out.flush();
    }
}

/// Format-and-log convenience over [`AsyncLogger::log`].
#[macro_export]
macro_rules! logline {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log(::core::format_args!($($arg)*))
    };
}
