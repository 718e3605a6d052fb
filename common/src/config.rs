//! Pipeline configuration
//!
//! Every tunable the original expressed as a compile-time constant is a
//! field here, with the same defaults, and may be overridden through
//! `TICKPIPE_*` environment variables at the binary boundary.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::Ipv4Addr;
use std::str::FromStr;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Top-level configuration threaded into every constructor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Receiver-side feed and recovery settings.
    pub feed: FeedConfig,
    /// Replay-server settings.
    pub server: ServerConfig,
    /// Database sink settings.
    pub sink: SinkConfig,
    /// Aggregator publication settings.
    pub agg: AggConfig,
    /// Order book sizing.
    pub book: BookConfig,
}

impl Config {
    /// Defaults with `TICKPIPE_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self {
            feed: FeedConfig::from_env(),
            server: ServerConfig::from_env(),
            sink: SinkConfig::from_env(),
            agg: AggConfig::from_env(),
            book: BookConfig::from_env(),
        }
    }
}

/// Receiver, sequencer and recovery-client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Message pool capacity shared by the receiver-side components.
    pub pool_capacity: usize,
    /// Capacity of every bounded queue in the pipeline (power of two).
    pub queue_capacity: usize,
    /// Multicast group (or unicast address for loopback tests).
    pub multicast_addr: Ipv4Addr,
    /// UDP port the trade feed arrives on.
    pub multicast_port: u16,
    /// Snapshot server endpoint for gap recovery, `host:port`.
    pub recovery_endpoint: String,
    /// Bounded connect retries against the snapshot server.
    pub connect_attempts: u32,
    /// Fixed backoff between connect retries, milliseconds.
    pub connect_backoff_ms: u64,
    /// Readiness quantum while draining recovered records, milliseconds.
    pub recovery_timeout_ms: u64,
    /// Last sequence number already consumed; the sequencer resumes at the
    /// one after it. Zero starts from the beginning of the stream.
    pub resume_after: u64,
    /// Emit per-message debug lines through the async logger.
    pub debug: bool,
    /// Destination file for the receiver's data-plane log.
    pub log_file: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 1 << 18,
            queue_capacity: 1 << 10,
            multicast_addr: Ipv4Addr::new(239, 255, 0, 1),
            multicast_port: 30001,
            recovery_endpoint: "127.0.0.1:8084".to_string(),
            connect_attempts: 50,
            connect_backoff_ms: 200,
            recovery_timeout_ms: 5000,
            resume_after: 0,
            debug: false,
            log_file: "tickpipe-receiver.log".to_string(),
        }
    }
}

impl FeedConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pool_capacity: env_parse("TICKPIPE_POOL_CAPACITY", defaults.pool_capacity),
            queue_capacity: env_parse("TICKPIPE_QUEUE_CAPACITY", defaults.queue_capacity),
            multicast_addr: env_parse("TICKPIPE_MULTICAST_ADDR", defaults.multicast_addr),
            multicast_port: env_parse("TICKPIPE_MULTICAST_PORT", defaults.multicast_port),
            recovery_endpoint: env::var("TICKPIPE_RECOVERY_ENDPOINT")
                .unwrap_or(defaults.recovery_endpoint),
            connect_attempts: env_parse("TICKPIPE_CONNECT_ATTEMPTS", defaults.connect_attempts),
            connect_backoff_ms: env_parse(
                "TICKPIPE_CONNECT_BACKOFF_MS",
                defaults.connect_backoff_ms,
            ),
            recovery_timeout_ms: env_parse(
                "TICKPIPE_RECOVERY_TIMEOUT_MS",
                defaults.recovery_timeout_ms,
            ),
            resume_after: env_parse("TICKPIPE_RESUME_AFTER", defaults.resume_after),
            debug: env_parse("TICKPIPE_DEBUG", defaults.debug),
            log_file: env::var("TICKPIPE_LOG_FILE").unwrap_or(defaults.log_file),
        }
    }
}

/// Replay-server settings: snapshot endpoint and multicast emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port the snapshot server listens on.
    pub snapshot_port: u16,
    /// Multicast group the publisher emits to.
    pub multicast_addr: Ipv4Addr,
    /// UDP port the publisher emits to.
    pub multicast_port: u16,
    /// Microseconds to sleep between published records; zero for full rate.
    pub throttle_us: u64,
    /// Drop two records out of every `gap_every` to exercise recovery; zero
    /// disables synthetic gaps.
    pub gap_every: u64,
    /// Delay before the publisher starts emitting, giving receivers time to
    /// join, milliseconds.
    pub start_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            snapshot_port: 8084,
            multicast_addr: Ipv4Addr::new(239, 255, 0, 1),
            multicast_port: 30001,
            throttle_us: 0,
            gap_every: 0,
            start_delay_ms: 5000,
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            snapshot_port: env_parse("TICKPIPE_SNAPSHOT_PORT", defaults.snapshot_port),
            multicast_addr: env_parse("TICKPIPE_MULTICAST_ADDR", defaults.multicast_addr),
            multicast_port: env_parse("TICKPIPE_MULTICAST_PORT", defaults.multicast_port),
            throttle_us: env_parse("TICKPIPE_THROTTLE_US", defaults.throttle_us),
            gap_every: env_parse("TICKPIPE_GAP_EVERY", defaults.gap_every),
            start_delay_ms: env_parse("TICKPIPE_START_DELAY_MS", defaults.start_delay_ms),
        }
    }
}

/// How the database sink groups its writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkMode {
    /// One prepared insert per record, one transaction each.
    Single,
    /// One transaction per batch of prepared inserts.
    Batched,
    /// One `COPY FROM STDIN` stream per batch.
    Copy,
}

impl FromStr for SinkMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "batched" => Ok(Self::Batched),
            "copy" => Ok(Self::Copy),
            other => Err(format!("unknown sink mode '{other}'")),
        }
    }
}

/// Database sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Postgres connection string; empty disables the sink.
    pub dsn: String,
    /// Write grouping strategy.
    pub mode: SinkMode,
    /// Records per transaction in the batched and copy modes.
    pub batch_size: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            mode: SinkMode::Copy,
            batch_size: 1000,
        }
    }
}

impl SinkConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dsn: env::var("TICKPIPE_DB_DSN").unwrap_or(defaults.dsn),
            mode: env_parse("TICKPIPE_DB_MODE", defaults.mode),
            batch_size: env_parse("TICKPIPE_DB_BATCH_SIZE", defaults.batch_size),
        }
    }
}

/// Aggregator publication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggConfig {
    /// TCP port the VWAP publisher binds for subscribers.
    pub publish_port: u16,
}

impl Default for AggConfig {
    fn default() -> Self {
        Self { publish_port: 5555 }
    }
}

impl AggConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            publish_port: env_parse("TICKPIPE_PUBLISH_PORT", defaults.publish_port),
        }
    }
}

/// Order book sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    /// Bucket count of the order map (power of two).
    pub buckets: usize,
    /// Maximum live orders held at once.
    pub capacity: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            buckets: 1 << 20,
            capacity: 1 << 20,
        }
    }
}

impl BookConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            buckets: env_parse("TICKPIPE_BOOK_BUCKETS", defaults.buckets),
            capacity: env_parse("TICKPIPE_BOOK_CAPACITY", defaults.capacity),
        }
    }
}
