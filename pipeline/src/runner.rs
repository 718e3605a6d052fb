//! Pipeline construction and thread orchestration

use crate::builder::BookBuilder;
use crate::fanout::{Branch, FanOut};
use agg::{Aggregator, TcpPublisher};
use anyhow::{Context, Result};
use book::OrderBook;
use common::{Config, StopFlag, TradeRecord};
use feed::{MulticastReceiver, Sequencer, TcpRecovery};
use logger::{logline, AsyncLogger};
use parking_lot::Mutex;
use pool::{Lease, TaggedPool};
use queue::SpscRing;
use sink::DbSink;
use std::fmt::Display;
use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

type Pool = TaggedPool<TradeRecord>;
type Ring = SpscRing<Lease<Pool>>;

/// Running pipeline: stop it, then join it.
pub struct PipelineHandle {
    stop: StopFlag,
    threads: Vec<thread::JoinHandle<()>>,
    book: Arc<Mutex<OrderBook>>,
    feed_addr: SocketAddr,
    // Kept alive until every component thread has exited.
    logger: Arc<AsyncLogger>,
}

impl PipelineHandle {
    /// Request shutdown of every stage.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// True once shutdown was requested, by a caller or by a failing
    /// component.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Address the receiver is listening on.
    pub fn feed_addr(&self) -> SocketAddr {
        self.feed_addr
    }

    /// The shared order book built from the sequenced stream.
    pub fn book(&self) -> Arc<Mutex<OrderBook>> {
        Arc::clone(&self.book)
    }

    /// Wait for every stage to exit.
    pub fn join(mut self) {
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        logline!(self.logger, "pipeline joined");
    }
}

/// Builds and starts the canonical receiver topology.
pub struct ReceiverPipeline;

impl ReceiverPipeline {
    /// Connect the recovery channel, bind the feed socket and spawn
    /// every stage. The returned handle owns the threads.
    pub fn start(config: &Config) -> Result<PipelineHandle> {
        let stop = StopFlag::new();
        let log_out: Box<dyn std::io::Write + Send> = Box::new(
            File::create(&config.feed.log_file)
                .with_context(|| format!("creating log file {}", config.feed.log_file))?,
        );
        let logger = Arc::new(AsyncLogger::new(log_out, 4096));
        logline!(logger, "pipeline starting");

        let pool = Arc::new(Pool::new(config.feed.pool_capacity));
        let recv_queue: Arc<Ring> = Arc::new(Ring::new(config.feed.queue_capacity));
        let send_queue: Arc<Ring> = Arc::new(Ring::new(config.feed.queue_capacity));

        let receiver = MulticastReceiver::bind(
            &config.feed,
            Arc::clone(&pool),
            Arc::clone(&recv_queue),
            Arc::clone(&logger),
            stop.clone(),
        )?;
        let feed_addr = receiver.local_addr()?;

        let recovery = TcpRecovery::connect(&config.feed, Arc::clone(&logger))
            .context("establishing the recovery channel")?;
        let mut sequencer = Sequencer::new(
            Arc::clone(&recv_queue),
            Arc::clone(&send_queue),
            Arc::clone(&pool),
            recovery,
            Arc::clone(&logger),
            stop.clone(),
            config.feed.resume_after,
            config.feed.debug,
        );

        // One SPSC branch per consumer, each with its own pool so a slow
        // consumer only exhausts its own slots.
        let mut branches: Vec<Branch<Pool, Ring>> = Vec::new();
        let mut threads: Vec<thread::JoinHandle<()>> = Vec::new();

        let book = Arc::new(Mutex::new(OrderBook::new(
            config.book.buckets,
            config.book.capacity,
        )));
        {
            let branch = new_branch(config, &mut branches);
            let builder = BookBuilder::new(
                branch,
                Arc::clone(&book),
                Arc::clone(&logger),
                stop.clone(),
            );
            threads.push(spawn_component("book-builder", &stop, &logger, move || {
                builder.run()
            }));
        }

        {
            let branch = new_branch(config, &mut branches);
            let publisher = TcpPublisher::bind(config.agg.publish_port, stop.clone())?;
            let mut aggregator =
                Aggregator::new(branch, publisher, Arc::clone(&logger), stop.clone());
            threads.push(spawn_component("aggregator", &stop, &logger, move || {
                aggregator.run();
                Ok::<(), common::Error>(())
            }));
        }

        if config.sink.dsn.is_empty() {
            info!("db sink disabled: no dsn configured");
        } else {
            let branch = new_branch(config, &mut branches);
            let mut db_sink =
                DbSink::connect(&config.sink, branch, Arc::clone(&logger), stop.clone())?;
            threads.push(spawn_component("db-sink", &stop, &logger, move || {
                db_sink.run()
            }));
        }

        let fanout = FanOut::new(
            Arc::clone(&send_queue),
            branches,
            Arc::clone(&logger),
            stop.clone(),
        );
        threads.push(spawn_component("fan-out", &stop, &logger, move || {
            fanout.run();
            Ok::<(), common::Error>(())
        }));

        threads.push(spawn_component("sequencer", &stop, &logger, move || {
            sequencer.run()
        }));
        threads.push(spawn_component("receiver", &stop, &logger, move || {
            receiver.run()
        }));

        info!("pipeline started, feed on {feed_addr}");
        Ok(PipelineHandle {
            stop,
            threads,
            book,
            feed_addr,
            logger,
        })
    }
}

/// Create a consumer branch and hand back its queue for the consumer.
fn new_branch(config: &Config, branches: &mut Vec<Branch<Pool, Ring>>) -> Arc<Ring> {
    let branch = Branch {
        pool: Arc::new(Pool::new(config.feed.pool_capacity)),
        queue: Arc::new(Ring::new(config.feed.queue_capacity)),
    };
    let queue = Arc::clone(&branch.queue);
    branches.push(branch);
    queue
}

/// Run a component on its own thread; a fatal error logs to both planes
/// and brings the whole pipeline down.
fn spawn_component<F, E>(
    name: &'static str,
    stop: &StopFlag,
    logger: &Arc<AsyncLogger>,
    component: F,
) -> thread::JoinHandle<()>
where
    F: FnOnce() -> std::result::Result<(), E> + Send + 'static,
    E: Display,
{
    let stop = stop.clone();
    let logger = Arc::clone(logger);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            if let Err(e) = component() {
                error!("{name} failed: {e}");
                logger.fatal(format_args!("{name} failed: {e}"));
                stop.stop();
            }
        })
        .expect("spawn component thread")
}
