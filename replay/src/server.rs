//! Replay server composing the snapshot server and the publisher

use crate::multicast::MulticastPublisher;
use crate::snapshot::SnapshotServer;
use crate::store::TradeStore;
use anyhow::Result;
use common::{ServerConfig, StopFlag};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::error;

/// Loads the store and runs the snapshot server and the multicast
/// publisher on their own threads.
pub struct ReplayServer {
    store: Arc<TradeStore>,
    config: ServerConfig,
    with_snapshot: bool,
    stop: StopFlag,
}

impl ReplayServer {
    /// Load every trade file under `data_dir`.
    pub fn load(
        data_dir: &Path,
        config: ServerConfig,
        with_snapshot: bool,
        stop: StopFlag,
    ) -> Result<Self> {
        Ok(Self {
            store: Arc::new(TradeStore::load_dir(data_dir)?),
            config,
            with_snapshot,
            stop,
        })
    }

    /// Run until the publisher finishes and the snapshot server stops.
    ///
    /// The publisher waits out the configured start delay first so
    /// receivers have time to join the group and connect their recovery
    /// channel.
    pub fn run(&self) -> Result<()> {
        let mut workers: Vec<thread::JoinHandle<Result<()>>> = Vec::new();

        if self.with_snapshot {
            let snapshot =
                SnapshotServer::bind(Arc::clone(&self.store), self.config.snapshot_port, self.stop.clone())?;
            workers.push(thread::spawn(move || snapshot.run()));
        }

        let publisher =
            MulticastPublisher::new(Arc::clone(&self.store), &self.config, self.stop.clone())?;
        let delay = Duration::from_millis(self.config.start_delay_ms);
        let stop = self.stop.clone();
        workers.push(thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            if stop.is_stopped() {
                return Ok(());
            }
            publisher.run()
        }));

        let mut first_error = None;
        for worker in workers {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("replay worker failed: {e}");
                    first_error.get_or_insert(e);
                }
                Err(_) => error!("replay worker panicked"),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Request shutdown of both workers.
    pub fn stop(&self) {
        self.stop.stop();
    }
}
