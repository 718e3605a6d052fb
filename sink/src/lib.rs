//! Database sink
//!
//! Persists every sequenced trade into the `trades` table. Three write
//! modes share one run loop: one transaction per record, one transaction
//! per batch of prepared inserts, or one `COPY FROM STDIN` stream per
//! batch. A failed transaction is logged and its batch dropped; the
//! stream is not replayed into the store, backpressure comes from queue
//! fill upstream.

#![deny(warnings)]
#![deny(clippy::all)]

use anyhow::{Context, Result};
use common::{SinkConfig, SinkMode, StopFlag, TradeRecord};
use logger::{logline, AsyncLogger};
use pool::{Lease, PoolCore};
use postgres::{Client, NoTls, Statement};
use queue::Queue;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS trades (\
     message_type CHAR(1), \
     sequence_number BIGINT, \
     trade_id BIGINT, \
     timestamp BIGINT, \
     price DOUBLE PRECISION, \
     quantity DOUBLE PRECISION, \
     buyer_is_maker BOOLEAN, \
     best_match BOOLEAN, \
     symbol TEXT)";

const INSERT_SQL: &str = "INSERT INTO trades \
     (message_type, sequence_number, trade_id, timestamp, price, quantity, \
      buyer_is_maker, best_match, symbol) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";

const COPY_SQL: &str = "COPY trades \
     (message_type, sequence_number, trade_id, timestamp, price, quantity, \
      buyer_is_maker, best_match, symbol) \
     FROM STDIN";

/// One text-format `COPY` row, tab-separated.
fn copy_row(record: &TradeRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
        record.message_type as char,
        record.sequence_number as i64,
        record.trade_id as i64,
        record.timestamp as i64,
        record.price,
        record.quantity,
        if record.buyer_is_maker { 't' } else { 'f' },
        if record.best_match { 't' } else { 'f' },
        record.symbol
    )
}

/// Consumes sequenced records off its queue and writes them to Postgres.
pub struct DbSink<P, Q>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
{
    client: Client,
    insert: Statement,
    queue: Arc<Q>,
    mode: SinkMode,
    batch_size: usize,
    logger: Arc<AsyncLogger>,
    stop: StopFlag,
    _pool: PhantomData<P>,
}

impl<P, Q> DbSink<P, Q>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
{
    /// Connect, ensure the schema and prepare the insert statement.
    pub fn connect(
        config: &SinkConfig,
        queue: Arc<Q>,
        logger: Arc<AsyncLogger>,
        stop: StopFlag,
    ) -> Result<Self> {
        let mut client =
            Client::connect(&config.dsn, NoTls).context("connecting to the trade database")?;
        client
            .batch_execute(CREATE_TABLE_SQL)
            .context("ensuring the trades table")?;
        let insert = client
            .prepare(INSERT_SQL)
            .context("preparing the trade insert")?;
        logline!(logger, "db sink connected in {:?} mode", config.mode);
        Ok(Self {
            client,
            insert,
            queue,
            mode: config.mode,
            batch_size: config.batch_size,
            logger,
            stop,
            _pool: PhantomData,
        })
    }

    /// Drain the queue until stopped, then flush what is still buffered.
    pub fn run(&mut self) -> Result<()> {
        logline!(self.logger, "db sink running");
        match self.mode {
            SinkMode::Single => self.run_single(),
            SinkMode::Batched | SinkMode::Copy => self.run_batched(),
        }
        logline!(self.logger, "db sink stopped");
        Ok(())
    }

    fn run_single(&mut self) {
        loop {
            match self.queue.dequeue() {
                Some(lease) => {
                    if let Err(e) = self.commit_single(&lease) {
                        logline!(self.logger, "db commit failed, record dropped: {}", e);
                    }
                }
                None => {
                    if self.stop.is_stopped() {
                        return;
                    }
                    thread::yield_now();
                }
            }
        }
    }

    fn run_batched(&mut self) {
        let mut batch: Vec<Lease<P>> = Vec::with_capacity(self.batch_size);
        loop {
            match self.queue.dequeue() {
                Some(lease) => {
                    batch.push(lease);
                    if batch.len() >= self.batch_size {
                        self.flush(&mut batch);
                    }
                }
                None => {
                    // Empty queue flushes early so audit rows are not
                    // held hostage by a quiet feed.
                    if !batch.is_empty() {
                        self.flush(&mut batch);
                    }
                    if self.stop.is_stopped() {
                        return;
                    }
                    thread::yield_now();
                }
            }
        }
    }

    /// Commit the batch, log-and-drop on failure, release every lease.
    fn flush(&mut self, batch: &mut Vec<Lease<P>>) {
        let result = match self.mode {
            SinkMode::Batched => self.commit_batch(batch),
            _ => self.commit_copy(batch),
        };
        if let Err(e) = result {
            logline!(
                self.logger,
                "db commit failed, {} records dropped: {}",
                batch.len(),
                e
            );
        }
        batch.clear();
    }

    fn commit_single(&mut self, record: &TradeRecord) -> Result<()> {
        let mut txn = self.client.transaction()?;
        execute_insert(&mut txn, &self.insert, record)?;
        txn.commit()?;
        Ok(())
    }

    fn commit_batch(&mut self, batch: &[Lease<P>]) -> Result<()> {
        let mut txn = self.client.transaction()?;
        for lease in batch {
            execute_insert(&mut txn, &self.insert, lease)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn commit_copy(&mut self, batch: &[Lease<P>]) -> Result<()> {
        let mut txn = self.client.transaction()?;
        let mut writer = txn.copy_in(COPY_SQL)?;
        for lease in batch {
            writer.write_all(copy_row(lease).as_bytes())?;
        }
        writer.finish()?;
        txn.commit()?;
        Ok(())
    }
}

fn execute_insert(
    txn: &mut postgres::Transaction<'_>,
    insert: &Statement,
    record: &TradeRecord,
) -> Result<()> {
    let message_type = (record.message_type as char).to_string();
    let symbol = record.symbol.as_str().to_string();
    txn.execute(
        insert,
        &[
            &message_type,
            &(record.sequence_number as i64),
            &(record.trade_id as i64),
            &(record.timestamp as i64),
            &record.price,
            &record.quantity,
            &record.buyer_is_maker,
            &record.best_match,
            &symbol,
        ],
    )?;
    Ok(())
}
