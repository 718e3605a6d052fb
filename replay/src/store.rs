//! CSV-backed trade record store

use anyhow::{bail, Context, Result};
use common::messages::TRADE_MESSAGE_TYPE;
use common::{Symbol, TradeRecord};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

/// Immutable record store loaded once at startup.
///
/// Columns per line: `trade_id, price, quantity, quote_quantity (ignored),
/// timestamp, buyer_is_maker, best_match`. The symbol comes from the file
/// name prefix before the first `-`. When several files are loaded the
/// merged records are sorted by timestamp and sequence numbers are
/// assigned densely in that order.
#[derive(Debug)]
pub struct TradeStore {
    records: Vec<TradeRecord>,
}

impl TradeStore {
    /// Load every `*.csv` file under `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("reading trade directory {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("csv")
            })
            .collect();
        files.sort();
        if files.is_empty() {
            bail!("no csv files under {}", dir.display());
        }
        Self::load_files(&files)
    }

    /// Load an explicit file set.
    pub fn load_files(files: &[PathBuf]) -> Result<Self> {
        let mut records = Vec::new();
        for path in files {
            let symbol = symbol_of(path);
            let before = records.len();
            read_file(path, symbol, &mut records)?;
            info!(
                "loaded {} trades of symbol {} from {}",
                records.len() - before,
                symbol,
                path.display()
            );
        }
        Ok(Self::from_records(records))
    }

    /// Build a store from already-parsed records; they are sorted by
    /// timestamp and renumbered densely like the file path.
    pub fn from_records(mut records: Vec<TradeRecord>) -> Self {
        records.sort_by_key(|record| record.timestamp);
        for (index, record) in records.iter_mut().enumerate() {
            record.sequence_number = index as u64;
        }
        info!("trade store holds {} records", records.len());
        Self { records }
    }

    /// Record at `index`, which equals its sequence number.
    pub fn get(&self, index: usize) -> Option<&TradeRecord> {
        self.records.get(index)
    }

    /// Number of records in the store.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in sequence order.
    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }
}

/// Symbol is the file name up to the first `-`, or the whole stem when
/// there is none (`ETHUSDC-trades-2025-06-20.csv` -> `ETHUSDC`).
fn symbol_of(path: &Path) -> Symbol {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let prefix = stem.split('-').next().unwrap_or(stem);
    Symbol::new(prefix)
}

fn read_file(path: &Path, symbol: Symbol, records: &mut Vec<TradeRecord>) -> Result<()> {
    let file =
        fs::File::open(path).with_context(|| format!("opening trade file {}", path.display()))?;
    for (line_number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_line(&line, symbol).with_context(|| {
            format!("parsing {} line {}", path.display(), line_number + 1)
        })?;
        records.push(record);
    }
    Ok(())
}

fn parse_line(line: &str, symbol: Symbol) -> Result<TradeRecord> {
    let mut fields = line.split(',');
    let mut next = |name: &'static str| {
        fields
            .next()
            .map(str::trim)
            .with_context(|| format!("missing column {name}"))
    };

    let trade_id = next("trade_id")?.parse::<u64>().context("trade_id")?;
    let price = next("price")?.parse::<f64>().context("price")?;
    let quantity = next("quantity")?.parse::<f64>().context("quantity")?;
    // quote_quantity is price * quantity, nothing to keep.
    next("quote_quantity")?;
    let timestamp = next("timestamp")?.parse::<u64>().context("timestamp")?;
    let buyer_is_maker = parse_bool(next("buyer_is_maker")?)?;
    let best_match = parse_bool(next("best_match")?)?;

    Ok(TradeRecord {
        message_type: TRADE_MESSAGE_TYPE,
        sequence_number: 0,
        trade_id,
        timestamp,
        price,
        quantity,
        buyer_is_maker,
        best_match,
        symbol,
    })
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "True" | "true" => Ok(true),
        "False" | "false" => Ok(false),
        other => bail!("not a boolean: {other}"),
    }
}
