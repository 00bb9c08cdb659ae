//! Bounded CSV reader.
//!
//! Large inputs are read in fixed-size batches. Pending batches are merged
//! into one combined table whenever `compaction_threshold` of them have
//! accumulated, so at most `batch_size * compaction_threshold` rows sit in
//! uncompacted batches at any time. Small inputs skip batching entirely.
//! Either way the caller receives a fully materialized table.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{RawRow, REQUIRED_COLUMNS};
use csv::{ErrorKind, ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Malformed rows beyond this many are counted but not logged individually.
const MALFORMED_LOG_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadStats {
    pub total_rows: usize,
    pub malformed_rows: usize,
    pub batches_read: usize,
    pub compactions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
    pub stats: ReadStats,
}

pub fn load_table(path: &Path, cfg: &AnalysisConfig) -> AnalysisResult<RawTable> {
    let name = path.display().to_string();
    let file = File::open(path).map_err(|e| AnalysisError::ingestion(&name, e))?;
    let size = file.metadata().ok().map(|m| m.len());
    read_table(file, &name, size, cfg)
}

/// Read a whole table from `source`. `size_hint` is the source length in
/// bytes when known; unknown sizes always take the batched path.
pub fn read_table<R: Read>(
    source: R,
    name: &str,
    size_hint: Option<u64>,
    cfg: &AnalysisConfig,
) -> AnalysisResult<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(source);

    let headers = rdr
        .headers()
        .map_err(|e| AnalysisError::ingestion(name, e))?
        .clone();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(AnalysisError::ingestion(name, "no header row"));
    }
    check_schema(&headers)?;

    let single_pass = size_hint.is_some_and(|n| n < cfg.small_input_bytes);
    let mut acc = if single_pass {
        BatchAccumulator::unbounded()
    } else {
        BatchAccumulator::new(cfg.batch_size, cfg.compaction_threshold)
    };
    debug!(name, single_pass, ?size_hint, "Reading input table");

    let mut total_rows = 0usize;
    let mut malformed_rows = 0usize;
    for result in rdr.deserialize::<RawRow>() {
        total_rows += 1;
        match result {
            Ok(row) => acc.push(row),
            Err(e) if matches!(e.kind(), ErrorKind::Io(_)) => {
                return Err(AnalysisError::ingestion(name, e));
            }
            Err(e) => {
                malformed_rows += 1;
                if malformed_rows <= MALFORMED_LOG_LIMIT {
                    warn!(name, row = total_rows, error = %e, "Skipping malformed row");
                }
            }
        }
    }

    let (rows, batches_read, compactions) = acc.finish();
    info!(
        name,
        total_rows, malformed_rows, batches_read, compactions, "Input table loaded"
    );
    Ok(RawTable {
        rows,
        stats: ReadStats {
            total_rows,
            malformed_rows,
            batches_read,
            compactions,
        },
    })
}

/// Fails with every required column the header lacks.
pub fn check_schema(headers: &StringRecord) -> AnalysisResult<()> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .map(|col| col.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::Schema { missing })
    }
}

struct BatchAccumulator {
    batch_size: Option<usize>,
    compaction_threshold: usize,
    current: Vec<RawRow>,
    pending: Vec<Vec<RawRow>>,
    combined: Vec<RawRow>,
    batches_read: usize,
    compactions: usize,
}

impl BatchAccumulator {
    fn new(batch_size: usize, compaction_threshold: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size: Some(batch_size),
            compaction_threshold: compaction_threshold.max(1),
            current: Vec::with_capacity(batch_size),
            pending: Vec::new(),
            combined: Vec::new(),
            batches_read: 0,
            compactions: 0,
        }
    }

    fn unbounded() -> Self {
        Self {
            batch_size: None,
            compaction_threshold: 1,
            current: Vec::new(),
            pending: Vec::new(),
            combined: Vec::new(),
            batches_read: 0,
            compactions: 0,
        }
    }

    fn push(&mut self, row: RawRow) {
        self.current.push(row);
        if let Some(size) = self.batch_size {
            if self.current.len() >= size {
                self.seal_batch(size);
            }
        }
    }

    fn seal_batch(&mut self, next_capacity: usize) {
        let batch = std::mem::replace(&mut self.current, Vec::with_capacity(next_capacity));
        self.pending.push(batch);
        self.batches_read += 1;
        if self.pending.len() >= self.compaction_threshold {
            self.compact();
            self.compactions += 1;
            debug!(
                rows = self.combined.len(),
                compactions = self.compactions,
                "Compacted pending batches"
            );
        }
    }

    fn compact(&mut self) {
        let incoming: usize = self.pending.iter().map(Vec::len).sum();
        self.combined.reserve(incoming);
        for batch in self.pending.drain(..) {
            self.combined.extend(batch);
        }
    }

    /// Returns `(rows, batches_read, compactions)`.
    fn finish(mut self) -> (Vec<RawRow>, usize, usize) {
        if !self.current.is_empty() {
            let tail = std::mem::take(&mut self.current);
            self.pending.push(tail);
            self.batches_read += 1;
        }
        self.compact();
        (self.combined, self.batches_read, self.compactions)
    }
}
