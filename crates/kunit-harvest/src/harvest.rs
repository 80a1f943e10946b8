//! Incremental collection of engine records from a run's output directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ktest::{self, KTest, RecordDecodeError};

/// How to treat a record that cannot be used yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestMode {
    /// The engine may still be writing: stop at the first unusable record and
    /// retry it on the next call.
    Live,
    /// The engine has exited: skip unusable records for good.
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordValue {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// One explored path: a value for every watched variable, in watched order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseRecord {
    pub ordinal: u32,
    pub values: Vec<RecordValue>,
}

impl TestCaseRecord {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.values
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.bytes.as_slice())
    }
}

#[derive(Debug, thiserror::Error)]
enum Unusable {
    #[error("{0}")]
    Decode(RecordDecodeError),
    #[error("Read failed: {0}")]
    Read(std::io::Error),
    #[error("No object for watched variable '{0}'")]
    Missing(String),
}

#[derive(Debug)]
pub struct Harvester {
    output_dir: PathBuf,
    next_ordinal: u32,
    records: Vec<TestCaseRecord>,
    skipped: Vec<u32>,
}

impl Harvester {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            next_ordinal: 1,
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn next_ordinal(&self) -> u32 {
        self.next_ordinal
    }

    /// Every record accepted so far, in ordinal order.
    pub fn records(&self) -> &[TestCaseRecord] {
        &self.records
    }

    /// Ordinals given up on during a final pass.
    pub fn skipped(&self) -> &[u32] {
        &self.skipped
    }

    pub fn record_path(&self, ordinal: u32) -> PathBuf {
        self.output_dir.join(format!("test{ordinal:06}.ktest"))
    }

    /// Scan forward from the first unfetched ordinal and return the records
    /// accepted by this call. Stops at the first missing file.
    pub fn fetch_new_records<S: AsRef<str>>(&mut self, watched: &[S], mode: HarvestMode) -> Vec<TestCaseRecord> {
        let first_new = self.records.len();
        loop {
            let ordinal = self.next_ordinal;
            let path = self.record_path(ordinal);
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => break,
                Err(error) => {
                    if self.give_up(ordinal, Unusable::Read(error), mode) {
                        continue;
                    }
                    break;
                }
            };

            match ktest::decode(&bytes)
                .map_err(Unusable::Decode)
                .and_then(|record| select(ordinal, &record, watched))
            {
                Ok(record) => {
                    debug!(ordinal, "accepted record");
                    self.records.push(record);
                    self.next_ordinal += 1;
                }
                Err(reason) => {
                    if !self.give_up(ordinal, reason, mode) {
                        break;
                    }
                }
            }
        }

        let fresh = self.records[first_new..].to_vec();
        if !fresh.is_empty() {
            info!(count = fresh.len(), total = self.records.len(), "harvested records");
        }
        fresh
    }

    /// In `Final` mode, skip `ordinal` and report that scanning may go on.
    fn give_up(&mut self, ordinal: u32, reason: Unusable, mode: HarvestMode) -> bool {
        match mode {
            HarvestMode::Live => {
                debug!(ordinal, %reason, "record not ready; will retry");
                false
            }
            HarvestMode::Final => {
                warn!(ordinal, %reason, "discarding unusable record");
                self.skipped.push(ordinal);
                self.next_ordinal += 1;
                true
            }
        }
    }
}

/// Keep only watched objects; all of them must be present.
fn select<S: AsRef<str>>(ordinal: u32, record: &KTest, watched: &[S]) -> Result<TestCaseRecord, Unusable> {
    let values = watched
        .iter()
        .map(|name| {
            let name = name.as_ref();
            record
                .object(name)
                .map(|object| RecordValue {
                    name: name.to_string(),
                    bytes: object.bytes.clone(),
                })
                .ok_or_else(|| Unusable::Missing(name.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TestCaseRecord { ordinal, values })
}
