//! Per-sub-event severity artifact files and their merge.
//!
//! The external estimator writes one CSV per sub-event, named
//! `{subEventId}_metrics.csv`, into a shared directory. Each file is fully
//! overwritten on rerun, never appended, so re-running any batch is
//! idempotent. The merge concatenates every artifact, de-duplicates on
//! sub-event id (first wins), and sorts, which makes it associative and
//! commutative over batch completion order.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::progress::ProgressCallback;
use crate::{SeverityError, SeverityRecord};

const ARTIFACT_SUFFIX: &str = "_metrics.csv";

/// A directory of per-sub-event severity artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the artifact directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the artifact path for a sub-event.
    #[must_use]
    pub fn record_path(&self, sub_event_id: &str) -> PathBuf {
        self.dir.join(format!("{sub_event_id}{ARTIFACT_SUFFIX}"))
    }

    /// Writes (fully overwriting) the artifact for one sub-event.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the CSV
    /// cannot be written.
    pub fn write_record(&self, record: &SeverityRecord) -> Result<(), SeverityError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(&record.sub_event_id);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads the artifact for one sub-event; `None` if absent.
    ///
    /// A missing artifact is an estimator-unavailable outcome, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn read_record(&self, sub_event_id: &str) -> Result<Option<SeverityRecord>, SeverityError> {
        let path = self.record_path(sub_event_id);
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(&path)?;
        match reader.deserialize().next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Reads every `*.csv` artifact in the directory and merges them.
    ///
    /// Files are visited in path order and duplicate sub-event ids keep the
    /// first row, so the result is independent of batch completion order.
    /// The merged rows come back sorted by sub-event id.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or any artifact
    /// fails to parse.
    pub fn load_merged(
        &self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<SeverityRecord>, SeverityError> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                paths.push(path);
            }
        }
        paths.sort();

        progress.set_total(paths.len() as u64);
        let mut merged: BTreeMap<String, SeverityRecord> = BTreeMap::new();
        let mut duplicates = 0_usize;
        for path in &paths {
            let mut reader = csv::Reader::from_path(path)?;
            for row in reader.deserialize() {
                let record: SeverityRecord = row?;
                if merged.contains_key(&record.sub_event_id) {
                    duplicates += 1;
                    continue;
                }
                merged.insert(record.sub_event_id.clone(), record);
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        if duplicates > 0 {
            log::warn!("Merged artifacts contained {duplicates} duplicate sub-event ids; kept first");
        }
        log::info!("Merged {} artifact files into {} severity rows", paths.len(), merged.len());

        Ok(merged.into_values().collect())
    }

    /// Returns the ids that have no artifact yet, preserving input order.
    #[must_use]
    pub fn pending_ids<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        ids.into_iter()
            .filter(|id| !self.record_path(id).exists())
            .map(str::to_string)
            .collect()
    }
}

/// Writes a merged severity table to a single CSV.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_merged(path: &Path, records: &[SeverityRecord]) -> Result<(), SeverityError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a merged severity table into an id-keyed map.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_merged(path: &Path) -> Result<BTreeMap<String, SeverityRecord>, SeverityError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records: BTreeMap<String, SeverityRecord> = BTreeMap::new();
    for row in reader.deserialize() {
        let record: SeverityRecord = row?;
        records.entry(record.sub_event_id.clone()).or_insert(record);
    }
    Ok(records)
}

/// Writes sub-event id lists as `{prefix}_{n}.txt` batch files for external
/// array jobs, one id per line.
///
/// # Errors
///
/// Returns an error if `batch_size` is zero or a file cannot be written.
pub fn write_batches(
    dir: &Path,
    prefix: &str,
    ids: &[String],
    batch_size: usize,
) -> Result<Vec<PathBuf>, SeverityError> {
    if batch_size == 0 {
        return Err(SeverityError::InvalidBatchSize);
    }
    fs::create_dir_all(dir)?;

    let mut paths = Vec::new();
    for (index, chunk) in ids.chunks(batch_size).enumerate() {
        let path = dir.join(format!("{prefix}_{index}.txt"));
        let mut file = fs::File::create(&path)?;
        for id in chunk {
            writeln!(file, "{id}")?;
        }
        paths.push(path);
    }

    log::info!(
        "Wrote {} batch files of up to {batch_size} ids under {}",
        paths.len(),
        dir.display()
    );
    Ok(paths)
}
