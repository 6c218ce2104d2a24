//! Per-file k-mer tables and the master vocabulary shared by all of them.
//!
//! Every ingested file gets its own table (k-mer → count) named after the
//! file's path. The master table collects the k-mers that make up the
//! feature space: the union of all files in [`VocabularyMode::Union`], or
//! only the k-mers common to every file in [`VocabularyMode::Intersection`].
//! The `meta` table remembers how the counts were made so later additions
//! are counted the same way.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::counter::{CountParams, KmerCounts, RecordBoundaries};
use crate::errors::{KmerResult, Phase};
use crate::progress::{Observer, Progress};
use crate::store::{Store, WriteTxn};
use crate::{bail, count_files};

pub const MASTER_TABLE: &str = "master";
pub const META_TABLE: &str = "meta";
const FILE_TABLE_PREFIX: &str = "file:";

/// Value stored for every master k-mer; only the keys matter.
pub const MASTER_SENTINEL: u64 = 0;

const META_KMER_LENGTH: &[u8] = b"kmer_length";
const META_MIN_COUNT: &[u8] = b"min_count";
const META_BOUNDARIES: &[u8] = b"boundaries";
const META_MODE: &[u8] = b"mode";

pub fn file_table_name(file: &str) -> String {
    format!("{}{}", FILE_TABLE_PREFIX, file)
}

/// The file identifier behind a table name, if it is a file table.
pub fn file_from_table_name(name: &str) -> Option<&str> {
    name.strip_prefix(FILE_TABLE_PREFIX)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum VocabularyMode {
    /// Every k-mer seen in any file is a feature.
    Union,
    /// Only k-mers present in every file are features.
    Intersection,
}

impl VocabularyMode {
    fn code(self) -> u64 {
        match self {
            VocabularyMode::Union => 0,
            VocabularyMode::Intersection => 1,
        }
    }

    fn from_code(code: u64) -> KmerResult<Self> {
        match code {
            0 => Ok(VocabularyMode::Union),
            1 => Ok(VocabularyMode::Intersection),
            other => bail!("unknown vocabulary mode {}", other),
        }
    }
}

impl Default for VocabularyMode {
    fn default() -> Self {
        VocabularyMode::Union
    }
}

/// What a store was built with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub params: CountParams,
    pub mode: VocabularyMode,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub files: usize,
    /// Number of (k-mer, count) pairs written into file tables.
    pub kmers_written: u64,
    pub vocabulary_size: u64,
}

pub fn read_meta(store: &Store) -> KmerResult<Option<StoreMeta>> {
    store.read(|txn| {
        let table = match txn.table(META_TABLE)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let (kmer_length, min_count, boundaries, mode) = match (
            table.get(META_KMER_LENGTH)?,
            table.get(META_MIN_COUNT)?,
            table.get(META_BOUNDARIES)?,
            table.get(META_MODE)?,
        ) {
            (Some(k), Some(m), Some(b), Some(mode)) => (k, m, b, mode),
            _ => return Ok(None),
        };
        Ok(Some(StoreMeta {
            params: CountParams {
                kmer_length: kmer_length as usize,
                min_count,
                boundaries: RecordBoundaries::from_code(boundaries)?,
            },
            mode: VocabularyMode::from_code(mode)?,
        }))
    })
}

/// Record the parameters of this ingest, refusing ones that don't match
/// the counts already in the store.
pub(crate) fn record_meta(txn: &WriteTxn<'_>, meta: &StoreMeta) -> KmerResult<()> {
    let mut table = txn.table(META_TABLE)?;
    if let Some(kmer_length) = table.get(META_KMER_LENGTH)? {
        let existing = CountParams {
            kmer_length: kmer_length as usize,
            min_count: table.get(META_MIN_COUNT)?.unwrap_or(0),
            boundaries: RecordBoundaries::from_code(table.get(META_BOUNDARIES)?.unwrap_or(0))?,
        };
        if let Some((name, v1, v2)) = existing.check_compatibility(&meta.params) {
            bail!(
                "store was built with {} {}, but {} was requested",
                name,
                v1,
                v2
            );
        }
        let existing_mode = VocabularyMode::from_code(table.get(META_MODE)?.unwrap_or(0))?;
        if existing_mode != meta.mode {
            bail!(
                "store holds a {:?} vocabulary, cannot ingest as {:?}",
                existing_mode,
                meta.mode
            );
        }
    }
    table.put(META_KMER_LENGTH, meta.params.kmer_length as u64, true)?;
    table.put(META_MIN_COUNT, meta.params.min_count, true)?;
    table.put(META_BOUNDARIES, meta.params.boundaries.code(), true)?;
    table.put(META_MODE, meta.mode.code(), true)?;
    Ok(())
}

/// Reject empty batches and files listed twice.
pub fn validate_files(files: &[&str]) -> KmerResult<()> {
    if files.is_empty() {
        bail!("no files were given");
    }
    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        if !seen.insert(*file) {
            bail!("{} was listed more than once", file);
        }
    }
    Ok(())
}

/// Replace the contents of `file`'s table with `counts`.
pub(crate) fn write_file_table(
    txn: &WriteTxn<'_>,
    file: &str,
    counts: &KmerCounts,
) -> KmerResult<u64> {
    let mut table = txn.table(&file_table_name(file))?;
    let cleared = table.clear()?;
    for (kmer, count) in &counts.counts {
        table.put(kmer, *count, true)?;
    }
    debug!(file, cleared, written = counts.len(), "wrote file table");
    Ok(counts.len() as u64)
}

/// Count `files` and fold them into the store, growing the master table to
/// the union of everything it has seen.
pub fn ingest_union(
    store: &Store,
    files: &[&str],
    params: &CountParams,
    observer: Observer<'_>,
) -> KmerResult<IngestSummary> {
    params.validate()?;
    validate_files(files)?;
    info!(files = files.len(), k = params.kmer_length, "counting files");
    let counted = count_files(files, params)?;

    let meta = StoreMeta {
        params: *params,
        mode: VocabularyMode::Union,
    };
    store.write(|txn| {
        record_meta(txn, &meta)?;
        commit_union(txn, files, &counted, observer)
    })
}

fn commit_union(
    txn: &WriteTxn<'_>,
    files: &[&str],
    counted: &[KmerCounts],
    observer: Observer<'_>,
) -> KmerResult<IngestSummary> {
    let mut summary = IngestSummary {
        files: files.len(),
        ..IngestSummary::default()
    };
    let mut master = txn.table(MASTER_TABLE)?;
    for (ix, (file, counts)) in files.iter().zip(counted).enumerate() {
        let mut commit = || -> KmerResult<u64> {
            let written = write_file_table(txn, file, counts)?;
            for kmer in counts.counts.keys() {
                master.put(kmer, MASTER_SENTINEL, false)?;
            }
            Ok(written)
        };
        summary.kmers_written += commit().map_err(|e| e.in_file(file, Phase::Committing))?;
        observer(&Progress {
            phase: Phase::Committing,
            file,
            done: ix + 1,
            total: files.len(),
        });
    }
    summary.vocabulary_size = master.len()?;
    info!(
        files = summary.files,
        vocabulary = summary.vocabulary_size,
        "merged files into master vocabulary"
    );
    Ok(summary)
}

/// Add more files to an existing store, counting them the way the store's
/// earlier files were counted.
///
/// For a union store the new k-mers join the master table, so the result is
/// the same as ingesting all files together. For an intersection store the
/// master is a fixed feature space: the new files' tables only keep k-mers
/// already in it and the master is left alone.
pub fn add_files(store: &Store, files: &[&str], observer: Observer<'_>) -> KmerResult<IngestSummary> {
    validate_files(files)?;
    let meta = match read_meta(store)? {
        Some(meta) => meta,
        None => bail!(
            "store {} has no vocabulary yet; ingest some files first",
            store.path()
        ),
    };
    info!(files = files.len(), mode = ?meta.mode, "adding files");
    let counted = count_files(files, &meta.params)?;

    store.write(|txn| {
        record_meta(txn, &meta)?;
        match meta.mode {
            VocabularyMode::Union => commit_union(txn, files, &counted, observer),
            VocabularyMode::Intersection => commit_restricted(txn, files, counted, observer),
        }
    })
}

fn commit_restricted(
    txn: &WriteTxn<'_>,
    files: &[&str],
    counted: Vec<KmerCounts>,
    observer: Observer<'_>,
) -> KmerResult<IngestSummary> {
    let mut summary = IngestSummary {
        files: files.len(),
        ..IngestSummary::default()
    };
    let master = txn.table(MASTER_TABLE)?;
    for (ix, (file, mut counts)) in files.iter().zip(counted).enumerate() {
        let mut commit = || -> KmerResult<u64> {
            let mut missing = Vec::new();
            for kmer in counts.counts.keys() {
                if !master.contains(kmer)? {
                    missing.push(kmer.clone());
                }
            }
            for kmer in missing {
                counts.counts.remove(&kmer);
            }
            write_file_table(txn, file, &counts)
        };
        summary.kmers_written += commit().map_err(|e| e.in_file(file, Phase::Committing))?;
        observer(&Progress {
            phase: Phase::Committing,
            file,
            done: ix + 1,
            total: files.len(),
        });
    }
    summary.vocabulary_size = master.len()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(file_table_name("data/a.fa"), "file:data/a.fa");
        assert_eq!(file_from_table_name("file:data/a.fa"), Some("data/a.fa"));
        assert_eq!(file_from_table_name(MASTER_TABLE), None);
        // a file that happens to be called "master" can't clobber the master
        assert_ne!(file_table_name("master"), MASTER_TABLE);
    }

    #[test]
    fn test_validate_files() {
        assert!(validate_files(&[]).is_err());
        assert!(validate_files(&["a", "b", "a"]).is_err());
        assert!(validate_files(&["a", "b"]).is_ok());
    }
}
