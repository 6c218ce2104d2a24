//! Count k-mers across genome files into a transactional store and turn the
//! stored counts into aligned feature vectors.
//!
//! The four operations most callers need are [`ingest`], [`add_files`],
//! [`extract_vectors`] and [`vocabulary`]; each opens the store at the given
//! path, does its work in one transaction and closes the store again.
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub mod counter;
pub mod errors;
pub mod extract;
pub mod intersection;
pub mod progress;
pub mod sequence;
pub mod serialization;
pub mod statistics;
pub mod store;
pub mod vocabulary;

pub use crate::counter::{CountParams, KmerCounts, RecordBoundaries};
pub use crate::errors::{KmerError, KmerResult, Phase};
pub use crate::extract::FeatureMatrix;
pub use crate::progress::Progress;
pub use crate::store::{Store, StoreConfig};
pub use crate::vocabulary::{IngestSummary, StoreMeta, VocabularyMode};

use crate::counter::count_residues;
use crate::progress::{silent, Observer};
use crate::sequence::read_residues;
use crate::statistics::hist;
use crate::vocabulary::{file_from_table_name, read_meta, MASTER_TABLE};

/// Count the k-mers of one sequence file.
pub fn count_file(filename: &str, params: &CountParams) -> KmerResult<KmerCounts> {
    params.validate()?;
    let residues = read_residues(filename)?;
    Ok(count_residues(&residues, params))
}

/// Count several files in parallel; the first failure is returned tagged
/// with its file.
pub fn count_files(filenames: &[&str], params: &CountParams) -> KmerResult<Vec<KmerCounts>> {
    filenames
        .par_iter()
        .map(|filename| {
            count_file(filename, params).map_err(|e| e.in_file(filename, Phase::Counting))
        })
        .collect()
}

pub fn ingest<P: AsRef<Path>>(
    files: &[&str],
    params: &CountParams,
    mode: VocabularyMode,
    store_path: P,
) -> KmerResult<IngestSummary> {
    ingest_with(
        files,
        params,
        mode,
        store_path,
        &StoreConfig::default(),
        &mut silent,
    )
}

/// [`ingest`] with explicit store limits and a progress observer.
pub fn ingest_with<P: AsRef<Path>>(
    files: &[&str],
    params: &CountParams,
    mode: VocabularyMode,
    store_path: P,
    config: &StoreConfig,
    observer: Observer<'_>,
) -> KmerResult<IngestSummary> {
    params.validate()?;
    vocabulary::validate_files(files)?;
    let store = Store::open(store_path, *config)?;
    match mode {
        VocabularyMode::Union => vocabulary::ingest_union(&store, files, params, observer),
        VocabularyMode::Intersection => {
            intersection::ingest_intersection(&store, files, params, observer)
        }
    }
}

pub fn add_files<P: AsRef<Path>>(files: &[&str], store_path: P) -> KmerResult<IngestSummary> {
    add_files_with(files, store_path, &StoreConfig::default(), &mut silent)
}

/// [`add_files`] with explicit store limits and a progress observer.
pub fn add_files_with<P: AsRef<Path>>(
    files: &[&str],
    store_path: P,
    config: &StoreConfig,
    observer: Observer<'_>,
) -> KmerResult<IngestSummary> {
    let store = Store::open_existing(store_path, *config)?;
    vocabulary::add_files(&store, files, observer)
}

pub fn extract_vectors<P: AsRef<Path>>(files: &[&str], store_path: P) -> KmerResult<FeatureMatrix> {
    let store = Store::open_existing(store_path, StoreConfig::default())?;
    extract::extract_vectors(&store, files)
}

pub fn vocabulary<P: AsRef<Path>>(store_path: P) -> KmerResult<Vec<String>> {
    let store = Store::open_existing(store_path, StoreConfig::default())?;
    extract::vocabulary(&store)
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file: String,
    pub distinct_kmers: u64,
    pub total_kmers: u64,
    /// `histogram[i]` is the number of k-mers seen exactly `i + 1` times.
    pub histogram: Vec<u64>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub meta: Option<StoreMeta>,
    pub vocabulary_size: u64,
    pub files: Vec<FileInfo>,
}

/// Describe what a store holds.
pub fn store_info<P: AsRef<Path>>(store_path: P) -> KmerResult<StoreInfo> {
    let store = Store::open_existing(store_path, StoreConfig::default())?;
    let meta = read_meta(&store)?;
    store.read(|txn| {
        let vocabulary_size = match txn.table(MASTER_TABLE)? {
            Some(master) => master.len()?,
            None => 0,
        };
        let mut files = Vec::new();
        for name in txn.table_names()? {
            let file = match file_from_table_name(&name) {
                Some(f) => f.to_string(),
                None => continue,
            };
            let table = match txn.table(&name)? {
                Some(t) => t,
                None => continue,
            };
            let counts = table
                .cursor()?
                .map(|e| e.map(|(_, c)| c))
                .collect::<KmerResult<Vec<u64>>>()?;
            files.push(FileInfo {
                file,
                distinct_kmers: counts.len() as u64,
                total_kmers: counts.iter().sum(),
                histogram: hist(counts),
            });
        }
        files.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(StoreInfo {
            meta,
            vocabulary_size,
            files,
        })
    })
}
