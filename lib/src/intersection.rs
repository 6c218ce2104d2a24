//! K-mers common to every file of a set.
//!
//! Files are streamed one at a time: the first seeds a [`WorkingSet`], every
//! following file marks the working set's k-mers live or dead and the dead
//! ones are swept. Once all files have been seen the working set is the
//! exact intersection, and a reconciliation pass in reverse order trims each
//! file's table down to it. The working set only ever shrinks, so memory is
//! bounded by the first file's k-mers plus the file currently counted.
//!
//! A store that already holds an intersection seeds the working set from its
//! master table instead, and the reconciliation also trims the tables of
//! files ingested earlier, so the master keeps being the intersection of
//! every file in the store.
use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::counter::{CountParams, KmerCounts};
use crate::count_file;
use crate::errors::{KmerResult, Phase};
use crate::progress::{Observer, Progress};
use crate::store::{Store, WriteTxn};
use crate::vocabulary::{
    file_from_table_name, file_table_name, record_meta, validate_files, write_file_table,
    IngestSummary, StoreMeta, VocabularyMode, MASTER_SENTINEL, MASTER_TABLE,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mark {
    Live,
    Dead,
}

/// The k-mers still common to every file seen so far.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WorkingSet {
    entries: BTreeMap<Vec<u8>, Mark>,
}

impl WorkingSet {
    pub fn seed(counts: &KmerCounts) -> Self {
        WorkingSet {
            entries: counts
                .counts
                .keys()
                .map(|kmer| (kmer.clone(), Mark::Live))
                .collect(),
        }
    }

    /// A working set holding exactly `kmers`, e.g. a stored vocabulary.
    pub fn from_kmers<I: IntoIterator<Item = Vec<u8>>>(kmers: I) -> Self {
        WorkingSet {
            entries: kmers.into_iter().map(|kmer| (kmer, Mark::Live)).collect(),
        }
    }

    /// Keep only the k-mers also present in `counts`; returns how many were
    /// dropped.
    pub fn advance(&mut self, counts: &KmerCounts) -> usize {
        for (kmer, mark) in self.entries.iter_mut() {
            *mark = if counts.contains(kmer) {
                Mark::Live
            } else {
                Mark::Dead
            };
        }
        self.sweep()
    }

    fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, mark| *mark == Mark::Live);
        before - self.entries.len()
    }

    pub fn contains(&self, kmer: &[u8]) -> bool {
        self.entries.contains_key(kmer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The k-mers in ascending order.
    pub fn kmers(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(|k| k.as_slice())
    }

    /// `counts` without the k-mers that aren't in the working set.
    pub fn restrict(&self, counts: &KmerCounts) -> KmerCounts {
        KmerCounts {
            counts: counts
                .counts
                .iter()
                .filter(|(kmer, _)| self.contains(kmer))
                .map(|(kmer, count)| (kmer.clone(), *count))
                .collect(),
            total_bases: counts.total_bases,
        }
    }
}

/// Intersect already counted files in memory, returning the common k-mers
/// and every file's counts restricted to them.
pub fn intersect_counts(all_counts: &[KmerCounts]) -> (WorkingSet, Vec<KmerCounts>) {
    let mut working = match all_counts.first() {
        Some(first) => WorkingSet::seed(first),
        None => return (WorkingSet::default(), Vec::new()),
    };
    for counts in &all_counts[1..] {
        working.advance(counts);
    }
    let restricted = all_counts.iter().map(|c| working.restrict(c)).collect();
    (working, restricted)
}

/// Count `files` into the store keeping only the k-mers every one of them
/// shares, along with every file already in the store; the master table
/// becomes exactly that set.
///
/// Runs as a single write transaction, so a file that can't be read or
/// counted leaves the store as it was.
pub fn ingest_intersection(
    store: &Store,
    files: &[&str],
    params: &CountParams,
    observer: Observer<'_>,
) -> KmerResult<IngestSummary> {
    params.validate()?;
    validate_files(files)?;
    info!(files = files.len(), k = params.kmer_length, "intersecting files");

    let meta = StoreMeta {
        params: *params,
        mode: VocabularyMode::Intersection,
    };
    store.write(|txn| {
        record_meta(txn, &meta)?;
        // a store that already has an intersection keeps narrowing it
        let existing = stored_vocabulary(txn)?;
        let earlier = earlier_files(txn, files)?;
        let mut seeded = existing.is_some();
        let mut working = existing.unwrap_or_default();
        let mut summary = IngestSummary {
            files: files.len(),
            ..IngestSummary::default()
        };

        for (ix, file) in files.iter().enumerate() {
            summary.kmers_written += if seeded {
                forward_pass(txn, file, params, &mut working)?
            } else {
                seeded = true;
                seed_pass(txn, file, params, &mut working)?
            };
            observer(&Progress {
                phase: Phase::Counting,
                file,
                done: ix + 1,
                total: files.len(),
            });
        }

        let total = files.len() + earlier.len();
        for (done, file) in files.iter().rev().enumerate() {
            let removed = reconcile_pass(txn, file, &working)
                .map_err(|e| e.in_file(file, Phase::Reconciling))?;
            summary.kmers_written -= removed;
            observer(&Progress {
                phase: Phase::Reconciling,
                file,
                done: done + 1,
                total,
            });
        }
        for (ix, file) in earlier.iter().enumerate() {
            let removed = reconcile_pass(txn, file, &working)
                .map_err(|e| e.in_file(file, Phase::Reconciling))?;
            debug!(file = %file, removed, "trimmed earlier file table");
            observer(&Progress {
                phase: Phase::Reconciling,
                file,
                done: files.len() + ix + 1,
                total,
            });
        }

        summary.vocabulary_size = replace_master(txn, &working)?;
        info!(
            files = summary.files,
            earlier = earlier.len(),
            vocabulary = summary.vocabulary_size,
            "intersection complete"
        );
        Ok(summary)
    })
}

/// The master's k-mers, if an earlier ingest already built one.
fn stored_vocabulary(txn: &WriteTxn<'_>) -> KmerResult<Option<WorkingSet>> {
    if !txn.has_table(MASTER_TABLE)? {
        return Ok(None);
    }
    let master = txn.table(MASTER_TABLE)?;
    Ok(Some(WorkingSet::from_kmers(master.keys()?)))
}

/// Files counted by earlier ingests that aren't part of this batch.
fn earlier_files(txn: &WriteTxn<'_>, files: &[&str]) -> KmerResult<Vec<String>> {
    Ok(txn
        .table_names()?
        .iter()
        .filter_map(|name| file_from_table_name(name))
        .filter(|file| !files.contains(file))
        .map(|file| file.to_string())
        .collect())
}

fn counted(file: &str, params: &CountParams) -> KmerResult<KmerCounts> {
    count_file(file, params).map_err(|e| e.in_file(file, Phase::Counting))
}

fn seed_pass(
    txn: &WriteTxn<'_>,
    file: &str,
    params: &CountParams,
    working: &mut WorkingSet,
) -> KmerResult<u64> {
    let counts = counted(file, params)?;
    *working = WorkingSet::seed(&counts);
    debug!(file, kmers = working.len(), "seeded working set");
    write_file_table(txn, file, &counts).map_err(|e| e.in_file(file, Phase::Committing))
}

fn forward_pass(
    txn: &WriteTxn<'_>,
    file: &str,
    params: &CountParams,
    working: &mut WorkingSet,
) -> KmerResult<u64> {
    let counts = counted(file, params)?;
    let dropped = working.advance(&counts);
    debug!(file, dropped, remaining = working.len(), "narrowed working set");
    write_file_table(txn, file, &working.restrict(&counts))
        .map_err(|e| e.in_file(file, Phase::Committing))
}

/// Delete the entries of `file`'s table that didn't survive the
/// intersection.
fn reconcile_pass(txn: &WriteTxn<'_>, file: &str, working: &WorkingSet) -> KmerResult<u64> {
    let mut table = txn.table(&file_table_name(file))?;
    let mut stale = Vec::new();
    for entry in table.cursor()? {
        let (kmer, _) = entry?;
        if !working.contains(&kmer) {
            stale.push(kmer);
        }
    }
    for kmer in &stale {
        table.delete(kmer)?;
    }
    Ok(stale.len() as u64)
}

fn replace_master(txn: &WriteTxn<'_>, working: &WorkingSet) -> KmerResult<u64> {
    let mut master = txn.table(MASTER_TABLE)?;
    master.clear()?;
    for kmer in working.kmers() {
        master.put(kmer, MASTER_SENTINEL, true)?;
    }
    master.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn counts(kmers: &[(&str, u64)]) -> KmerCounts {
        KmerCounts {
            counts: kmers
                .iter()
                .map(|(k, c)| (k.as_bytes().to_vec(), *c))
                .collect(),
            total_bases: 0,
        }
    }

    #[test]
    fn test_working_set_narrows() {
        let a = counts(&[("AA", 3), ("AC", 1), ("CC", 2)]);
        let b = counts(&[("AA", 1), ("CC", 5), ("GG", 1)]);
        let mut working = WorkingSet::seed(&a);
        assert_eq!(working.len(), 3);
        assert_eq!(working.advance(&b), 1);
        let kmers: Vec<&[u8]> = working.kmers().collect();
        assert_eq!(kmers, vec![&b"AA"[..], &b"CC"[..]]);

        let restricted = working.restrict(&b);
        assert_eq!(restricted.get(b"CC"), Some(5));
        assert_eq!(restricted.get(b"GG"), None);
    }

    #[test]
    fn test_intersect_counts() {
        let files = vec![
            counts(&[("AA", 3), ("AC", 1), ("CA", 1), ("CC", 3)]),
            counts(&[("AA", 2), ("AT", 1), ("CC", 3)]),
            counts(&[("AA", 5), ("CC", 1), ("TT", 4)]),
        ];
        let (working, restricted) = intersect_counts(&files);
        assert_eq!(working.len(), 2);
        assert_eq!(restricted[0], counts(&[("AA", 3), ("CC", 3)]));
        assert_eq!(restricted[2], counts(&[("AA", 5), ("CC", 1)]));

        let (working, restricted) = intersect_counts(&[]);
        assert!(working.is_empty());
        assert!(restricted.is_empty());
    }

    fn kmer_sets() -> impl Strategy<Value = Vec<BTreeSet<String>>> {
        prop::collection::vec(prop::collection::btree_set("[ACG]{2}", 0..4), 1..6)
    }

    proptest! {
        #[test]
        fn intersection_is_order_independent(sets in kmer_sets()) {
            let as_counts: Vec<KmerCounts> = sets
                .iter()
                .map(|s| KmerCounts {
                    counts: s.iter().map(|k| (k.as_bytes().to_vec(), 1)).collect(),
                    total_bases: 0,
                })
                .collect();
            let expected: BTreeSet<String> = sets[1..]
                .iter()
                .fold(sets[0].clone(), |acc, s| acc.intersection(s).cloned().collect());

            let (forward, _) = intersect_counts(&as_counts);
            let mut reversed = as_counts.clone();
            reversed.reverse();
            let (backward, _) = intersect_counts(&reversed);

            let found: BTreeSet<String> = forward
                .kmers()
                .map(|k| String::from_utf8(k.to_vec()).unwrap())
                .collect();
            prop_assert_eq!(&found, &expected);
            prop_assert_eq!(forward, backward);
        }
    }
}
