use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::bail;
use crate::errors::KmerResult;
use crate::sequence::Residues;

/// How the records of a multi-record file are turned into windows.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RecordBoundaries {
    /// Every record is counted on its own; no k-mer crosses two records.
    Split,
    /// Records are joined into one stream so windows may cross records.
    Span,
}

impl RecordBoundaries {
    pub(crate) fn code(self) -> u64 {
        match self {
            RecordBoundaries::Split => 0,
            RecordBoundaries::Span => 1,
        }
    }

    pub(crate) fn from_code(code: u64) -> KmerResult<Self> {
        match code {
            0 => Ok(RecordBoundaries::Split),
            1 => Ok(RecordBoundaries::Span),
            other => bail!("unknown record boundary policy {}", other),
        }
    }
}

impl Default for RecordBoundaries {
    fn default() -> Self {
        RecordBoundaries::Split
    }
}

/// Used to pass around counting options
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CountParams {
    pub kmer_length: usize,
    /// K-mers seen fewer times than this in a file are dropped.
    pub min_count: u64,
    pub boundaries: RecordBoundaries,
}

impl CountParams {
    pub fn new(kmer_length: usize, min_count: u64) -> Self {
        CountParams {
            kmer_length,
            min_count,
            ..CountParams::default()
        }
    }

    pub fn validate(&self) -> KmerResult<()> {
        if self.kmer_length < 1 {
            bail!("kmer length must be at least 1");
        }
        Ok(())
    }

    /// Return the first parameter that differs between the two sets, which
    /// would make their counts incomparable.
    pub fn check_compatibility(&self, other: &CountParams) -> Option<(&str, String, String)> {
        if self.kmer_length != other.kmer_length {
            return Some((
                "kmer length",
                self.kmer_length.to_string(),
                other.kmer_length.to_string(),
            ));
        }
        if self.min_count != other.min_count {
            return Some((
                "minimum count",
                self.min_count.to_string(),
                other.min_count.to_string(),
            ));
        }
        if self.boundaries != other.boundaries {
            return Some((
                "record boundaries",
                format!("{:?}", self.boundaries),
                format!("{:?}", other.boundaries),
            ));
        }
        None
    }
}

impl Default for CountParams {
    fn default() -> Self {
        CountParams {
            kmer_length: 10,
            min_count: 0,
            boundaries: RecordBoundaries::Split,
        }
    }
}

/// The k-mer counts of one file, sorted by k-mer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KmerCounts {
    pub counts: BTreeMap<Vec<u8>, u64>,
    pub total_bases: u64,
}

impl KmerCounts {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, kmer: &[u8]) -> Option<u64> {
        self.counts.get(kmer).copied()
    }

    pub fn contains(&self, kmer: &[u8]) -> bool {
        self.counts.contains_key(kmer)
    }

    /// Sum of all counts, i.e. the number of windows that survived filtering.
    pub fn total_kmers(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Tallies every window of length k over the sequences it is fed.
#[derive(Clone, Debug)]
pub struct KmerCounter {
    counts: HashMap<Vec<u8>, u64>,
    total_bases: u64,
    k: usize,
}

impl KmerCounter {
    pub fn new(k: usize) -> Self {
        debug_assert!(k > 0, "kmer length must be positive");
        KmerCounter {
            counts: HashMap::new(),
            total_bases: 0,
            k,
        }
    }

    pub fn process(&mut self, seq: &[u8]) {
        self.total_bases += seq.len() as u64;
        // `windows` yields nothing for sequences shorter than k
        for kmer in seq.windows(self.k) {
            match self.counts.get_mut(kmer) {
                Some(count) => *count += 1,
                None => {
                    self.counts.insert(kmer.to_vec(), 1);
                }
            }
        }
    }

    pub fn total_bases_and_kmers(&self) -> (u64, u64) {
        (self.total_bases, self.counts.values().sum())
    }

    pub fn finish(self, min_count: u64) -> KmerCounts {
        KmerCounts {
            counts: filter_abundance(self.counts, min_count),
            total_bases: self.total_bases,
        }
    }
}

/// Drops every k-mer seen fewer than `low` times and sorts the remainder.
pub fn filter_abundance<I>(counts: I, low: u64) -> BTreeMap<Vec<u8>, u64>
where
    I: IntoIterator<Item = (Vec<u8>, u64)>,
{
    counts
        .into_iter()
        .filter(|(_, count)| *count > 0 && *count >= low)
        .collect()
}

pub fn count_residues(residues: &Residues, params: &CountParams) -> KmerCounts {
    let mut counter = KmerCounter::new(params.kmer_length);
    match params.boundaries {
        RecordBoundaries::Split => {
            for record in &residues.records {
                counter.process(record);
            }
        }
        RecordBoundaries::Span => counter.process(&residues.concatenated()),
    }
    counter.finish(params.min_count)
}
