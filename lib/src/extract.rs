use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{KmerResult, Phase};
use crate::format_err;
use crate::store::{ReadTxn, Store};
use crate::vocabulary::{file_table_name, MASTER_TABLE};

/// Aligned k-mer counts: `vectors[i][j]` is how often `kmers[j]` occurs in
/// `files[i]`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub kmers: Vec<String>,
    pub files: Vec<String>,
    pub vectors: Vec<Vec<u64>>,
}

impl FeatureMatrix {
    /// Number of features in every vector.
    pub fn width(&self) -> usize {
        self.kmers.len()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Position of `kmer` in every vector.
    pub fn column(&self, kmer: &str) -> Option<usize> {
        self.kmers.binary_search_by(|k| k.as_str().cmp(kmer)).ok()
    }

    pub fn to_array(&self) -> KmerResult<Array2<u64>> {
        let flat: Vec<u64> = self.vectors.iter().flatten().copied().collect();
        Ok(Array2::from_shape_vec((self.len(), self.width()), flat)?)
    }
}

fn master_kmers(txn: &ReadTxn) -> KmerResult<Vec<Vec<u8>>> {
    match txn.table(MASTER_TABLE)? {
        Some(master) => master.keys(),
        None => Ok(Vec::new()),
    }
}

fn kmer_names(kmers: &[Vec<u8>]) -> Vec<String> {
    kmers
        .iter()
        .map(|k| String::from_utf8_lossy(k).into_owned())
        .collect()
}

/// The count vector of `file` over `kmers`, which must be sorted.
fn aligned_vector(txn: &ReadTxn, file: &str, kmers: &[Vec<u8>]) -> KmerResult<Vec<u64>> {
    let table = txn
        .table(&file_table_name(file))?
        .ok_or_else(|| format_err!("{} has not been counted into this store", file))?;
    let mut vector = vec![0; kmers.len()];
    for entry in table.cursor()? {
        let (kmer, count) = entry?;
        if let Ok(ix) = kmers.binary_search(&kmer) {
            vector[ix] = count;
        }
    }
    Ok(vector)
}

/// One count vector per file, all in the master table's k-mer order.
///
/// Everything is read from one snapshot so a concurrent ingest can't leave
/// the vectors misaligned.
pub fn extract_vectors(store: &Store, files: &[&str]) -> KmerResult<FeatureMatrix> {
    store.read(|txn| {
        let kmers = master_kmers(txn)?;
        let mut vectors = Vec::with_capacity(files.len());
        for file in files {
            let vector = aligned_vector(txn, file, &kmers)
                .map_err(|e| e.in_file(file, Phase::Extracting))?;
            vectors.push(vector);
        }
        info!(
            files = files.len(),
            features = kmers.len(),
            "extracted count vectors"
        );
        Ok(FeatureMatrix {
            kmers: kmer_names(&kmers),
            files: files.iter().map(|f| f.to_string()).collect(),
            vectors,
        })
    })
}

/// The master table's k-mers, in the order used by [`extract_vectors`].
pub fn vocabulary(store: &Store) -> KmerResult<Vec<String>> {
    store.read(|txn| Ok(kmer_names(&master_kmers(txn)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> FeatureMatrix {
        FeatureMatrix {
            kmers: vec!["AA".into(), "AC".into(), "CA".into()],
            files: vec!["a".into(), "b".into()],
            vectors: vec![vec![3, 1, 0], vec![0, 2, 5]],
        }
    }

    #[test]
    fn test_column_lookup() {
        let m = matrix();
        assert_eq!(m.column("AC"), Some(1));
        assert_eq!(m.column("GG"), None);
        assert_eq!(m.width(), 3);
    }

    #[test]
    fn test_to_array() {
        let array = matrix().to_array().unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 2]], 5);
        assert_eq!(array.row(0).to_vec(), vec![3, 1, 0]);
    }
}
