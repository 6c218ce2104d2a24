use std::cmp;
use std::collections::HashMap;

/// Generates a Vec of numbers of kmers for each count level
///
/// For example, a file whose every kmer occurs exactly 5 times should
/// produce a "histogram" like [0, 0, 0, 0, n] where n is the number of
/// distinct kmers.
///
pub fn hist<I: IntoIterator<Item = u64>>(counts: I) -> Vec<u64> {
    let mut max_count = 0;
    let mut levels: HashMap<u64, u64> = HashMap::new();
    for count in counts {
        if count == 0 {
            continue;
        }
        max_count = cmp::max(max_count, count);
        *levels.entry(count - 1).or_insert(0) += 1;
    }

    (0..max_count)
        .map(|i| *levels.get(&i).unwrap_or(&0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hist() {
        let hist_data = hist(vec![1, 1, 1]);
        assert_eq!(hist_data, vec![3]);

        let hist_data = hist(vec![4, 2, 4, 3, 0]);
        assert_eq!(hist_data, vec![0, 1, 1, 2]);

        assert!(hist(Vec::new()).is_empty());
    }
}
