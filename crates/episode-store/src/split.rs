use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seed used when the caller does not supply one, so repeated runs over the
/// same capture set produce the same partition.
pub const DEFAULT_SPLIT_SEED: u64 = 101;

/// Train/validation partition of the final demo-index set.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitAssignment {
    pub train: Vec<u64>,
    pub val: Vec<u64>,
    pub seed: u64,
    pub ratio: f64,
}

/// Deterministically partition demo indices at the target validation ratio.
///
/// `round(ratio * n)` indices go to validation, the rest to train; both
/// lists come back sorted. Runs only after every demo is written, since it
/// needs the final count. Caller guarantees `ratio` in `(0, 1)`.
pub fn split_train_val(indices: &[u64], ratio: f64, seed: u64) -> Result<SplitAssignment> {
    if indices.is_empty() {
        return Err(Error::EmptyDataset);
    }
    let mut shuffled = indices.to_vec();
    shuffled.sort_unstable();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let n_val = (ratio * shuffled.len() as f64).round() as usize;
    let mut val = shuffled.split_off(shuffled.len() - n_val);
    let mut train = shuffled;
    train.sort_unstable();
    val.sort_unstable();

    tracing::info!(
        train = train.len(),
        val = val.len(),
        seed,
        "partitioned demos"
    );
    Ok(SplitAssignment {
        train,
        val,
        seed,
        ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_disjoint_cover() {
        let indices: Vec<u64> = (0..23).collect();
        let split = split_train_val(&indices, 0.2, DEFAULT_SPLIT_SEED).unwrap();
        let mut all: BTreeSet<u64> = split.train.iter().copied().collect();
        for v in &split.val {
            assert!(all.insert(*v), "index {v} appears in both sets");
        }
        assert_eq!(all.len(), indices.len());
    }

    #[test]
    fn test_val_count_is_rounded_ratio() {
        let indices: Vec<u64> = (0..10).collect();
        let split = split_train_val(&indices, 0.25, 3).unwrap();
        // round(0.25 * 10) = 3 (ties away from zero)
        assert_eq!(split.val.len(), 3);
        assert_eq!(split.train.len(), 7);
    }

    #[test]
    fn test_reproducible_for_fixed_seed() {
        let indices: Vec<u64> = vec![3, 7, 12, 19, 20, 44];
        let a = split_train_val(&indices, 0.33, 42).unwrap();
        let b = split_train_val(&indices, 0.33, 42).unwrap();
        assert_eq!(a, b);
        // Order of the input set must not matter.
        let mut reversed = indices.clone();
        reversed.reverse();
        let c = split_train_val(&reversed, 0.33, 42).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_different_seed_different_partition() {
        let indices: Vec<u64> = (0..40).collect();
        let a = split_train_val(&indices, 0.5, 1).unwrap();
        let b = split_train_val(&indices, 0.5, 2).unwrap();
        assert_ne!(a.val, b.val);
    }

    #[test]
    fn test_empty_dataset_is_fatal() {
        let err = split_train_val(&[], 0.2, DEFAULT_SPLIT_SEED).unwrap_err();
        assert!(matches!(err, Error::EmptyDataset));
    }
}
