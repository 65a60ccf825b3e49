//! Seeded train/test partition

use crate::error::{Error, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

pub const DEFAULT_TEST_SIZE: f64 = 0.1;
pub const DEFAULT_SEED: u64 = 42;

/// Number of `(train, test)` rows for a dataset of `n` rows.
///
/// The test share is rounded up, the train split gets the remainder.
pub fn split_sizes(n: usize, test_size: f64) -> Result<(usize, usize)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(Error::Split(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n_test = (test_size * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_train == 0 || n_test == 0 {
        return Err(Error::Split(format!(
            "with n_samples={n} and test_size={test_size}, the resulting train \
            ({n_train}) or test ({n_test}) set would be empty"
        )));
    }
    Ok((n_train, n_test))
}

/// Shuffle `data` with a seeded rng and partition it into `(train, test)`.
///
/// The test split is the head of the permutation. Each row lands in exactly
/// one split and the same seed always yields the same partition.
pub fn train_test_split<T>(
    mut data: Vec<T>,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>)> {
    let (_, n_test) = split_sizes(data.len(), test_size)?;

    let mut rng = StdRng::seed_from_u64(seed);
    data.shuffle(&mut rng);

    let train = data.split_off(n_test);
    Ok((train, data))
}
