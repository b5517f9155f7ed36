//! Per-age sampling configuration
//!
//! Fixed by the labeling protocol: eight age strata whose populations add up
//! to 200 images, split 140 / 20 / 40 overall.

use dgl_common::Split;

/// Seed used when none is given on the command line
pub const DEFAULT_SEED: u32 = 20260213;

/// Exact number of images in a generated manifest
pub const MANIFEST_SIZE: usize = 200;
pub const TRAIN_TOTAL: usize = 140;
pub const VAL_TOTAL: usize = 20;
pub const TEST_TOTAL: usize = 40;

/// Sampling quota for one age
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeStratum {
    pub age: u8,
    /// Images drawn for this age
    pub population: usize,
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl AgeStratum {
    /// Split of the image at `index` in the shuffled selection
    ///
    /// The first `train` go to train, the next `val` to val, the rest to test.
    pub fn split_for(&self, index: usize) -> Split {
        if index < self.train {
            Split::Train
        } else if index < self.train + self.val {
            Split::Val
        } else {
            Split::Test
        }
    }
}

const fn stratum(age: u8, population: usize, train: usize, val: usize, test: usize) -> AgeStratum {
    AgeStratum {
        age,
        population,
        train,
        val,
        test,
    }
}

/// Age strata in ascending age order
pub const STRATA: [AgeStratum; 8] = [
    stratum(4, 27, 19, 3, 5),
    stratum(5, 26, 18, 3, 5),
    stratum(6, 28, 19, 3, 6),
    stratum(7, 28, 19, 3, 6),
    stratum(8, 26, 18, 3, 5),
    stratum(9, 25, 18, 2, 5),
    stratum(10, 22, 16, 2, 4),
    stratum(11, 18, 13, 1, 4),
];

pub fn find_stratum(age: u8) -> Option<&'static AgeStratum> {
    STRATA.iter().find(|stratum| stratum.age == age)
}

pub fn ages() -> impl Iterator<Item = u8> {
    STRATA.iter().map(|stratum| stratum.age)
}
