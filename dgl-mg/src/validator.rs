//! Manifest validation
//!
//! Checks a sampled selection against the fixed manifest totals. Fails on the
//! first violation and never corrects anything.

use crate::strata::{MANIFEST_SIZE, TEST_TOTAL, TRAIN_TOTAL, VAL_TOTAL};
use dgl_common::{ManifestImage, Split};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Manifest must hold {expected} images, found {actual}")]
    WrongImageCount { expected: usize, actual: usize },

    #[error("Image {id} has no split assigned")]
    MissingSplit { id: String },

    #[error("Image id {id} appears more than once")]
    DuplicateId { id: String },

    #[error(
        "Split totals must be train={}, val={}, test={}; found {0}",
        TRAIN_TOTAL,
        VAL_TOTAL,
        TEST_TOTAL
    )]
    WrongSplitTotals(SplitTotals),
}

/// Image count per split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitTotals {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitTotals {
    pub fn add(&mut self, split: Split) {
        match split {
            Split::Train => self.train += 1,
            Split::Val => self.val += 1,
            Split::Test => self.test += 1,
        }
    }

    pub fn get(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train,
            Split::Val => self.val,
            Split::Test => self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

impl fmt::Display for SplitTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "train={}, val={}, test={}", self.train, self.val, self.test)
    }
}

/// Validate a full selection; returns the split totals on success
pub fn validate(images: &[ManifestImage]) -> Result<SplitTotals, ValidationError> {
    if images.len() != MANIFEST_SIZE {
        return Err(ValidationError::WrongImageCount {
            expected: MANIFEST_SIZE,
            actual: images.len(),
        });
    }

    let mut seen = HashSet::with_capacity(images.len());
    let mut totals = SplitTotals::default();
    for image in images {
        if !seen.insert(image.id.as_str()) {
            return Err(ValidationError::DuplicateId { id: image.id.clone() });
        }
        let split = image
            .split
            .ok_or_else(|| ValidationError::MissingSplit { id: image.id.clone() })?;
        totals.add(split);
    }

    let expected = SplitTotals {
        train: TRAIN_TOTAL,
        val: VAL_TOTAL,
        test: TEST_TOTAL,
    };
    if totals != expected {
        return Err(ValidationError::WrongSplitTotals(totals));
    }

    Ok(totals)
}
