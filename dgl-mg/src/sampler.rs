//! Deterministic stratified sampler
//!
//! For every age stratum the candidate ids are shuffled with a mulberry32
//! generator seeded from `(seed, age)`, the first `population` ids are kept
//! and sliced into train / val / test. Identical seed and identical image
//! directories always produce the identical manifest.

use crate::strata::{AgeStratum, STRATA};
use dgl_common::ManifestImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Sampling errors
#[derive(Debug, Error)]
pub enum SampleError {
    /// No image directory for an age
    #[error("Image folder for age {age} not found: {path}")]
    MissingAgeDirectory { age: u8, path: PathBuf },

    /// Fewer candidate images than the stratum requires
    #[error("Not enough images for age {age}: need {required}, found {available}")]
    InsufficientImages {
        age: u8,
        required: usize,
        available: usize,
    },

    /// Directory listing failed
    #[error("Cannot list images for age {age}: {source}")]
    Listing {
        age: u8,
        #[source]
        source: walkdir::Error,
    },
}

/// mulberry32 pseudo-random generator (32-bit state)
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let t = self.state;
        let mut r = (t ^ (t >> 15)).wrapping_mul(t | 1);
        r ^= r.wrapping_add((r ^ (r >> 7)).wrapping_mul(r | 61));
        r ^ (r >> 14)
    }

    /// Uniform value in `[0, 1)`
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }

    /// `floor(next_f64() * bound)`, computed exactly in integers
    pub fn next_index(&mut self, bound: usize) -> usize {
        ((u64::from(self.next_u32()) * bound as u64) >> 32) as usize
    }
}

/// Per-age generator seed: `seed XOR (age * 2654435761)` modulo 2^32
pub fn hash_seed(seed: u32, age: u8) -> u32 {
    seed ^ u32::from(age).wrapping_mul(2_654_435_761)
}

/// Fisher-Yates shuffle walking from the last element down
pub fn shuffle<T>(items: &mut [T], rng: &mut Mulberry32) {
    for i in (1..items.len()).rev() {
        let j = rng.next_index(i + 1);
        items.swap(i, j);
    }
}

/// Provider of candidate image ids per age
pub trait ImageSource {
    /// Ids available for `age`, sorted numerically ascending
    fn ids_for_age(&self, age: u8) -> Result<Vec<String>, SampleError>;
}

/// Ids read from `<root>/<age>/NNNN.jpg`
#[derive(Debug, Clone)]
pub struct DirectoryImageSource {
    root: PathBuf,
}

impl DirectoryImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageSource for DirectoryImageSource {
    fn ids_for_age(&self, age: u8) -> Result<Vec<String>, SampleError> {
        let dir = self.root.join(age.to_string());
        if !dir.is_dir() {
            return Err(SampleError::MissingAgeDirectory { age, path: dir });
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|source| SampleError::Listing { age, source })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(image_id_from_file_name) {
                ids.push(id.to_string());
            }
        }

        sort_numeric(&mut ids);
        debug!("age {}: {} candidate images in {}", age, ids.len(), dir.display());
        Ok(ids)
    }
}

/// Fixed id lists, for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryImageSource {
    by_age: BTreeMap<u8, Vec<String>>,
}

impl InMemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_age<I, S>(mut self, age: u8, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        sort_numeric(&mut ids);
        self.by_age.insert(age, ids);
        self
    }
}

impl ImageSource for InMemoryImageSource {
    fn ids_for_age(&self, age: u8) -> Result<Vec<String>, SampleError> {
        self.by_age
            .get(&age)
            .cloned()
            .ok_or_else(|| SampleError::MissingAgeDirectory {
                age,
                path: PathBuf::from(age.to_string()),
            })
    }
}

/// `NNNN` for a file named `NNNN.jpg` (extension case-insensitive)
pub fn image_id_from_file_name(name: &str) -> Option<&str> {
    let stem = name.get(..4)?;
    let extension = name.get(4..)?;
    let is_id = stem.bytes().all(|b| b.is_ascii_digit());
    (is_id && extension.eq_ignore_ascii_case(".jpg")).then_some(stem)
}

fn sort_numeric(ids: &mut [String]) {
    ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
}

/// Sample one age stratum
pub fn sample_age<S: ImageSource + ?Sized>(
    seed: u32,
    stratum: &AgeStratum,
    source: &S,
) -> Result<Vec<ManifestImage>, SampleError> {
    let mut ids = source.ids_for_age(stratum.age)?;
    if ids.len() < stratum.population {
        return Err(SampleError::InsufficientImages {
            age: stratum.age,
            required: stratum.population,
            available: ids.len(),
        });
    }

    let mut rng = Mulberry32::new(hash_seed(seed, stratum.age));
    shuffle(&mut ids, &mut rng);
    ids.truncate(stratum.population);

    Ok(ids
        .into_iter()
        .enumerate()
        .map(|(index, id)| ManifestImage {
            path: format!("/images/{}/{}.jpg", stratum.age, id),
            id,
            age: stratum.age,
            split: Some(stratum.split_for(index)),
        })
        .collect())
}

/// Sample every stratum and return the selection ordered by numeric id
pub fn sample<S: ImageSource + ?Sized>(seed: u32, source: &S) -> Result<Vec<ManifestImage>, SampleError> {
    let mut images = Vec::new();
    for stratum in &STRATA {
        images.extend(sample_age(seed, stratum, source)?);
    }
    images.sort_by_key(ManifestImage::numeric_id);
    Ok(images)
}
