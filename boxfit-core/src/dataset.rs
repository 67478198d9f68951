//! Dataset pool storage and train/test partitioning.
//!
//! A pool holds every generated sample in flat buffers. Partitioning is a
//! one-shot split by count: the first `train_count` samples form the training
//! split and the remainder the test split. Splits are read-only views; the
//! pool is never copied or mutated after generation.

use std::fmt;

use crate::{
    error::{ConfigError, PipelineError},
    raster::{BoundingBox, Sample},
    synth::{SynthesisConfig, Synthesiser},
};

/// Names the two partitions of a dataset pool.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SplitKind {
    /// Samples used for fitting.
    Train,
    /// Samples held out for evaluation.
    Test,
}

impl SplitKind {
    /// Returns the lowercase label used in logs and metric records.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Flat storage for a generated sample pool.
///
/// Pixels are stored contiguously, `pixel_count` values per sample, with one
/// bounding box per sample alongside.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetPool {
    pixels: Vec<f32>,
    boxes: Vec<BoundingBox>,
    pixel_count: usize,
}

impl DatasetPool {
    /// Generates a pool of `pool_size` samples from the given configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::ZeroPoolSize`] when no samples are requested,
    /// [`ConfigError::PoolSizeOverflow`] when the flat buffer would not fit
    /// in `usize`, and any synthesis configuration error.
    pub fn generate(config: &SynthesisConfig, pool_size: usize) -> Result<Self, ConfigError> {
        if pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        let mut synthesiser = Synthesiser::new(config.clone())?;
        let pixel_count = synthesiser.pixel_count();
        let total = pool_size
            .checked_mul(pixel_count)
            .ok_or(ConfigError::PoolSizeOverflow {
                pool_size,
                pixel_count,
            })?;

        let mut pixels = Vec::with_capacity(total);
        let mut boxes = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let (sample_pixels, bounding_box) = synthesiser.sample().into_parts();
            pixels.extend(sample_pixels);
            boxes.push(bounding_box);
        }

        Ok(Self {
            pixels,
            boxes,
            pixel_count,
        })
    }

    /// Builds a pool from already generated samples.
    ///
    /// # Errors
    /// Returns [`PipelineError::SampleShapeMismatch`] when a sample does not
    /// carry exactly `pixel_count` pixels.
    pub fn from_samples(samples: Vec<Sample>, pixel_count: usize) -> Result<Self, PipelineError> {
        let mut pixels = Vec::with_capacity(samples.len().saturating_mul(pixel_count));
        let mut boxes = Vec::with_capacity(samples.len());
        for (index, sample) in samples.into_iter().enumerate() {
            if sample.pixels().len() != pixel_count {
                return Err(PipelineError::SampleShapeMismatch {
                    index,
                    expected: pixel_count,
                    got: sample.pixels().len(),
                });
            }
            let (sample_pixels, bounding_box) = sample.into_parts();
            pixels.extend(sample_pixels);
            boxes.push(bounding_box);
        }

        Ok(Self {
            pixels,
            boxes,
            pixel_count,
        })
    }

    /// Returns the number of samples in the pool.
    #[rustfmt::skip]
    #[must_use]
    pub fn len(&self) -> usize { self.boxes.len() }

    /// Reports whether the pool holds no samples.
    #[rustfmt::skip]
    #[must_use]
    pub fn is_empty(&self) -> bool { self.boxes.is_empty() }

    /// Returns the number of pixels stored per sample.
    #[rustfmt::skip]
    #[must_use]
    pub const fn pixel_count(&self) -> usize { self.pixel_count }

    /// Returns the pixels of the sample at `index`, if it exists.
    #[must_use]
    pub fn pixels(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.pixel_count)?;
        let end = start.checked_add(self.pixel_count)?;
        self.pixels.get(start..end)
    }

    /// Returns the bounding box of the sample at `index`, if it exists.
    #[must_use]
    pub fn bounding_box(&self, index: usize) -> Option<&BoundingBox> {
        self.boxes.get(index)
    }
}

/// A pool partitioned into train and test splits.
///
/// # Examples
/// ```
/// use boxfit_core::{Dataset, DatasetPool, SynthesisConfig};
///
/// let pool = DatasetPool::generate(&SynthesisConfig::default(), 10)
///     .expect("pool generation succeeds");
/// let dataset = Dataset::partition(pool, 6).expect("train count fits the pool");
/// assert_eq!(dataset.train().len(), 6);
/// assert_eq!(dataset.test().len(), 4);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pool: DatasetPool,
    train_count: usize,
}

impl Dataset {
    /// Partitions a pool so the first `train_count` samples form the training
    /// split and the remainder the test split.
    ///
    /// Either split may be empty at this layer; session construction imposes
    /// the stricter non-empty requirement.
    ///
    /// # Errors
    /// Returns [`ConfigError::TrainCountExceedsPool`] when `train_count`
    /// exceeds the pool size.
    pub fn partition(pool: DatasetPool, train_count: usize) -> Result<Self, ConfigError> {
        if train_count > pool.len() {
            return Err(ConfigError::TrainCountExceedsPool {
                train_count,
                pool_size: pool.len(),
            });
        }
        Ok(Self { pool, train_count })
    }

    /// Returns the view of the requested split.
    #[must_use]
    pub fn split(&self, kind: SplitKind) -> Split<'_> {
        match kind {
            SplitKind::Train => Split {
                pool: &self.pool,
                offset: 0,
                len: self.train_count,
                kind,
            },
            SplitKind::Test => Split {
                pool: &self.pool,
                offset: self.train_count,
                len: self.pool.len() - self.train_count,
                kind,
            },
        }
    }

    /// Returns the training split view.
    #[rustfmt::skip]
    #[must_use]
    pub fn train(&self) -> Split<'_> { self.split(SplitKind::Train) }

    /// Returns the test split view.
    #[rustfmt::skip]
    #[must_use]
    pub fn test(&self) -> Split<'_> { self.split(SplitKind::Test) }

    /// Returns the total number of samples in the underlying pool.
    #[rustfmt::skip]
    #[must_use]
    pub fn len(&self) -> usize { self.pool.len() }

    /// Reports whether the underlying pool holds no samples.
    #[rustfmt::skip]
    #[must_use]
    pub fn is_empty(&self) -> bool { self.pool.is_empty() }

    /// Returns the number of pixels stored per sample.
    #[rustfmt::skip]
    #[must_use]
    pub const fn pixel_count(&self) -> usize { self.pool.pixel_count() }
}

/// Read-only view of one contiguous split of a pool.
#[derive(Clone, Copy, Debug)]
pub struct Split<'a> {
    pool: &'a DatasetPool,
    offset: usize,
    len: usize,
    kind: SplitKind,
}

impl Split<'_> {
    /// Returns the number of samples in the split.
    #[rustfmt::skip]
    #[must_use]
    pub const fn len(&self) -> usize { self.len }

    /// Reports whether the split holds no samples.
    #[rustfmt::skip]
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.len == 0 }

    /// Returns which partition this view covers.
    #[rustfmt::skip]
    #[must_use]
    pub const fn kind(&self) -> SplitKind { self.kind }

    /// Returns the number of pixels stored per sample.
    #[rustfmt::skip]
    #[must_use]
    pub const fn pixel_count(&self) -> usize { self.pool.pixel_count() }

    /// Returns the pixels of the split-relative sample at `index`.
    #[must_use]
    pub fn pixels(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len {
            return None;
        }
        self.pool.pixels(self.offset.checked_add(index)?)
    }

    /// Returns the bounding box of the split-relative sample at `index`.
    #[must_use]
    pub fn bounding_box(&self, index: usize) -> Option<&BoundingBox> {
        if index >= self.len {
            return None;
        }
        self.pool.bounding_box(self.offset.checked_add(index)?)
    }
}
