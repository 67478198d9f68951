//! Flat batch assembly from split views.
//!
//! A batch pairs `batch_size` feature rows with matching label rows in two
//! contiguous buffers, ready for row-major consumption by a model. Rows are
//! drawn through an [`IndexSequencer`] so repeated assembly walks the split
//! in shuffled order and wraps when a batch spans the end of a pass.

use std::slice::ChunksExact;

use crate::{
    dataset::Split, error::PipelineError, raster::BoundingBox, sequencer::IndexSequencer,
};

/// Feature and label rows drawn from one split.
///
/// # Examples
/// ```
/// use boxfit_core::{
///     Batch, Dataset, DatasetPool, IndexSequencer, ReshufflePolicy, SynthesisConfig,
/// };
///
/// let pool = DatasetPool::generate(&SynthesisConfig::default(), 8)
///     .expect("pool generation succeeds");
/// let dataset = Dataset::partition(pool, 8).expect("train count fits the pool");
/// let split = dataset.train();
/// let mut sequencer = IndexSequencer::new(split.len(), 3, ReshufflePolicy::Never)
///     .expect("the split is non-empty");
/// let batch = Batch::from_split(&split, &mut sequencer, 2).expect("batch assembles");
/// assert_eq!(batch.features().len(), 2 * 1024);
/// assert_eq!(batch.labels().len(), 2 * 4);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    features: Vec<f32>,
    labels: Vec<f32>,
    batch_size: usize,
    pixel_count: usize,
}

impl Batch {
    /// Assembles a batch of `batch_size` rows drawn from `split` in the
    /// order dictated by `sequencer`.
    ///
    /// A zero `batch_size` yields an empty batch without consuming any
    /// sequencer draws.
    ///
    /// # Errors
    /// Returns [`PipelineError::EmptySplitDraw`] when the split holds no
    /// samples, [`PipelineError::SequenceLengthMismatch`] when the sequencer
    /// was built for a different split length, and
    /// [`PipelineError::BatchOverflow`] when the flat buffers would not fit
    /// in `usize`.
    pub fn from_split(
        split: &Split<'_>,
        sequencer: &mut IndexSequencer,
        batch_size: usize,
    ) -> Result<Self, PipelineError> {
        let pixel_count = split.pixel_count();
        if batch_size == 0 {
            return Ok(Self {
                features: Vec::new(),
                labels: Vec::new(),
                batch_size: 0,
                pixel_count,
            });
        }
        if split.is_empty() {
            return Err(PipelineError::EmptySplitDraw { split: split.kind() });
        }
        if sequencer.len() != split.len() {
            return Err(PipelineError::SequenceLengthMismatch {
                sequence_len: sequencer.len(),
                split_len: split.len(),
            });
        }

        let feature_len =
            batch_size
                .checked_mul(pixel_count)
                .ok_or(PipelineError::BatchOverflow {
                    batch_size,
                    pixel_count,
                })?;
        let label_len = batch_size
            .checked_mul(BoundingBox::LABEL_VALUES)
            .ok_or(PipelineError::BatchOverflow {
                batch_size,
                pixel_count,
            })?;

        let mut features = Vec::with_capacity(feature_len);
        let mut labels = Vec::with_capacity(label_len);
        for _ in 0..batch_size {
            let index = sequencer.next_index();
            let pixels = split.pixels(index).ok_or(PipelineError::IndexOutOfRange {
                index,
                split_len: split.len(),
            })?;
            let bounding_box =
                split
                    .bounding_box(index)
                    .ok_or(PipelineError::IndexOutOfRange {
                        index,
                        split_len: split.len(),
                    })?;
            features.extend_from_slice(pixels);
            labels.extend_from_slice(&bounding_box.to_label());
        }

        Ok(Self {
            features,
            labels,
            batch_size,
            pixel_count,
        })
    }

    /// Returns the flat feature buffer, `pixel_count` values per row.
    #[rustfmt::skip]
    #[must_use]
    pub fn features(&self) -> &[f32] { &self.features }

    /// Returns the flat label buffer, four values per row.
    #[rustfmt::skip]
    #[must_use]
    pub fn labels(&self) -> &[f32] { &self.labels }

    /// Returns the number of rows in the batch.
    #[rustfmt::skip]
    #[must_use]
    pub const fn batch_size(&self) -> usize { self.batch_size }

    /// Returns the number of feature values per row.
    #[rustfmt::skip]
    #[must_use]
    pub const fn pixel_count(&self) -> usize { self.pixel_count }

    /// Reports whether the batch holds no rows.
    #[rustfmt::skip]
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.batch_size == 0 }

    /// Iterates over feature rows in draw order.
    #[must_use]
    pub fn feature_rows(&self) -> ChunksExact<'_, f32> {
        // The chunk size must be non-zero; degenerate zero-pixel pools
        // simply yield no rows.
        self.features.chunks_exact(self.pixel_count.max(1))
    }

    /// Iterates over label rows in draw order.
    #[must_use]
    pub fn label_rows(&self) -> ChunksExact<'_, f32> {
        self.labels.chunks_exact(BoundingBox::LABEL_VALUES)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        dataset::{Dataset, DatasetPool, SplitKind},
        sequencer::ReshufflePolicy,
        synth::SynthesisConfig,
    };

    fn small_pool(pool_size: usize) -> DatasetPool {
        let config = SynthesisConfig {
            raster_edge: 8,
            min_rect_size: 2,
            max_rect_size: 4,
            seed: 17,
        };
        DatasetPool::generate(&config, pool_size).expect("pool generation succeeds")
    }

    #[fixture]
    fn dataset() -> Dataset {
        Dataset::partition(small_pool(10), 10).expect("partition succeeds")
    }

    fn sequencer_for(len: usize) -> IndexSequencer {
        IndexSequencer::new(len, 3, ReshufflePolicy::Never).expect("sequencer builds")
    }

    #[rstest]
    fn batches_carry_flat_row_major_buffers(dataset: Dataset) {
        let split = dataset.train();
        let mut sequencer = sequencer_for(split.len());
        let batch = Batch::from_split(&split, &mut sequencer, 4).expect("batch assembles");

        assert_eq!(batch.batch_size(), 4);
        assert_eq!(batch.pixel_count(), 64);
        assert_eq!(batch.features().len(), 4 * 64);
        assert_eq!(batch.labels().len(), 4 * BoundingBox::LABEL_VALUES);
        assert_eq!(batch.feature_rows().count(), 4);
        assert_eq!(batch.label_rows().count(), 4);
    }

    #[rstest]
    fn oversized_batches_wrap_and_repeat_rows(dataset: Dataset) {
        let split = dataset.train();
        let mut sequencer = sequencer_for(split.len());
        let batch = Batch::from_split(&split, &mut sequencer, 25).expect("batch assembles");

        assert_eq!(batch.batch_size(), 25);
        let rows: Vec<&[f32]> = batch.feature_rows().collect();
        let labels: Vec<&[f32]> = batch.label_rows().collect();
        // The sequence never reshuffles, so draws repeat with period ten.
        for (early, late) in rows.iter().zip(rows.iter().skip(10)) {
            assert_eq!(early, late);
        }
        for (early, late) in labels.iter().zip(labels.iter().skip(10)) {
            assert_eq!(early, late);
        }
    }

    #[rstest]
    fn zero_sized_batches_are_empty(dataset: Dataset) {
        let split = dataset.train();
        let mut sequencer = sequencer_for(split.len());
        let batch = Batch::from_split(&split, &mut sequencer, 0).expect("empty batch is valid");

        assert!(batch.is_empty());
        assert_eq!(batch.batch_size(), 0);
        assert!(batch.features().is_empty());
        assert!(batch.labels().is_empty());
        assert_eq!(batch.feature_rows().count(), 0);
    }

    #[rstest]
    fn drawing_from_an_empty_split_fails() {
        let dataset = Dataset::partition(small_pool(10), 10).expect("partition succeeds");
        let split = dataset.test();
        let mut sequencer = sequencer_for(1);
        let error =
            Batch::from_split(&split, &mut sequencer, 4).expect_err("empty split must fail");
        assert!(matches!(
            error,
            PipelineError::EmptySplitDraw {
                split: SplitKind::Test,
            }
        ));
    }

    #[rstest]
    fn mismatched_sequencers_are_rejected(dataset: Dataset) {
        let split = dataset.train();
        let mut sequencer = sequencer_for(5);
        let error =
            Batch::from_split(&split, &mut sequencer, 4).expect_err("length mismatch must fail");
        assert!(matches!(
            error,
            PipelineError::SequenceLengthMismatch {
                sequence_len: 5,
                split_len: 10,
            }
        ));
    }

    #[rstest]
    #[case::single_row(1)]
    #[case::wrapping_rows(3)]
    fn singleton_splits_repeat_their_only_label(#[case] batch_size: usize) {
        let pool = DatasetPool::generate(&SynthesisConfig::default(), 1)
            .expect("pool generation succeeds");
        let expected = pool
            .bounding_box(0)
            .copied()
            .expect("the only sample exists")
            .to_label();
        let dataset = Dataset::partition(pool, 1).expect("partition succeeds");
        let split = dataset.train();
        let mut sequencer = sequencer_for(1);
        let batch =
            Batch::from_split(&split, &mut sequencer, batch_size).expect("batch assembles");

        assert_eq!(batch.pixel_count(), 1024);
        assert_eq!(batch.features().len(), batch_size * 1024);
        assert_eq!(batch.labels().len(), batch_size * BoundingBox::LABEL_VALUES);
        assert_eq!(batch.label_rows().count(), batch_size);
        for label in batch.label_rows() {
            assert_eq!(label, expected);
            for value in label {
                assert!((0.0..=32.0).contains(value));
            }
        }
    }
}
