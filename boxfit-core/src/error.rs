//! Error types for the boxfit core library.
//!
//! Defines the configuration, pipeline, model, and training error enums
//! exposed by the public API. Every variant carries a stable machine-readable
//! code so logging sinks and callers can branch without parsing messages.

use thiserror::Error;

use crate::{dataset::SplitKind, train::RunState};

/// An error raised while validating pipeline configuration.
///
/// Configuration errors are reported before any dataset is generated; the
/// pipeline never clamps or repairs invalid parameters.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ConfigError {
    /// The raster edge length was zero.
    #[error("raster edge length must be at least 1")]
    ZeroRasterEdge,
    /// The minimum rectangle size was zero.
    #[error("minimum rectangle size must be at least 1")]
    ZeroRectSize,
    /// The rectangle size range had `min > max`.
    #[error("rectangle size range is inverted: min={min}, max={max}")]
    InvertedRectSizeRange {
        /// Configured minimum rectangle size.
        min: u32,
        /// Configured maximum rectangle size.
        max: u32,
    },
    /// The maximum rectangle size exceeded the raster edge.
    #[error("maximum rectangle size {max} does not fit a raster of edge {edge}")]
    RectExceedsRaster {
        /// Configured maximum rectangle size.
        max: u32,
        /// Configured raster edge length.
        edge: u32,
    },
    /// The raster's pixel count overflowed `usize`.
    #[error("a raster of edge {edge} has more pixels than usize can address")]
    RasterOverflow {
        /// Configured raster edge length.
        edge: u32,
    },
    /// The requested pool size was zero.
    #[error("pool size must be at least 1")]
    ZeroPoolSize,
    /// The requested `pool_size * pixel_count` overflowed `usize`.
    #[error("pool of {pool_size} samples with {pixel_count} pixels each overflows usize")]
    PoolSizeOverflow {
        /// Number of samples requested.
        pool_size: usize,
        /// Pixels per sample implied by the raster edge.
        pixel_count: usize,
    },
    /// The train count exceeded the pool size.
    #[error("train count {train_count} exceeds pool size {pool_size}")]
    TrainCountExceedsPool {
        /// Number of samples requested for the training split.
        train_count: usize,
        /// Total number of samples in the pool.
        pool_size: usize,
    },
    /// A partition left the named split without any samples.
    #[error("the {split} split would be empty under this configuration")]
    EmptySplit {
        /// Split that would receive no samples.
        split: SplitKind,
    },
    /// A training schedule parameter was zero.
    #[error("schedule parameter `{parameter}` must be at least 1")]
    ZeroScheduleParameter {
        /// Name of the offending parameter.
        parameter: &'static str,
    },
}

impl ConfigError {
    /// Return the stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ZeroRasterEdge => "CONFIG_ZERO_RASTER_EDGE",
            Self::ZeroRectSize => "CONFIG_ZERO_RECT_SIZE",
            Self::InvertedRectSizeRange { .. } => "CONFIG_INVERTED_RECT_SIZE_RANGE",
            Self::RectExceedsRaster { .. } => "CONFIG_RECT_EXCEEDS_RASTER",
            Self::RasterOverflow { .. } => "CONFIG_RASTER_OVERFLOW",
            Self::ZeroPoolSize => "CONFIG_ZERO_POOL_SIZE",
            Self::PoolSizeOverflow { .. } => "CONFIG_POOL_SIZE_OVERFLOW",
            Self::TrainCountExceedsPool { .. } => "CONFIG_TRAIN_COUNT_EXCEEDS_POOL",
            Self::EmptySplit { .. } => "CONFIG_EMPTY_SPLIT",
            Self::ZeroScheduleParameter { .. } => "CONFIG_ZERO_SCHEDULE_PARAMETER",
        }
    }
}

/// An error raised when a runtime precondition of the pipeline is violated.
///
/// These surface misuse of otherwise valid components, such as drawing a
/// batch from an empty split, and are never silently repaired.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PipelineError {
    /// An index sequence was requested over zero elements.
    #[error("index sequence length must be at least 1")]
    EmptySequence,
    /// A batch was requested from a split containing no samples.
    #[error("cannot draw a batch from the empty {split} split")]
    EmptySplitDraw {
        /// Split the batch was requested from.
        split: SplitKind,
    },
    /// The sequencer and split cover different numbers of samples.
    #[error("index sequence covers {sequence_len} samples but the split holds {split_len}")]
    SequenceLengthMismatch {
        /// Length of the index sequence.
        sequence_len: usize,
        /// Length of the split.
        split_len: usize,
    },
    /// A generated sample did not match the pool's pixel count.
    #[error("sample {index} has {got} pixels but the pool stores {expected} per sample")]
    SampleShapeMismatch {
        /// Position of the offending sample.
        index: usize,
        /// Pixels per sample recorded by the pool.
        expected: usize,
        /// Pixels carried by the offending sample.
        got: usize,
    },
    /// The requested `batch_size * pixel_count` overflowed `usize`.
    #[error("batch of {batch_size} samples with {pixel_count} pixels each overflows usize")]
    BatchOverflow {
        /// Number of samples requested.
        batch_size: usize,
        /// Pixels per sample.
        pixel_count: usize,
    },
    /// A sequencer produced an index outside the split.
    #[error("index {index} is out of range for a split of {split_len} samples")]
    IndexOutOfRange {
        /// The out-of-range index.
        index: usize,
        /// Length of the split.
        split_len: usize,
    },
}

impl PipelineError {
    /// Return the stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptySequence => "PIPELINE_EMPTY_SEQUENCE",
            Self::EmptySplitDraw { .. } => "PIPELINE_EMPTY_SPLIT_DRAW",
            Self::SequenceLengthMismatch { .. } => "PIPELINE_SEQUENCE_LENGTH_MISMATCH",
            Self::SampleShapeMismatch { .. } => "PIPELINE_SAMPLE_SHAPE_MISMATCH",
            Self::BatchOverflow { .. } => "PIPELINE_BATCH_OVERFLOW",
            Self::IndexOutOfRange { .. } => "PIPELINE_INDEX_OUT_OF_RANGE",
        }
    }
}

/// An error produced by [`crate::FitModel`] implementations.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ModelError {
    /// The batch's feature width did not match the model input width.
    #[error("batch carries {got} pixels per sample but the model expects {expected}")]
    FeatureShapeMismatch {
        /// Input width expected by the model.
        expected: usize,
        /// Pixels per sample carried by the batch.
        got: usize,
    },
    /// The batch's label width did not match the model output width.
    #[error("batch carries {got} label values per sample but the model expects {expected}")]
    LabelShapeMismatch {
        /// Output width expected by the model.
        expected: usize,
        /// Label values per sample carried by the batch.
        got: usize,
    },
    /// The batch contained no samples.
    #[error("cannot fit or evaluate an empty batch")]
    EmptyBatch,
    /// The loss left the finite range, so the update was abandoned.
    #[error("training loss became non-finite; parameters were left unchanged")]
    NonFiniteLoss,
}

impl ModelError {
    /// Return the stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::FeatureShapeMismatch { .. } => "MODEL_FEATURE_SHAPE_MISMATCH",
            Self::LabelShapeMismatch { .. } => "MODEL_LABEL_SHAPE_MISMATCH",
            Self::EmptyBatch => "MODEL_EMPTY_BATCH",
            Self::NonFiniteLoss => "MODEL_NON_FINITE_LOSS",
        }
    }
}

/// An error produced while driving a [`crate::TrainingRun`].
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TrainError {
    /// An operation was invoked in a state that does not permit it.
    #[error("`{operation}` is not permitted in the {actual} state (expected {expected})")]
    InvalidState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// States in which the operation is permitted.
        expected: &'static str,
        /// State the run was actually in.
        actual: RunState,
    },
    /// Session construction failed while beginning the run.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Batch assembly failed mid-run.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The model rejected a batch or diverged.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl TrainError {
    /// Return the stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "TRAIN_INVALID_STATE",
            Self::Config(_) => "TRAIN_CONFIG_FAILURE",
            Self::Pipeline(_) => "TRAIN_PIPELINE_FAILURE",
            Self::Model(_) => "TRAIN_MODEL_FAILURE",
        }
    }

    /// Retrieve the code of the wrapped error when one exists.
    #[must_use]
    pub const fn inner_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidState { .. } => None,
            Self::Config(error) => Some(error.code()),
            Self::Pipeline(error) => Some(error.code()),
            Self::Model(error) => Some(error.code()),
        }
    }
}
