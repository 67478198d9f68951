//! Boxfit core library.

mod batch;
mod dataset;
mod error;
mod raster;
mod sequencer;
mod session;
mod synth;
mod train;

pub use crate::{
    batch::Batch,
    dataset::{Dataset, DatasetPool, Split, SplitKind},
    error::{ConfigError, ModelError, PipelineError, TrainError},
    raster::{BoundingBox, Sample},
    sequencer::{IndexSequencer, ReshufflePolicy},
    session::{DEFAULT_POOL_SIZE, DEFAULT_TRAIN_COUNT, Session, SessionBuilder},
    synth::{SynthesisConfig, Synthesiser},
    train::{
        CancelToken, DEFAULT_BATCH_SIZE, DEFAULT_EVAL_BATCH_SIZE, DEFAULT_EVAL_EVERY,
        DEFAULT_TRAIN_BATCHES, FitMetrics, FitModel, MetricPoint, RunState, RunSummary,
        StepReport, TrainingHistory, TrainingRun, TrainingSchedule,
    },
};
