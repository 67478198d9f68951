//! Training drive: the schedule, the run state machine, and the model seam.
//!
//! The driver owns a [`SessionBuilder`] rather than a built session, so a run
//! can be constructed cheaply and the expensive pool generation deferred to
//! [`TrainingRun::begin`]. Models plug in through [`FitModel`]; the driver
//! never inspects parameters, it only routes batches and records metrics.

mod cancel;
mod metrics;


use std::fmt;

use tracing::{info, instrument, warn};

pub use cancel::CancelToken;
pub use metrics::{FitMetrics, MetricPoint, TrainingHistory};

use crate::{
    batch::Batch,
    dataset::SplitKind,
    error::{ConfigError, ModelError, TrainError},
    raster::BoundingBox,
    session::{Session, SessionBuilder},
};

/// Default number of training batches in a run.
pub const DEFAULT_TRAIN_BATCHES: usize = 2_000;

/// Default number of samples per training batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default cadence of evaluation checkpoints, in training batches.
pub const DEFAULT_EVAL_EVERY: usize = 5;

/// Default number of samples per evaluation batch.
pub const DEFAULT_EVAL_BATCH_SIZE: usize = 1_000;

/// Seam between the training driver and a concrete model.
pub trait FitModel {
    /// Runs one optimisation step on the batch and reports its metrics.
    ///
    /// # Errors
    /// Returns a [`ModelError`] when the batch shape does not match the
    /// model or the update would corrupt the parameters.
    fn fit_batch(&mut self, batch: &Batch) -> Result<FitMetrics, ModelError>;

    /// Measures loss and accuracy on the batch without updating parameters.
    ///
    /// # Errors
    /// Returns a [`ModelError`] when the batch shape does not match the
    /// model.
    fn evaluate(&self, batch: &Batch) -> Result<FitMetrics, ModelError>;

    /// Predicts one bounding-box label from one feature row.
    ///
    /// # Errors
    /// Returns a [`ModelError`] when the row length does not match the
    /// model's input width.
    fn predict(&self, pixels: &[f32]) -> Result<[f32; BoundingBox::LABEL_VALUES], ModelError>;
}

/// How many batches to train on, how large they are, and how often to
/// pause for an evaluation checkpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TrainingSchedule {
    /// Total number of training batches in the run.
    pub train_batches: usize,
    /// Samples per training batch.
    pub batch_size: usize,
    /// Evaluate after every this many training batches, starting at the
    /// first.
    pub eval_every: usize,
    /// Samples per evaluation batch.
    pub eval_batch_size: usize,
}

impl Default for TrainingSchedule {
    fn default() -> Self {
        Self {
            train_batches: DEFAULT_TRAIN_BATCHES,
            batch_size: DEFAULT_BATCH_SIZE,
            eval_every: DEFAULT_EVAL_EVERY,
            eval_batch_size: DEFAULT_EVAL_BATCH_SIZE,
        }
    }
}

impl TrainingSchedule {
    fn validate(&self) -> Result<(), ConfigError> {
        let parameters = [
            ("train_batches", self.train_batches),
            ("batch_size", self.batch_size),
            ("eval_every", self.eval_every),
            ("eval_batch_size", self.eval_batch_size),
        ];
        for (parameter, value) in parameters {
            if value == 0 {
                return Err(ConfigError::ZeroScheduleParameter { parameter });
            }
        }
        Ok(())
    }
}

/// Lifecycle state of a [`TrainingRun`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RunState {
    /// Constructed; no session exists yet.
    Idle,
    /// Pool generation in progress.
    Generating,
    /// A session exists and steps are accepted.
    Training,
    /// Every scheduled batch has been consumed.
    Done,
    /// The run was stopped before completing its schedule.
    Cancelled,
}

impl RunState {
    /// Returns the lowercase label used in logs and error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Training => "training",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metrics produced by one call to [`TrainingRun::step`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    /// Zero-based index of the completed training batch.
    pub step: usize,
    /// Metrics measured on the training batch that was just fitted.
    pub train: FitMetrics,
    /// Metrics from the evaluation checkpoint, when this step had one.
    pub eval: Option<FitMetrics>,
}

/// Condensed outcome of a run, suitable for reporting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    /// State the run ended in.
    pub state: RunState,
    /// Number of training batches consumed.
    pub completed_steps: usize,
    /// Most recent training loss, when any step completed.
    pub final_train_loss: Option<f32>,
    /// Most recent evaluation loss, when any checkpoint ran.
    pub final_eval_loss: Option<f32>,
    /// Most recent evaluation accuracy, when any checkpoint ran.
    pub final_eval_accuracy: Option<f32>,
}

/// Drives a model through a schedule of shuffled batches.
///
/// # Examples
/// ```
/// use boxfit_core::{
///     Batch, CancelToken, FitMetrics, FitModel, ModelError, RunState, SessionBuilder,
///     SynthesisConfig, TrainingRun, TrainingSchedule,
/// };
///
/// struct Constant;
///
/// impl FitModel for Constant {
///     fn fit_batch(&mut self, _batch: &Batch) -> Result<FitMetrics, ModelError> {
///         Ok(FitMetrics { loss: 1.0, accuracy: 0.0 })
///     }
///
///     fn evaluate(&self, _batch: &Batch) -> Result<FitMetrics, ModelError> {
///         Ok(FitMetrics { loss: 1.0, accuracy: 0.0 })
///     }
///
///     fn predict(&self, _pixels: &[f32]) -> Result<[f32; 4], ModelError> {
///         Ok([0.0; 4])
///     }
/// }
///
/// let builder = SessionBuilder::new()
///     .with_synthesis(SynthesisConfig {
///         raster_edge: 8,
///         min_rect_size: 2,
///         max_rect_size: 4,
///         seed: 5,
///     })
///     .with_pool_size(10)
///     .with_train_count(8);
/// let schedule = TrainingSchedule {
///     train_batches: 4,
///     batch_size: 2,
///     eval_every: 2,
///     eval_batch_size: 2,
/// };
/// let mut run = TrainingRun::new(builder, schedule, Constant)
///     .expect("the schedule is valid");
/// let summary = run.run(&CancelToken::new()).expect("the run completes");
/// assert_eq!(summary.state, RunState::Done);
/// assert_eq!(summary.completed_steps, 4);
/// ```
#[derive(Debug)]
pub struct TrainingRun<M> {
    builder: SessionBuilder,
    schedule: TrainingSchedule,
    model: M,
    session: Option<Session>,
    state: RunState,
    completed_steps: usize,
    eval_countdown: usize,
    history: TrainingHistory,
}

impl<M: FitModel> TrainingRun<M> {
    /// Creates an idle run over the given session configuration and model.
    ///
    /// # Errors
    /// Returns [`ConfigError::ZeroScheduleParameter`] when any schedule
    /// field is zero.
    pub fn new(
        builder: SessionBuilder,
        schedule: TrainingSchedule,
        model: M,
    ) -> Result<Self, ConfigError> {
        schedule.validate()?;
        Ok(Self {
            builder,
            schedule,
            model,
            session: None,
            state: RunState::Idle,
            completed_steps: 0,
            eval_countdown: 0,
            history: TrainingHistory::default(),
        })
    }

    /// Generates the dataset and moves the run into the training state.
    ///
    /// On failure the run returns to idle so a corrected configuration can
    /// be retried through a fresh run.
    ///
    /// # Errors
    /// Returns [`TrainError::InvalidState`] unless the run is idle, or the
    /// session construction error.
    pub fn begin(&mut self) -> Result<(), TrainError> {
        if self.state != RunState::Idle {
            return Err(TrainError::InvalidState {
                operation: "begin",
                expected: "idle",
                actual: self.state,
            });
        }
        self.state = RunState::Generating;
        let session = match self.builder.clone().build() {
            Ok(session) => session,
            Err(error) => {
                self.state = RunState::Idle;
                return Err(error.into());
            }
        };
        info!(
            train = session.train_len(),
            test = session.test_len(),
            "training session ready"
        );
        self.session = Some(session);
        self.state = RunState::Training;
        self.eval_countdown = 0;
        Ok(())
    }

    /// Fits one training batch, then evaluates when a checkpoint is due.
    ///
    /// Checkpoints land on steps `0`, `eval_every`, `2 * eval_every`, and so
    /// on, and measure the model as it stands after that step's fit. A
    /// pipeline or model failure leaves the run in the training state; the
    /// caller decides whether to retry, cancel, or drop the run.
    ///
    /// # Errors
    /// Returns [`TrainError::InvalidState`] unless the run is training, or
    /// the batch assembly or model error.
    pub fn step(&mut self) -> Result<StepReport, TrainError> {
        if self.state != RunState::Training {
            return Err(TrainError::InvalidState {
                operation: "step",
                expected: "training",
                actual: self.state,
            });
        }
        let Some(session) = self.session.as_mut() else {
            return Err(TrainError::InvalidState {
                operation: "step",
                expected: "training",
                actual: RunState::Idle,
            });
        };

        let step = self.completed_steps;
        let batch = session.next_train_batch(self.schedule.batch_size)?;
        let eval_batch = if self.eval_countdown == 0 {
            self.eval_countdown = self.schedule.eval_every.saturating_sub(1);
            Some(session.next_test_batch(self.schedule.eval_batch_size)?)
        } else {
            self.eval_countdown = self.eval_countdown.saturating_sub(1);
            None
        };

        let train = self.model.fit_batch(&batch)?;
        self.history.record_loss(step, train.loss, SplitKind::Train);

        let eval = match eval_batch {
            Some(eval_batch) => {
                let metrics = self.model.evaluate(&eval_batch)?;
                self.history.record_loss(step, metrics.loss, SplitKind::Test);
                self.history
                    .record_accuracy(step, metrics.accuracy, SplitKind::Test);
                Some(metrics)
            }
            None => None,
        };

        self.completed_steps = self.completed_steps.saturating_add(1);
        if self.completed_steps >= self.schedule.train_batches {
            self.state = RunState::Done;
            info!(steps = self.completed_steps, "training complete");
        }
        Ok(StepReport { step, train, eval })
    }

    /// Stops a training run before its schedule completes.
    ///
    /// # Errors
    /// Returns [`TrainError::InvalidState`] unless the run is training.
    pub fn cancel(&mut self) -> Result<(), TrainError> {
        if self.state != RunState::Training {
            return Err(TrainError::InvalidState {
                operation: "cancel",
                expected: "training",
                actual: self.state,
            });
        }
        self.state = RunState::Cancelled;
        warn!(steps = self.completed_steps, "training cancelled");
        Ok(())
    }

    /// Drives the run to completion or cancellation.
    ///
    /// An idle run is begun first; a training run resumes where it left
    /// off. The token is checked before every step, so cancellation takes
    /// effect at the next step boundary.
    ///
    /// # Errors
    /// Returns [`TrainError::InvalidState`] when the run has already
    /// finished, or the first error raised by a step.
    #[instrument(
        name = "training.run",
        err,
        skip(self, token),
        fields(
            train_batches = self.schedule.train_batches,
            batch_size = self.schedule.batch_size,
            eval_every = self.schedule.eval_every,
        )
    )]
    pub fn run(&mut self, token: &CancelToken) -> Result<RunSummary, TrainError> {
        match self.state {
            RunState::Idle => self.begin()?,
            RunState::Training => {}
            RunState::Generating | RunState::Done | RunState::Cancelled => {
                return Err(TrainError::InvalidState {
                    operation: "run",
                    expected: "idle or training",
                    actual: self.state,
                });
            }
        }

        while self.state == RunState::Training {
            if token.is_cancelled() {
                self.cancel()?;
                break;
            }
            let report = self.step()?;
            if let Some(eval) = report.eval {
                info!(
                    step = report.step,
                    train_loss = report.train.loss,
                    eval_loss = eval.loss,
                    eval_accuracy = eval.accuracy,
                    "evaluation checkpoint"
                );
            }
        }
        Ok(self.summary())
    }

    /// Returns the current lifecycle state.
    #[rustfmt::skip]
    #[must_use]
    pub const fn state(&self) -> RunState { self.state }

    /// Returns the number of training batches consumed so far.
    #[rustfmt::skip]
    #[must_use]
    pub const fn completed_steps(&self) -> usize { self.completed_steps }

    /// Returns the schedule the run was configured with.
    #[rustfmt::skip]
    #[must_use]
    pub const fn schedule(&self) -> TrainingSchedule { self.schedule }

    /// Returns every metric recorded so far.
    #[rustfmt::skip]
    #[must_use]
    pub const fn history(&self) -> &TrainingHistory { &self.history }

    /// Returns the model being trained.
    #[rustfmt::skip]
    #[must_use]
    pub const fn model(&self) -> &M { &self.model }

    /// Returns the session, once [`TrainingRun::begin`] has built one.
    #[rustfmt::skip]
    #[must_use]
    pub const fn session(&self) -> Option<&Session> { self.session.as_ref() }

    /// Condenses the run's current state and latest metrics.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            state: self.state,
            completed_steps: self.completed_steps,
            final_train_loss: self.history.last_loss(SplitKind::Train),
            final_eval_loss: self.history.last_loss(SplitKind::Test),
            final_eval_accuracy: self.history.last_accuracy(SplitKind::Test),
        }
    }

    /// Consumes the run, handing back the model, the recorded history, and
    /// the session when one was built.
    #[must_use]
    pub fn into_parts(self) -> (M, TrainingHistory, Option<Session>) {
        (self.model, self.history, self.session)
    }
}
