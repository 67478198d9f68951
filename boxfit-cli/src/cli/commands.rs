//! Command definitions and execution for the boxfit CLI.
//!
//! Two commands are exposed: `train` drives the full pipeline from dataset
//! generation through fitting to metric and overlay export, while `sample`
//! writes generated rasters and their labels to disk for inspection.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use boxfit_core::{
    BoundingBox, CancelToken, ConfigError, DEFAULT_BATCH_SIZE, DEFAULT_EVAL_BATCH_SIZE,
    DEFAULT_EVAL_EVERY, DEFAULT_POOL_SIZE, DEFAULT_TRAIN_BATCHES, DEFAULT_TRAIN_COUNT, FitModel,
    MetricPoint, ModelError, PipelineError, ReshufflePolicy, RunSummary, Session, SessionBuilder,
    SynthesisConfig, Synthesiser, TrainError, TrainingHistory, TrainingRun, TrainingSchedule,
};
use boxfit_mlp::{
    DEFAULT_HIDDEN_UNITS, DEFAULT_LEARNING_RATE, DenseRegressor, MlpConfig, MlpConfigError,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing::{Span, field, info, instrument};

use super::render::{
    BoxDto, MetricRecord, PredictionRendering, SampleRecord, create_jsonl_writer, ensure_dir,
    render_prediction, render_sample, write_jsonl_line,
};

/// Top-level CLI options parsed by [`clap`].
#[derive(Clone, Debug, Parser)]
#[command(name = "boxfit", about = "Train and inspect the rectangle-fitting pipeline")]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Generate a dataset and train the dense regressor on it.
    Train(TrainCommand),
    /// Generate rasters and write them to disk with their labels.
    Sample(SampleCommand),
}

/// Options accepted by the `train` command.
#[derive(Clone, Debug, Args)]
pub struct TrainCommand {
    /// Total number of samples to generate.
    #[arg(long = "pool-size", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Number of generated samples assigned to the training split.
    #[arg(long = "train-count", default_value_t = DEFAULT_TRAIN_COUNT)]
    pub train_count: usize,

    /// Edge length of each square raster, in pixels.
    #[arg(long = "raster-edge", default_value_t = SynthesisConfig::DEFAULT_RASTER_EDGE)]
    pub raster_edge: u32,

    /// Smallest rectangle edge drawn into a raster.
    #[arg(long = "min-rect-size", default_value_t = SynthesisConfig::DEFAULT_MIN_RECT_SIZE)]
    pub min_rect_size: u32,

    /// Largest rectangle edge drawn into a raster.
    #[arg(long = "max-rect-size", default_value_t = SynthesisConfig::DEFAULT_MAX_RECT_SIZE)]
    pub max_rect_size: u32,

    /// Seed for dataset generation, shuffling, and weight initialisation.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Number of training batches to run.
    #[arg(long = "train-batches", default_value_t = DEFAULT_TRAIN_BATCHES)]
    pub train_batches: usize,

    /// Samples drawn for each training batch.
    #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Run an evaluation checkpoint every this many batches.
    #[arg(long = "eval-every", default_value_t = DEFAULT_EVAL_EVERY)]
    pub eval_every: usize,

    /// Samples drawn for each evaluation batch.
    #[arg(long = "eval-batch-size", default_value_t = DEFAULT_EVAL_BATCH_SIZE)]
    pub eval_batch_size: usize,

    /// Width of the hidden layer.
    #[arg(long = "hidden-units", default_value_t = DEFAULT_HIDDEN_UNITS)]
    pub hidden_units: usize,

    /// Stochastic-gradient-descent step size.
    #[arg(long = "learning-rate", default_value_t = DEFAULT_LEARNING_RATE)]
    pub learning_rate: f32,

    /// When the shuffled index order is rebuilt.
    #[arg(long, value_enum, default_value_t = ReshuffleArg::Never)]
    pub reshuffle: ReshuffleArg,

    /// Write loss and accuracy records to this JSONL file.
    #[arg(long = "metrics-out")]
    pub metrics_out: Option<PathBuf>,

    /// Render prediction overlays into this directory after training.
    #[arg(long = "render-dir")]
    pub render_dir: Option<PathBuf>,

    /// Number of test samples to render.
    #[arg(long = "render-count", default_value_t = 8)]
    pub render_count: usize,

    /// Pixel multiplier applied to rendered rasters.
    #[arg(long = "render-scale", default_value_t = 8)]
    pub render_scale: u32,
}

/// Options accepted by the `sample` command.
#[derive(Clone, Debug, Args)]
pub struct SampleCommand {
    /// Directory receiving `images/` and `labels.jsonl`.
    pub out_dir: PathBuf,

    /// Number of samples to generate.
    #[arg(long, default_value_t = 16)]
    pub count: usize,

    /// Seed for raster generation.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Edge length of each square raster, in pixels.
    #[arg(long = "raster-edge", default_value_t = SynthesisConfig::DEFAULT_RASTER_EDGE)]
    pub raster_edge: u32,

    /// Smallest rectangle edge drawn into a raster.
    #[arg(long = "min-rect-size", default_value_t = SynthesisConfig::DEFAULT_MIN_RECT_SIZE)]
    pub min_rect_size: u32,

    /// Largest rectangle edge drawn into a raster.
    #[arg(long = "max-rect-size", default_value_t = SynthesisConfig::DEFAULT_MAX_RECT_SIZE)]
    pub max_rect_size: u32,
}

/// Reshuffle policy as exposed on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ReshuffleArg {
    /// Keep one shuffled order for the whole run.
    Never,
    /// Rebuild the order at the start of every pass.
    EveryCycle,
}

impl From<ReshuffleArg> for ReshufflePolicy {
    fn from(value: ReshuffleArg) -> Self {
        match value {
            ReshuffleArg::Never => Self::Never,
            ReshuffleArg::EveryCycle => Self::EveryCycle,
        }
    }
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// File or directory I/O failed while writing an output artefact.
    #[error("failed to write `{path}`: {source}")]
    Io {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// PNG encoding or saving failed.
    #[error("failed to save image `{path}`: {source}")]
    Image {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying encoder error.
        #[source]
        source: image::ImageError,
    },
    /// Metric or label serialisation failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Dataset, schedule, or synthesis configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The regressor configuration was rejected.
    #[error(transparent)]
    Mlp(#[from] MlpConfigError),
    /// Drawing a batch from the session failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The regressor rejected its inputs.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// The training run failed.
    #[error(transparent)]
    Train(#[from] TrainError),
}

impl CliError {
    /// Return the stable machine-readable code of the underlying failure,
    /// when one exists.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::Io { .. } | Self::Image { .. } | Self::Json(_) => None,
            Self::Config(error) => Some(error.code()),
            Self::Mlp(error) => Some(error.code()),
            Self::Pipeline(error) => Some(error.code()),
            Self::Model(error) => Some(error.code()),
            Self::Train(error) => Some(error.code()),
        }
    }

    /// Return the code of the failure a training error wrapped, when one
    /// exists.
    #[must_use]
    pub const fn detail_code(&self) -> Option<&'static str> {
        match self {
            Self::Train(error) => error.inner_code(),
            _ => None,
        }
    }
}

/// Summarises the outcome of executing a CLI command.
#[derive(Clone, Debug)]
pub enum ExecutionSummary {
    /// Outcome of a training run.
    Train(TrainSummary),
    /// Outcome of dataset sampling.
    Sample(SampleSummary),
}

/// Reportable outcome of the `train` command.
#[derive(Clone, Debug)]
pub struct TrainSummary {
    /// Final state and metrics of the run.
    pub run: RunSummary,
    /// Number of metric records written, when a metrics file was requested.
    pub metric_records: Option<usize>,
    /// Number of prediction overlays rendered, when a render directory was
    /// requested.
    pub rendered: Option<usize>,
}

/// Reportable outcome of the `sample` command.
#[derive(Clone, Debug)]
pub struct SampleSummary {
    /// Directory the images and labels were written into.
    pub out_dir: PathBuf,
    /// Number of samples written.
    pub count: usize,
}

/// Execute the parsed command and produce its summary.
///
/// # Errors
/// Returns [`CliError`] if the command's configuration is rejected, the run
/// fails, or an output artefact cannot be written.
///
/// # Examples
/// ```
/// # use std::error::Error;
/// # use boxfit_cli::cli::{Cli, Command, ExecutionSummary, SampleCommand, run_cli};
/// # use tempfile::TempDir;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let dir = TempDir::new()?;
/// let cli = Cli {
///     command: Command::Sample(SampleCommand {
///         out_dir: dir.path().to_path_buf(),
///         count: 2,
///         seed: 7,
///         raster_edge: 8,
///         min_rect_size: 2,
///         max_rect_size: 4,
///     }),
/// };
/// let summary = run_cli(cli)?;
/// assert!(matches!(summary, ExecutionSummary::Sample(sample) if sample.count == 2));
/// # Ok(())
/// # }
/// ```
#[instrument(name = "cli.run", err, skip(cli), fields(command = field::Empty))]
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    match cli.command {
        Command::Train(command) => {
            Span::current().record("command", field::display("train"));
            run_train(command).map(ExecutionSummary::Train)
        }
        Command::Sample(command) => {
            Span::current().record("command", field::display("sample"));
            run_sample(command).map(ExecutionSummary::Sample)
        }
    }
}

/// Run the full train pipeline: build the session, fit the regressor, and
/// export the requested artefacts.
#[instrument(
    name = "cli.train",
    err,
    skip(command),
    fields(pool_size = field::Empty, train_batches = field::Empty, seed = field::Empty)
)]
pub(super) fn run_train(command: TrainCommand) -> Result<TrainSummary, CliError> {
    let span = Span::current();
    span.record("pool_size", field::display(command.pool_size));
    span.record("train_batches", field::display(command.train_batches));
    span.record("seed", field::display(command.seed));

    let builder = SessionBuilder::new()
        .with_synthesis(SynthesisConfig {
            raster_edge: command.raster_edge,
            min_rect_size: command.min_rect_size,
            max_rect_size: command.max_rect_size,
            seed: command.seed,
        })
        .with_pool_size(command.pool_size)
        .with_train_count(command.train_count)
        .with_reshuffle_policy(command.reshuffle.into());
    let schedule = TrainingSchedule {
        train_batches: command.train_batches,
        batch_size: command.batch_size,
        eval_every: command.eval_every,
        eval_batch_size: command.eval_batch_size,
    };
    let input_len = builder.synthesis().pixel_count()?;
    let model = DenseRegressor::new(MlpConfig {
        input_len,
        hidden_units: command.hidden_units,
        learning_rate: command.learning_rate,
        seed: command.seed,
    })?;

    let mut run = TrainingRun::new(builder, schedule, model)?;
    let summary = run.run(&CancelToken::new())?;
    info!(
        state = %summary.state,
        steps = summary.completed_steps,
        "training finished"
    );

    let (model, history, session) = run.into_parts();
    let metric_records = match command.metrics_out.as_deref() {
        Some(path) => Some(write_metrics(path, &history)?),
        None => None,
    };
    let rendered = match (command.render_dir.as_deref(), session) {
        (Some(dir), Some(mut session)) => Some(render_predictions(
            dir,
            &model,
            &mut session,
            command.raster_edge,
            command.render_count,
            command.render_scale,
        )?),
        _ => None,
    };

    Ok(TrainSummary {
        run: summary,
        metric_records,
        rendered,
    })
}

/// Generate rasters and write `images/*.png` plus `labels.jsonl` under the
/// output directory.
#[instrument(
    name = "cli.sample",
    err,
    skip(command),
    fields(out_dir = field::Empty, count = field::Empty, seed = field::Empty)
)]
pub(super) fn run_sample(command: SampleCommand) -> Result<SampleSummary, CliError> {
    let span = Span::current();
    span.record("out_dir", field::display(command.out_dir.display()));
    span.record("count", field::display(command.count));
    span.record("seed", field::display(command.seed));

    let mut synthesiser = Synthesiser::new(SynthesisConfig {
        raster_edge: command.raster_edge,
        min_rect_size: command.min_rect_size,
        max_rect_size: command.max_rect_size,
        seed: command.seed,
    })?;

    let images_dir = command.out_dir.join("images");
    ensure_dir(&images_dir)?;
    let labels_path = command.out_dir.join("labels.jsonl");
    let mut writer = create_jsonl_writer(&labels_path)?;

    for index in 0..command.count {
        let sample = synthesiser.sample();
        let file_name = format!("{index:06}.png");
        render_sample(sample.pixels(), command.raster_edge, &images_dir.join(&file_name))?;
        let record = SampleRecord {
            schema: "v1",
            image: format!("images/{file_name}"),
            bounding_box: BoxDto::from(sample.bounding_box()),
            seed: command.seed,
        };
        write_jsonl_line(&mut writer, &record, &labels_path)?;
    }
    writer.flush().map_err(|source| CliError::Io {
        path: labels_path.clone(),
        source,
    })?;
    info!(samples = command.count, "dataset sample written");

    Ok(SampleSummary {
        out_dir: command.out_dir,
        count: command.count,
    })
}

/// Write every recorded loss and accuracy value to `path` as JSONL.
#[instrument(name = "cli.write_metrics", err, skip(history), fields(path = field::Empty))]
fn write_metrics(path: &Path, history: &TrainingHistory) -> Result<usize, CliError> {
    Span::current().record("path", field::display(path.display()));

    let mut writer = create_jsonl_writer(path)?;
    let mut written = 0_usize;
    for point in history.losses() {
        write_jsonl_line(&mut writer, &metric_record("loss", point), path)?;
        written = written.saturating_add(1);
    }
    for point in history.accuracies() {
        write_jsonl_line(&mut writer, &metric_record("accuracy", point), path)?;
        written = written.saturating_add(1);
    }
    writer.flush().map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(records = written, "metrics written");
    Ok(written)
}

fn metric_record(metric: &'static str, point: &MetricPoint) -> MetricRecord {
    MetricRecord {
        metric,
        batch: point.batch,
        value: point.value,
        split: point.split.label(),
    }
}

/// Draw a batch from the test split and write one overlay PNG per row.
#[instrument(
    name = "cli.render_predictions",
    err,
    skip(model, session),
    fields(dir = field::Empty, count = field::Empty)
)]
fn render_predictions(
    dir: &Path,
    model: &DenseRegressor,
    session: &mut Session,
    edge: u32,
    count: usize,
    scale: u32,
) -> Result<usize, CliError> {
    let span = Span::current();
    span.record("dir", field::display(dir.display()));
    span.record("count", field::display(count));

    ensure_dir(dir)?;
    if count == 0 {
        return Ok(0);
    }

    let batch = session.next_test_batch(count)?;
    let mut rendered = 0_usize;
    for (index, (pixels, target)) in batch.feature_rows().zip(batch.label_rows()).enumerate() {
        let predicted = model.predict(pixels)?;
        let mut actual = [0.0_f32; BoundingBox::LABEL_VALUES];
        for (slot, &value) in actual.iter_mut().zip(target) {
            *slot = value;
        }
        let path = dir.join(format!("prediction-{index:03}.png"));
        render_prediction(
            &PredictionRendering {
                pixels,
                edge,
                scale,
                actual,
                predicted,
            },
            &path,
        )?;
        rendered = rendered.saturating_add(1);
    }
    info!(rendered, "prediction overlays written");
    Ok(rendered)
}

/// Render `summary` to `writer` in a human-readable text format.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    match summary {
        ExecutionSummary::Train(train) => {
            writeln!(writer, "state: {}", train.run.state)?;
            writeln!(writer, "completed batches: {}", train.run.completed_steps)?;
            if let Some(loss) = train.run.final_train_loss {
                writeln!(writer, "final train loss: {loss:.6}")?;
            }
            if let Some(loss) = train.run.final_eval_loss {
                writeln!(writer, "final test loss: {loss:.6}")?;
            }
            if let Some(accuracy) = train.run.final_eval_accuracy {
                writeln!(writer, "final test accuracy: {accuracy:.4}")?;
            }
            if let Some(records) = train.metric_records {
                writeln!(writer, "metric records: {records}")?;
            }
            if let Some(rendered) = train.rendered {
                writeln!(writer, "rendered predictions: {rendered}")?;
            }
        }
        ExecutionSummary::Sample(sample) => {
            writeln!(writer, "samples: {}", sample.count)?;
            writeln!(writer, "output directory: {}", sample.out_dir.display())?;
        }
    }
    Ok(())
}
