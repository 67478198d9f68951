//! Unit tests for CLI parsing, command execution, and summary rendering.

use std::fs;

use boxfit_core::{RunState, RunSummary};
use clap::Parser;
use rstest::rstest;
use serde_json::Value;
use tempfile::TempDir;

use super::commands::{run_sample, run_train};
use super::{
    Cli, Command, ExecutionSummary, ReshuffleArg, SampleCommand, SampleSummary, TrainCommand,
    TrainSummary, render_summary,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn temp_dir() -> TempDir {
    TempDir::new().expect("temporary directory must be created")
}

fn small_train_command() -> TrainCommand {
    TrainCommand {
        pool_size: 12,
        train_count: 8,
        raster_edge: 8,
        min_rect_size: 2,
        max_rect_size: 4,
        seed: 11,
        train_batches: 4,
        batch_size: 4,
        eval_every: 2,
        eval_batch_size: 4,
        hidden_units: 8,
        learning_rate: 0.01,
        reshuffle: ReshuffleArg::Never,
        metrics_out: None,
        render_dir: None,
        render_count: 2,
        render_scale: 4,
    }
}

fn small_sample_command(out_dir: &TempDir, seed: u64) -> SampleCommand {
    SampleCommand {
        out_dir: out_dir.path().to_path_buf(),
        count: 3,
        seed,
        raster_edge: 8,
        min_rect_size: 2,
        max_rect_size: 4,
    }
}

#[rstest]
fn train_defaults_mirror_the_library_constants() -> TestResult {
    let cli = Cli::try_parse_from(["boxfit", "train"])?;
    let Command::Train(command) = cli.command else {
        panic!("expected the train command");
    };
    assert_eq!(command.pool_size, 40_000);
    assert_eq!(command.train_count, 32_000);
    assert_eq!(command.raster_edge, 32);
    assert_eq!(command.min_rect_size, 4);
    assert_eq!(command.max_rect_size, 16);
    assert_eq!(command.train_batches, 2_000);
    assert_eq!(command.batch_size, 100);
    assert_eq!(command.eval_every, 5);
    assert_eq!(command.eval_batch_size, 1_000);
    assert_eq!(command.hidden_units, 200);
    assert!((command.learning_rate - 0.03).abs() < f32::EPSILON);
    assert_eq!(command.reshuffle, ReshuffleArg::Never);
    assert!(command.metrics_out.is_none());
    assert!(command.render_dir.is_none());
    Ok(())
}

#[rstest]
fn train_flags_override_defaults() -> TestResult {
    let cli = Cli::try_parse_from([
        "boxfit",
        "train",
        "--pool-size",
        "100",
        "--train-count",
        "80",
        "--seed",
        "9",
        "--reshuffle",
        "every-cycle",
        "--learning-rate",
        "0.05",
        "--metrics-out",
        "metrics.jsonl",
    ])?;
    let Command::Train(command) = cli.command else {
        panic!("expected the train command");
    };
    assert_eq!(command.pool_size, 100);
    assert_eq!(command.train_count, 80);
    assert_eq!(command.seed, 9);
    assert_eq!(command.reshuffle, ReshuffleArg::EveryCycle);
    assert!((command.learning_rate - 0.05).abs() < f32::EPSILON);
    assert_eq!(
        command.metrics_out.as_deref(),
        Some(std::path::Path::new("metrics.jsonl"))
    );
    Ok(())
}

#[rstest]
#[case::unknown_policy(&["boxfit", "train", "--reshuffle", "sometimes"])]
#[case::missing_out_dir(&["boxfit", "sample"])]
#[case::unknown_command(&["boxfit", "shuffle"])]
fn invalid_invocations_are_rejected(#[case] args: &[&str]) {
    assert!(Cli::try_parse_from(args.iter().copied()).is_err());
}

#[rstest]
fn run_sample_writes_images_and_labels() -> TestResult {
    let dir = temp_dir();
    let summary = run_sample(small_sample_command(&dir, 5))?;
    assert_eq!(summary.count, 3);
    assert_eq!(summary.out_dir, dir.path());

    for index in 0..3 {
        let image = dir.path().join("images").join(format!("{index:06}.png"));
        assert!(image.is_file(), "missing {}", image.display());
    }

    let labels = fs::read_to_string(dir.path().join("labels.jsonl"))?;
    let lines: Vec<&str> = labels.lines().collect();
    assert_eq!(lines.len(), 3);
    for (index, line) in lines.iter().enumerate() {
        let record: Value = serde_json::from_str(line)?;
        assert_eq!(record["schema"], "v1");
        assert_eq!(record["seed"], 5);
        assert_eq!(record["image"], format!("images/{index:06}.png"));
        let width = record["bounding_box"]["width"]
            .as_u64()
            .expect("width must be numeric");
        assert!((2..=4).contains(&width), "width {width} out of range");
    }
    Ok(())
}

#[rstest]
fn sampling_is_deterministic_per_seed() -> TestResult {
    let first = temp_dir();
    let second = temp_dir();
    run_sample(small_sample_command(&first, 5))?;
    run_sample(small_sample_command(&second, 5))?;

    let first_labels = fs::read_to_string(first.path().join("labels.jsonl"))?;
    let second_labels = fs::read_to_string(second.path().join("labels.jsonl"))?;
    assert_eq!(first_labels, second_labels);

    let first_image = fs::read(first.path().join("images").join("000000.png"))?;
    let second_image = fs::read(second.path().join("images").join("000000.png"))?;
    assert_eq!(first_image, second_image);
    Ok(())
}

#[rstest]
fn run_train_completes_and_writes_artefacts() -> TestResult {
    let dir = temp_dir();
    let metrics_path = dir.path().join("metrics.jsonl");
    let render_dir = dir.path().join("renders");
    let mut command = small_train_command();
    command.metrics_out = Some(metrics_path.clone());
    command.render_dir = Some(render_dir.clone());

    let summary = run_train(command)?;
    assert_eq!(summary.run.state, RunState::Done);
    assert_eq!(summary.run.completed_steps, 4);
    assert!(summary.run.final_train_loss.is_some());
    assert!(summary.run.final_eval_loss.is_some());
    assert!(summary.run.final_eval_accuracy.is_some());

    // Four train losses, plus one eval loss and accuracy per checkpoint at
    // batches zero and two.
    assert_eq!(summary.metric_records, Some(8));
    let metrics = fs::read_to_string(&metrics_path)?;
    assert_eq!(metrics.lines().count(), 8);
    for line in metrics.lines() {
        let record: Value = serde_json::from_str(line)?;
        let metric = record["metric"].as_str().expect("metric must be a string");
        assert!(metric == "loss" || metric == "accuracy");
        let split = record["split"].as_str().expect("split must be a string");
        assert!(split == "train" || split == "test");
        assert!(record["value"].as_f64().expect("value must be numeric").is_finite());
    }

    assert_eq!(summary.rendered, Some(2));
    for index in 0..2 {
        let image = render_dir.join(format!("prediction-{index:03}.png"));
        assert!(image.is_file(), "missing {}", image.display());
    }
    Ok(())
}

#[rstest]
fn run_train_rejects_oversized_train_counts() {
    let mut command = small_train_command();
    command.train_count = 20;
    let error = match run_train(command) {
        Ok(_) => panic!("oversized train count must be rejected"),
        Err(error) => error,
    };
    assert_eq!(error.code(), Some("TRAIN_CONFIG_FAILURE"));
    assert_eq!(error.detail_code(), Some("CONFIG_TRAIN_COUNT_EXCEEDS_POOL"));
}

#[rstest]
fn run_train_rejects_zero_schedule_parameters() {
    let mut command = small_train_command();
    command.batch_size = 0;
    let error = match run_train(command) {
        Ok(_) => panic!("a zero batch size must be rejected"),
        Err(error) => error,
    };
    assert_eq!(error.code(), Some("CONFIG_ZERO_SCHEDULE_PARAMETER"));
    assert_eq!(error.detail_code(), None);
}

#[rstest]
fn render_summary_reports_training_runs() -> TestResult {
    let summary = ExecutionSummary::Train(TrainSummary {
        run: RunSummary {
            state: RunState::Done,
            completed_steps: 6,
            final_train_loss: Some(0.5),
            final_eval_loss: Some(0.375),
            final_eval_accuracy: Some(0.25),
        },
        metric_records: Some(9),
        rendered: None,
    });
    let mut buffer = Vec::new();
    render_summary(&summary, &mut buffer)?;
    let text = String::from_utf8(buffer)?;
    assert!(text.contains("state: done"));
    assert!(text.contains("completed batches: 6"));
    assert!(text.contains("final train loss: 0.500000"));
    assert!(text.contains("final test loss: 0.375000"));
    assert!(text.contains("final test accuracy: 0.2500"));
    assert!(text.contains("metric records: 9"));
    assert!(!text.contains("rendered predictions"));
    Ok(())
}

#[rstest]
fn render_summary_reports_sample_runs() -> TestResult {
    let summary = ExecutionSummary::Sample(SampleSummary {
        out_dir: "/tmp/boxfit-out".into(),
        count: 4,
    });
    let mut buffer = Vec::new();
    render_summary(&summary, &mut buffer)?;
    let text = String::from_utf8(buffer)?;
    assert!(text.contains("samples: 4"));
    assert!(text.contains("/tmp/boxfit-out"));
    Ok(())
}
