//! Two-layer dense regressor trained with stochastic gradient descent.
//!
//! Architecture: input, one hidden ReLU layer, four ReLU outputs. The output
//! activation is deliberate: box coordinates and sizes are never negative,
//! so clamping at zero matches the label domain. Fitting averages gradients
//! over the batch and applies a single update, guarded so a non-finite loss
//! leaves the parameters untouched.

use boxfit_core::{Batch, BoundingBox, FitMetrics, FitModel, ModelError};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::debug;

use crate::config::{MlpConfig, MlpConfigError};

/// Predictions at or above this overlap with their target count as correct.
const IOU_THRESHOLD: f32 = 0.5;

fn relu(z: f32) -> f32 {
    z.max(0.0)
}

fn relu_gradient(z: f32) -> f32 {
    if z > 0.0 { 1.0 } else { 0.0 }
}

fn rect_area(width: f32, height: f32) -> f32 {
    if width <= 0.0 || height <= 0.0 {
        0.0
    } else {
        width * height
    }
}

/// Intersection-over-union of two `[x, y, width, height]` rectangles.
///
/// Degenerate rectangles have zero area, and an empty union scores zero
/// rather than dividing by it.
fn rect_iou(a: &[f32], b: &[f32]) -> f32 {
    let &[ax, ay, aw, ah] = a else { return 0.0 };
    let &[bx, by, bw, bh] = b else { return 0.0 };

    let overlap_w = (ax + aw).min(bx + bw) - ax.max(bx);
    let overlap_h = (ay + ah).min(by + bh) - ay.max(by);
    let intersection = rect_area(overlap_w, overlap_h);
    let union = rect_area(aw, ah) + rect_area(bw, bh) - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
}

fn iou_hit(prediction: &[f32], target: &[f32]) -> bool {
    rect_iou(prediction, target) >= IOU_THRESHOLD
}

/// One fully connected layer with flat row-major weights.
#[derive(Clone, Debug, PartialEq)]
struct DenseLayer {
    weights: Vec<f32>,
    biases: Vec<f32>,
    input_len: usize,
    output_len: usize,
}

impl DenseLayer {
    /// Initialises He-style uniform weights and a small positive bias so
    /// ReLU units start alive.
    fn new(input_len: usize, output_len: usize, rng: &mut SmallRng) -> Self {
        let limit = (6.0 / input_len as f32).sqrt();
        let weight_count = input_len.saturating_mul(output_len);
        let weights = (0..weight_count)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self {
            weights,
            biases: vec![0.01; output_len],
            input_len,
            output_len,
        }
    }

    /// Computes pre-activations and ReLU activations for one input row.
    fn forward(&self, input: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut pre = Vec::with_capacity(self.output_len);
        for (row, bias) in self.weights.chunks_exact(self.input_len).zip(&self.biases) {
            let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
            pre.push(sum + bias);
        }
        let activated = pre.iter().map(|&z| relu(z)).collect();
        (pre, activated)
    }

    /// Adds this row's parameter gradients for the given pre-activation
    /// deltas into the accumulator.
    fn accumulate(&self, grads: &mut LayerGrads, input: &[f32], dz: &[f32]) {
        let rows = grads.weights.chunks_exact_mut(self.input_len);
        for ((&delta, grad_row), grad_bias) in dz.iter().zip(rows).zip(grads.biases.iter_mut()) {
            *grad_bias += delta;
            for (grad, &value) in grad_row.iter_mut().zip(input) {
                *grad += delta * value;
            }
        }
    }

    /// Propagates pre-activation deltas back to the previous layer's
    /// activations.
    fn backward(&self, dz: &[f32]) -> Vec<f32> {
        let mut upstream = vec![0.0; self.input_len];
        for (row, &delta) in self.weights.chunks_exact(self.input_len).zip(dz) {
            for (acc, &weight) in upstream.iter_mut().zip(row) {
                *acc += weight * delta;
            }
        }
        upstream
    }

    /// Applies one scaled gradient-descent step.
    fn apply(&mut self, grads: &LayerGrads, scale: f32) {
        for (weight, grad) in self.weights.iter_mut().zip(&grads.weights) {
            *weight -= scale * grad;
        }
        for (bias, grad) in self.biases.iter_mut().zip(&grads.biases) {
            *bias -= scale * grad;
        }
    }
}

/// Accumulated parameter gradients for one layer.
#[derive(Clone, Debug)]
struct LayerGrads {
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl LayerGrads {
    fn zeros(layer: &DenseLayer) -> Self {
        Self {
            weights: vec![0.0; layer.weights.len()],
            biases: vec![0.0; layer.biases.len()],
        }
    }
}

struct RowActivations {
    hidden_pre: Vec<f32>,
    hidden_act: Vec<f32>,
    out_pre: Vec<f32>,
    prediction: Vec<f32>,
}

/// Dense two-layer regressor mapping flattened rasters to box labels.
///
/// # Examples
/// ```
/// use boxfit_core::{FitModel, SessionBuilder, SynthesisConfig};
/// use boxfit_mlp::{DenseRegressor, MlpConfig};
///
/// let mut session = SessionBuilder::new()
///     .with_synthesis(SynthesisConfig {
///         raster_edge: 8,
///         min_rect_size: 2,
///         max_rect_size: 4,
///         seed: 3,
///     })
///     .with_pool_size(10)
///     .with_train_count(8)
///     .build()
///     .expect("the configuration is valid");
/// let mut model = DenseRegressor::new(MlpConfig {
///     input_len: 64,
///     hidden_units: 16,
///     ..MlpConfig::default()
/// })
/// .expect("the configuration is valid");
///
/// let batch = session.next_train_batch(4).expect("a train batch assembles");
/// let metrics = model.fit_batch(&batch).expect("the shapes match");
/// assert!(metrics.loss.is_finite());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DenseRegressor {
    hidden: DenseLayer,
    output: DenseLayer,
    config: MlpConfig,
}

impl DenseRegressor {
    /// Builds a regressor with weights drawn deterministically from the
    /// configured seed.
    ///
    /// # Errors
    /// Returns an [`MlpConfigError`] when the configuration is invalid.
    pub fn new(config: MlpConfig) -> Result<Self, MlpConfigError> {
        config.validate()?;
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let hidden = DenseLayer::new(config.input_len, config.hidden_units, &mut rng);
        let output = DenseLayer::new(config.hidden_units, BoundingBox::LABEL_VALUES, &mut rng);
        debug!(
            input_len = config.input_len,
            hidden_units = config.hidden_units,
            "regressor initialised"
        );
        Ok(Self {
            hidden,
            output,
            config,
        })
    }

    /// Returns the configuration the regressor was built with.
    #[rustfmt::skip]
    #[must_use]
    pub const fn config(&self) -> &MlpConfig { &self.config }

    fn forward_row(&self, pixels: &[f32]) -> RowActivations {
        let (hidden_pre, hidden_act) = self.hidden.forward(pixels);
        let (out_pre, prediction) = self.output.forward(&hidden_act);
        RowActivations {
            hidden_pre,
            hidden_act,
            out_pre,
            prediction,
        }
    }

    fn check_batch(&self, batch: &Batch) -> Result<(), ModelError> {
        if batch.is_empty() {
            return Err(ModelError::EmptyBatch);
        }
        if batch.pixel_count() != self.config.input_len {
            return Err(ModelError::FeatureShapeMismatch {
                expected: self.config.input_len,
                got: batch.pixel_count(),
            });
        }
        let label_values = batch
            .labels()
            .len()
            .checked_div(batch.batch_size())
            .unwrap_or(0);
        if label_values != BoundingBox::LABEL_VALUES {
            return Err(ModelError::LabelShapeMismatch {
                expected: BoundingBox::LABEL_VALUES,
                got: label_values,
            });
        }
        Ok(())
    }
}

impl FitModel for DenseRegressor {
    fn fit_batch(&mut self, batch: &Batch) -> Result<FitMetrics, ModelError> {
        self.check_batch(batch)?;

        let batch_size = batch.batch_size();
        let label_values = BoundingBox::LABEL_VALUES as f32;
        let mut hidden_grads = LayerGrads::zeros(&self.hidden);
        let mut output_grads = LayerGrads::zeros(&self.output);
        let mut loss_sum = 0.0_f32;
        let mut hits = 0_usize;

        for (pixels, target) in batch.feature_rows().zip(batch.label_rows()) {
            let row = self.forward_row(pixels);

            // Mean squared error over the four label values; the gradient
            // through the mean is 2 * (prediction - target) / 4, gated by
            // the output ReLU.
            let mut dz_out = Vec::with_capacity(BoundingBox::LABEL_VALUES);
            let predictions = row.prediction.iter().zip(target).zip(&row.out_pre);
            for ((&predicted, &expected), &pre) in predictions {
                let diff = predicted - expected;
                loss_sum += diff * diff / label_values;
                dz_out.push(2.0 * diff / label_values * relu_gradient(pre));
            }
            if iou_hit(&row.prediction, target) {
                hits += 1;
            }

            self.output
                .accumulate(&mut output_grads, &row.hidden_act, &dz_out);
            let upstream = self.output.backward(&dz_out);
            let dz_hidden: Vec<f32> = upstream
                .iter()
                .zip(&row.hidden_pre)
                .map(|(&da, &pre)| da * relu_gradient(pre))
                .collect();
            self.hidden.accumulate(&mut hidden_grads, pixels, &dz_hidden);
        }

        let loss = loss_sum / batch_size as f32;
        if !loss.is_finite() {
            return Err(ModelError::NonFiniteLoss);
        }
        let scale = self.config.learning_rate / batch_size as f32;
        self.hidden.apply(&hidden_grads, scale);
        self.output.apply(&output_grads, scale);

        Ok(FitMetrics {
            loss,
            accuracy: hits as f32 / batch_size as f32,
        })
    }

    fn evaluate(&self, batch: &Batch) -> Result<FitMetrics, ModelError> {
        self.check_batch(batch)?;

        let label_values = BoundingBox::LABEL_VALUES as f32;
        let mut loss_sum = 0.0_f32;
        let mut hits = 0_usize;
        for (pixels, target) in batch.feature_rows().zip(batch.label_rows()) {
            let row = self.forward_row(pixels);
            for (&predicted, &expected) in row.prediction.iter().zip(target) {
                let diff = predicted - expected;
                loss_sum += diff * diff / label_values;
            }
            if iou_hit(&row.prediction, target) {
                hits += 1;
            }
        }

        let batch_size = batch.batch_size();
        Ok(FitMetrics {
            loss: loss_sum / batch_size as f32,
            accuracy: hits as f32 / batch_size as f32,
        })
    }

    fn predict(&self, pixels: &[f32]) -> Result<[f32; BoundingBox::LABEL_VALUES], ModelError> {
        if pixels.len() != self.config.input_len {
            return Err(ModelError::FeatureShapeMismatch {
                expected: self.config.input_len,
                got: pixels.len(),
            });
        }
        let row = self.forward_row(pixels);
        let mut label = [0.0_f32; BoundingBox::LABEL_VALUES];
        for (slot, &value) in label.iter_mut().zip(&row.prediction) {
            *slot = value;
        }
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use boxfit_core::{
        CancelToken, RunSummary, Session, SessionBuilder, SynthesisConfig, TrainingHistory,
        TrainingRun, TrainingSchedule,
    };
    use rstest::rstest;

    use super::*;

    fn small_builder(seed: u64) -> SessionBuilder {
        SessionBuilder::new()
            .with_synthesis(SynthesisConfig {
                raster_edge: 8,
                min_rect_size: 2,
                max_rect_size: 4,
                seed,
            })
            .with_pool_size(12)
            .with_train_count(8)
    }

    fn small_session(seed: u64) -> Session {
        small_builder(seed)
            .build()
            .expect("the configuration is valid")
    }

    fn small_model(seed: u64, learning_rate: f32) -> DenseRegressor {
        DenseRegressor::new(MlpConfig {
            input_len: 64,
            hidden_units: 16,
            learning_rate,
            seed,
        })
        .expect("the configuration is valid")
    }

    #[rstest]
    #[case::identical(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0, 4.0], 1.0)]
    #[case::disjoint(&[0.0, 0.0, 2.0, 2.0], &[5.0, 5.0, 2.0, 2.0], 0.0)]
    #[case::half_offset(&[0.0, 0.0, 2.0, 2.0], &[1.0, 0.0, 2.0, 2.0], 1.0 / 3.0)]
    #[case::nested(&[0.0, 0.0, 4.0, 4.0], &[1.0, 1.0, 2.0, 2.0], 0.25)]
    #[case::degenerate(&[0.0, 0.0, 0.0, 2.0], &[0.0, 0.0, 2.0, 2.0], 0.0)]
    #[case::both_empty(&[0.0, 0.0, 0.0, 0.0], &[0.0, 0.0, 0.0, 0.0], 0.0)]
    fn iou_matches_hand_computed_overlaps(
        #[case] a: &[f32],
        #[case] b: &[f32],
        #[case] expected: f32,
    ) {
        assert!((rect_iou(a, b) - expected).abs() < 1e-6);
        assert!((rect_iou(b, a) - expected).abs() < 1e-6);
    }

    #[rstest]
    fn construction_is_deterministic_per_seed() {
        let first = small_model(7, 0.03);
        let second = small_model(7, 0.03);
        let third = small_model(8, 0.03);
        assert_eq!(first, second);
        assert_ne!(first, third);
    }

    #[rstest]
    fn invalid_configurations_are_refused() {
        let error = DenseRegressor::new(MlpConfig {
            hidden_units: 0,
            ..MlpConfig::default()
        })
        .expect_err("a zero-width layer must fail");
        assert_eq!(error.code(), "MLP_ZERO_HIDDEN_UNITS");
    }

    #[rstest]
    fn mismatched_batches_are_refused() {
        let mut session = small_session(3);
        let batch = session.next_train_batch(4).expect("a batch assembles");
        // The model expects 1024 inputs, the batch carries 64.
        let mut model = DenseRegressor::new(MlpConfig {
            seed: 3,
            ..MlpConfig::default()
        })
        .expect("the configuration is valid");

        let error = model
            .fit_batch(&batch)
            .expect_err("the shape mismatch must fail");
        assert!(matches!(
            error,
            ModelError::FeatureShapeMismatch {
                expected: 1024,
                got: 64,
            }
        ));
        let error = model
            .evaluate(&batch)
            .expect_err("the shape mismatch must fail");
        assert_eq!(error.code(), "MODEL_FEATURE_SHAPE_MISMATCH");
    }

    #[rstest]
    fn empty_batches_are_refused() {
        let mut session = small_session(3);
        let batch = session.next_train_batch(0).expect("an empty batch is valid");
        let mut model = small_model(3, 0.03);
        let error = model.fit_batch(&batch).expect_err("an empty batch must fail");
        assert!(matches!(error, ModelError::EmptyBatch));
        let error = model.evaluate(&batch).expect_err("an empty batch must fail");
        assert!(matches!(error, ModelError::EmptyBatch));
    }

    #[rstest]
    fn predictions_are_non_negative_and_shaped() {
        let mut session = small_session(5);
        let model = small_model(5, 0.03);
        let batch = session.next_train_batch(1).expect("a batch assembles");
        let pixels = batch.feature_rows().next().expect("one row exists");

        let label = model.predict(pixels).expect("the shapes match");
        assert_eq!(label.len(), 4);
        for value in label {
            assert!(value.is_finite());
            assert!(value >= 0.0);
        }

        let error = model
            .predict(&[0.0; 10])
            .expect_err("a short row must fail");
        assert!(matches!(
            error,
            ModelError::FeatureShapeMismatch {
                expected: 64,
                got: 10,
            }
        ));
    }

    #[rstest]
    fn evaluation_never_mutates_the_model() {
        let mut session = small_session(9);
        let model = small_model(9, 0.03);
        let snapshot = model.clone();
        let batch = session.next_test_batch(4).expect("a batch assembles");

        let first = model.evaluate(&batch).expect("evaluation succeeds");
        let second = model.evaluate(&batch).expect("evaluation succeeds");
        assert_eq!(first, second);
        assert_eq!(model, snapshot);
        assert!((0.0..=1.0).contains(&first.accuracy));
    }

    #[rstest]
    fn fitting_reduces_loss_on_a_small_problem() {
        let mut session = small_session(11);
        let mut model = small_model(7, 0.01);

        let mut losses = Vec::new();
        for _ in 0..160 {
            let batch = session.next_train_batch(8).expect("a batch assembles");
            let metrics = model.fit_batch(&batch).expect("fitting succeeds");
            assert!(metrics.loss.is_finite());
            assert!((0.0..=1.0).contains(&metrics.accuracy));
            losses.push(metrics.loss);
        }

        let early: f32 = losses.iter().take(5).sum::<f32>() / 5.0;
        let late: f32 = losses.iter().rev().take(5).sum::<f32>() / 5.0;
        assert!(
            late < early * 0.6,
            "loss should fall during training: early {early}, late {late}"
        );
    }

    fn trained_run(seed: u64) -> (RunSummary, TrainingHistory, DenseRegressor) {
        let schedule = TrainingSchedule {
            train_batches: 10,
            batch_size: 4,
            eval_every: 5,
            eval_batch_size: 3,
        };
        let mut run = TrainingRun::new(small_builder(seed), schedule, small_model(seed, 0.01))
            .expect("the schedule is valid");
        let summary = run.run(&CancelToken::new()).expect("the run completes");
        let (model, history, _) = run.into_parts();
        (summary, history, model)
    }

    #[rstest]
    fn identical_seeds_reproduce_the_training_history() {
        let (first_summary, first_history, first_model) = trained_run(21);
        let (second_summary, second_history, second_model) = trained_run(21);
        let (_, other_history, _) = trained_run(22);

        assert!(!first_history.losses().is_empty());
        assert!(!first_history.accuracies().is_empty());
        assert_eq!(first_summary, second_summary);
        assert_eq!(first_history, second_history);
        assert_eq!(first_model, second_model);
        assert_ne!(first_history, other_history);
    }

    #[rstest]
    fn diverged_updates_are_rolled_back() {
        let mut session = small_session(13);
        // A step size this large overshoots into overflow within two fits.
        let mut model = small_model(13, 1.0e20);

        let batch = session.next_train_batch(8).expect("a batch assembles");
        model.fit_batch(&batch).expect("the first fit stays finite");

        let snapshot = model.clone();
        let batch = session.next_train_batch(8).expect("a batch assembles");
        let error = model
            .fit_batch(&batch)
            .expect_err("the blown-up forward pass must fail");
        assert!(matches!(error, ModelError::NonFiniteLoss));
        assert_eq!(model, snapshot);
    }
}
