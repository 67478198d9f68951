//! Metric capture for training runs.

use crate::dataset::SplitKind;

/// Loss and accuracy observed on one batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitMetrics {
    /// Mean squared error over the batch.
    pub loss: f32,
    /// Fraction of rows whose prediction matched the target closely enough.
    pub accuracy: f32,
}

/// One recorded metric value, tagged with the batch it was measured at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricPoint {
    /// Zero-based index of the training batch the value belongs to.
    pub batch: usize,
    /// The measured value.
    pub value: f32,
    /// Which split the value was measured on.
    pub split: SplitKind,
}

/// Append-only record of every metric a run produced.
///
/// Training loss is recorded at every step; test loss and accuracy only at
/// evaluation checkpoints, tagged with the training batch they interleave
/// with so the two series plot on one axis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingHistory {
    losses: Vec<MetricPoint>,
    accuracies: Vec<MetricPoint>,
}

impl TrainingHistory {
    pub(crate) fn record_loss(&mut self, batch: usize, value: f32, split: SplitKind) {
        self.losses.push(MetricPoint {
            batch,
            value,
            split,
        });
    }

    pub(crate) fn record_accuracy(&mut self, batch: usize, value: f32, split: SplitKind) {
        self.accuracies.push(MetricPoint {
            batch,
            value,
            split,
        });
    }

    /// Returns every recorded loss point in recording order.
    #[rustfmt::skip]
    #[must_use]
    pub fn losses(&self) -> &[MetricPoint] { &self.losses }

    /// Returns every recorded accuracy point in recording order.
    #[rustfmt::skip]
    #[must_use]
    pub fn accuracies(&self) -> &[MetricPoint] { &self.accuracies }

    /// Returns the most recent loss recorded for the given split.
    #[must_use]
    pub fn last_loss(&self, split: SplitKind) -> Option<f32> {
        self.losses
            .iter()
            .rev()
            .find(|point| point.split == split)
            .map(|point| point.value)
    }

    /// Returns the most recent accuracy recorded for the given split.
    #[must_use]
    pub fn last_accuracy(&self, split: SplitKind) -> Option<f32> {
        self.accuracies
            .iter()
            .rev()
            .find(|point| point.split == split)
            .map(|point| point.value)
    }
}
