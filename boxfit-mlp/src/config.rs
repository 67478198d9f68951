//! Configuration for the dense bounding-box regressor.

use boxfit_core::BoundingBox;
use thiserror::Error;

/// Default width of the hidden layer.
pub const DEFAULT_HIDDEN_UNITS: usize = 200;

/// Default stochastic-gradient-descent step size.
pub const DEFAULT_LEARNING_RATE: f32 = 0.03;

/// Default number of input features: one per pixel of a 32 by 32 raster.
pub const DEFAULT_INPUT_LEN: usize = 1_024;

/// Shape and optimiser settings for a
/// [`DenseRegressor`](crate::DenseRegressor).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MlpConfig {
    /// Number of input features per row.
    pub input_len: usize,
    /// Width of the single hidden layer.
    pub hidden_units: usize,
    /// Stochastic-gradient-descent step size.
    pub learning_rate: f32,
    /// Seed for weight initialisation.
    pub seed: u64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            input_len: DEFAULT_INPUT_LEN,
            hidden_units: DEFAULT_HIDDEN_UNITS,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 0,
        }
    }
}

impl MlpConfig {
    pub(crate) fn validate(&self) -> Result<(), MlpConfigError> {
        if self.input_len == 0 {
            return Err(MlpConfigError::ZeroInputLen);
        }
        if self.hidden_units == 0 {
            return Err(MlpConfigError::ZeroHiddenUnits);
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(MlpConfigError::InvalidLearningRate {
                got: self.learning_rate,
            });
        }
        if self.input_len.checked_mul(self.hidden_units).is_none()
            || self
                .hidden_units
                .checked_mul(BoundingBox::LABEL_VALUES)
                .is_none()
        {
            return Err(MlpConfigError::LayerOverflow {
                input_len: self.input_len,
                hidden_units: self.hidden_units,
            });
        }
        Ok(())
    }
}

/// An error raised by an invalid regressor configuration.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MlpConfigError {
    /// The input width was zero.
    #[error("input length must be at least 1")]
    ZeroInputLen,
    /// The hidden layer width was zero.
    #[error("hidden layer width must be at least 1")]
    ZeroHiddenUnits,
    /// The learning rate was zero, negative, or non-finite.
    #[error("learning rate must be finite and positive, got {got}")]
    InvalidLearningRate {
        /// The rejected value.
        got: f32,
    },
    /// A weight matrix would hold more values than `usize` can address.
    #[error("a layer of {input_len} by {hidden_units} weights overflows usize")]
    LayerOverflow {
        /// Configured input width.
        input_len: usize,
        /// Configured hidden width.
        hidden_units: usize,
    },
}

impl MlpConfigError {
    /// Return the stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ZeroInputLen => "MLP_ZERO_INPUT_LEN",
            Self::ZeroHiddenUnits => "MLP_ZERO_HIDDEN_UNITS",
            Self::InvalidLearningRate { .. } => "MLP_INVALID_LEARNING_RATE",
            Self::LayerOverflow { .. } => "MLP_LAYER_OVERFLOW",
        }
    }
}
