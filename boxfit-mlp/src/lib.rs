//! Boxfit dense regressor library.

mod config;
mod regressor;

pub use crate::{
    config::{
        DEFAULT_HIDDEN_UNITS, DEFAULT_INPUT_LEN, DEFAULT_LEARNING_RATE, MlpConfig, MlpConfigError,
    },
    regressor::DenseRegressor,
};
