//! Hyperparameter configuration, loadable from TOML.
//!
//! Every field has a serde default matching the model's original tuning,
//! so a partial (or absent) config file behaves identically to the
//! built-in defaults. `validate()` runs range checks before the model
//! will accept a config.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rnn::RankerError;

/// Hyperparameters for the ranking model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Comparison embedding dimension M.
    #[serde(default = "default_middle_dim")]
    pub middle_dim: usize,

    /// L2 regularization strength on the projection matrix.
    #[serde(default = "default_reg")]
    pub reg: f64,

    /// Margin constant of the hinge objective.
    #[serde(default = "default_margin")]
    pub margin: f64,

    /// SGD learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Backpropagation-through-time window length.
    #[serde(default = "default_bptt")]
    pub bptt: usize,

    /// Whether gradients flow past the projection layer into the
    /// recurrence matrix and the word-vector rows.
    #[serde(default)]
    pub backprop_wordvecs: bool,

    /// RNG seed for parameter init and negative sampling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_middle_dim() -> usize {
    30
}
fn default_reg() -> f64 {
    1e-5
}
fn default_margin() -> f64 {
    1.0
}
fn default_learning_rate() -> f64 {
    0.005
}
fn default_bptt() -> usize {
    1
}
fn default_seed() -> u64 {
    10
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            middle_dim: default_middle_dim(),
            reg: default_reg(),
            margin: default_margin(),
            learning_rate: default_learning_rate(),
            bptt: default_bptt(),
            backprop_wordvecs: false,
            seed: default_seed(),
        }
    }
}

impl RankerConfig {
    /// Parse a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, RankerError> {
        toml::from_str(text).map_err(|e| RankerError::InvalidConfig {
            reason: format!("TOML parse error: {e}"),
        })
    }

    /// Load a config from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, RankerError> {
        let text = std::fs::read_to_string(path).map_err(|e| RankerError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "loaded ranker config");
        Ok(config)
    }

    /// Range-check every hyperparameter.
    pub fn validate(&self) -> Result<(), RankerError> {
        fn fail(reason: String) -> Result<(), RankerError> {
            Err(RankerError::InvalidConfig { reason })
        }

        if self.middle_dim == 0 {
            return fail("middle_dim must be at least 1".into());
        }
        if self.bptt == 0 {
            return fail("bptt must be at least 1".into());
        }
        if !self.margin.is_finite() || self.margin <= 0.0 {
            return fail(format!("margin must be positive and finite, got {}", self.margin));
        }
        if !self.reg.is_finite() || self.reg < 0.0 {
            return fail(format!("reg must be non-negative and finite, got {}", self.reg));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return fail(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            ));
        }
        Ok(())
    }
}
