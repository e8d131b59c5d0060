//! Sampling parameters for the language model.
//!
//! [`ModelParameters`] is the full record an engine reads at call time.
//! [`ParameterOverrides`] carries the subset a caller wants to change for a
//! single call; [`ModelParameters::merge`] combines the two.

use serde::Serialize;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.1;
pub const DEFAULT_TOP_K: usize = 40;
pub const DEFAULT_BATCH_SIZE: usize = 8;
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_PREDICT: usize = 256;
pub const DEFAULT_MAX_TOKENS: usize = 200;
pub const DEFAULT_REPEAT_LAST_N: usize = 64;
pub const DEFAULT_REPEAT_PENALTY: f32 = 1.18;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelParameters {
    /// Sampling temperature.
    pub temp: f64,
    /// Nucleus sampling cumulative probability.
    pub top_p: f64,
    /// Number of highest-probability tokens kept before nucleus sampling.
    pub top_k: usize,
    /// Batch size for prompt processing.
    pub n_batch: usize,
    /// Worker threads used for inference.
    pub n_threads: usize,
    /// Hard cap on generated tokens.
    pub n_predict: usize,
    /// Maximum number of tokens to generate.
    pub max_tokens: usize,
    /// Number of trailing tokens the repeat penalty looks at.
    pub repeat_last_n: usize,
    /// Penalty applied to logits of recently generated tokens.
    pub repeat_penalty: f32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temp: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            n_batch: DEFAULT_BATCH_SIZE,
            n_threads: DEFAULT_THREADS,
            n_predict: DEFAULT_PREDICT,
            max_tokens: DEFAULT_MAX_TOKENS,
            repeat_last_n: DEFAULT_REPEAT_LAST_N,
            repeat_penalty: DEFAULT_REPEAT_PENALTY,
        }
    }
}

/// Per-call parameter overrides. `None` keeps the default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParameterOverrides {
    pub temp: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub n_batch: Option<usize>,
    pub n_threads: Option<usize>,
    pub n_predict: Option<usize>,
    pub max_tokens: Option<usize>,
    pub repeat_last_n: Option<usize>,
    pub repeat_penalty: Option<f32>,
}

impl ParameterOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl ModelParameters {
    /// Number of tokens an engine may generate: the smaller of `max_tokens`
    /// and `n_predict`.
    pub fn token_budget(&self) -> usize {
        self.max_tokens.min(self.n_predict)
    }

    /// Return a copy of `self` with every field set in `overrides` replaced.
    ///
    /// # Examples
    ///
    /// ```
    /// use docqa::params::{ModelParameters, ParameterOverrides};
    ///
    /// let defaults = ModelParameters::default();
    /// let merged = defaults.merge(&ParameterOverrides {
    ///     temp: Some(0.0),
    ///     ..Default::default()
    /// });
    /// assert_eq!(merged.temp, 0.0);
    /// assert_eq!(merged.top_k, defaults.top_k);
    /// ```
    pub fn merge(&self, overrides: &ParameterOverrides) -> Self {
        Self {
            temp: overrides.temp.unwrap_or(self.temp),
            top_p: overrides.top_p.unwrap_or(self.top_p),
            top_k: overrides.top_k.unwrap_or(self.top_k),
            n_batch: overrides.n_batch.unwrap_or(self.n_batch),
            n_threads: overrides.n_threads.unwrap_or(self.n_threads),
            n_predict: overrides.n_predict.unwrap_or(self.n_predict),
            max_tokens: overrides.max_tokens.unwrap_or(self.max_tokens),
            repeat_last_n: overrides
                .repeat_last_n
                .unwrap_or(self.repeat_last_n),
            repeat_penalty: overrides
                .repeat_penalty
                .unwrap_or(self.repeat_penalty),
        }
    }
}
