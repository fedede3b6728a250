//! Parameter store: dense recurrence/projection parameters, the sparse
//! word-vector table, and their mirrored gradient buffers.
//!
//! All matrices are flat row-major `Vec<f64>`. Dense gradients accumulate
//! additively in place; sparse word-vector gradients live in a map keyed
//! by row index and are written with overwrite-by-key semantics (the last
//! write for a key wins). Only rows actually read during a forward pass
//! ever receive entries.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::rnn::RankerError;
use crate::types::TokenId;

/// Model parameters.
///
/// Created once at construction and never reallocated: the word-vector
/// table is copied from a caller-supplied pretrained table (hidden
/// dimension inferred from its row width, vocabulary size from its row
/// count), dense parameters are randomly initialized, the projection
/// bias starts at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RnnParams {
    /// Hidden state dimension H (word-vector row width).
    pub hidden_dim: usize,
    /// Vocabulary size V (word-vector row count).
    pub vocab_size: usize,
    /// Comparison embedding dimension M.
    pub middle_dim: usize,

    /// Recurrence matrix, H x H row-major.
    pub w_rec: Vec<f64>,
    /// Projection matrix, M x 2H row-major.
    pub w_proj: Vec<f64>,
    /// Projection bias, length M.
    pub b_proj: Vec<f64>,
    /// Word-vector table L, V x H row-major. Updated only through
    /// sparse row-indexed gradient entries.
    pub word_vecs: Vec<f64>,
}

impl RnnParams {
    /// Build parameters from a pretrained word-vector table.
    ///
    /// Dense matrices use scaled-uniform init in
    /// `±sqrt(6 / (fan_in + fan_out))`; the bias starts at zero.
    pub fn from_pretrained(
        table: Vec<Vec<f64>>,
        middle_dim: usize,
        rng: &mut StdRng,
    ) -> Result<Self, RankerError> {
        let vocab_size = table.len();
        let hidden_dim = table.first().map_or(0, Vec::len);
        if vocab_size == 0 || hidden_dim == 0 {
            return Err(RankerError::EmptyWordVectors);
        }

        let mut word_vecs = Vec::with_capacity(vocab_size * hidden_dim);
        for row in &table {
            if row.len() != hidden_dim {
                return Err(RankerError::ShapeMismatch {
                    what: "word-vector row",
                    expected: hidden_dim,
                    actual: row.len(),
                });
            }
            word_vecs.extend_from_slice(row);
        }

        let w_rec = random_weight_matrix(hidden_dim, hidden_dim, rng);
        let w_proj = random_weight_matrix(middle_dim, 2 * hidden_dim, rng);
        let b_proj = vec![0.0; middle_dim];

        Ok(Self {
            hidden_dim,
            vocab_size,
            middle_dim,
            w_rec,
            w_proj,
            b_proj,
            word_vecs,
        })
    }

    /// Word-vector row for a token, or `TokenOutOfRange`.
    pub fn word_vec(&self, token: TokenId) -> Result<&[f64], RankerError> {
        if token >= self.vocab_size {
            return Err(RankerError::TokenOutOfRange {
                token,
                vocab_size: self.vocab_size,
            });
        }
        let start = token * self.hidden_dim;
        Ok(&self.word_vecs[start..start + self.hidden_dim])
    }

    /// Total number of trainable parameters.
    pub fn num_params(&self) -> usize {
        self.w_rec.len() + self.w_proj.len() + self.b_proj.len() + self.word_vecs.len()
    }

    /// Apply one SGD step: dense parameters move by `-lr * grad`, and
    /// each touched word-vector row moves by `-lr * row`. Untouched
    /// rows are never read or written.
    pub fn apply_sgd(&mut self, grads: &GradBuffers, learning_rate: f64) {
        for (w, g) in self.w_rec.iter_mut().zip(grads.w_rec.iter()) {
            *w -= learning_rate * g;
        }
        for (w, g) in self.w_proj.iter_mut().zip(grads.w_proj.iter()) {
            *w -= learning_rate * g;
        }
        for (w, g) in self.b_proj.iter_mut().zip(grads.b_proj.iter()) {
            *w -= learning_rate * g;
        }
        for (&token, row) in &grads.word_vecs {
            let base = token * self.hidden_dim;
            for (k, g) in row.iter().enumerate() {
                self.word_vecs[base + k] -= learning_rate * g;
            }
        }
    }
}

/// Gradient buffers mirroring the parameter layout.
///
/// Dense buffers match their parameter's length exactly; the sparse map
/// holds one H-length row per touched token. One accumulation pass fully
/// completes before the buffers are read or reset — enforced by `&mut`
/// access, not by internal locking.
#[derive(Debug, Clone)]
pub struct GradBuffers {
    /// Gradient for the recurrence matrix, H x H row-major.
    pub w_rec: Vec<f64>,
    /// Gradient for the projection matrix, M x 2H row-major.
    pub w_proj: Vec<f64>,
    /// Gradient for the projection bias, length M.
    pub b_proj: Vec<f64>,
    /// Sparse word-vector gradients, row index → H-length row.
    /// Writes overwrite: a repeated key keeps only the last row.
    pub word_vecs: HashMap<TokenId, Vec<f64>>,
}

impl GradBuffers {
    /// Zeroed buffers shaped for `params`.
    pub fn new(params: &RnnParams) -> Self {
        Self {
            w_rec: vec![0.0; params.w_rec.len()],
            w_proj: vec![0.0; params.w_proj.len()],
            b_proj: vec![0.0; params.b_proj.len()],
            word_vecs: HashMap::new(),
        }
    }

    /// Zero the dense buffers and clear the sparse map.
    pub fn reset(&mut self) {
        self.w_rec.fill(0.0);
        self.w_proj.fill(0.0);
        self.b_proj.fill(0.0);
        self.word_vecs.clear();
    }

    /// Overwrite the sparse gradient row for a token. Not `+=`: a later
    /// write for the same key replaces the earlier one.
    pub fn set_word_vec_row(&mut self, token: TokenId, row: Vec<f64>) {
        self.word_vecs.insert(token, row);
    }

    /// True when every dense entry is zero and no sparse row is set.
    pub fn is_zero(&self) -> bool {
        self.word_vecs.is_empty()
            && self.w_rec.iter().all(|&v| v == 0.0)
            && self.w_proj.iter().all(|&v| v == 0.0)
            && self.b_proj.iter().all(|&v| v == 0.0)
    }
}

/// Scaled-uniform init: entries uniform in `±sqrt(6 / (rows + cols))`.
fn random_weight_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> Vec<f64> {
    let bound = (6.0 / (rows + cols) as f64).sqrt();
    (0..rows * cols)
        .map(|_| rng.gen::<f64>() * 2.0 * bound - bound)
        .collect()
}
