//! Scoring and margin loss: parse encoding through the shared projection
//! layer, hinge gradient accumulation, and squared-distance ranking.
//!
//! A parse (or the question utterance) is encoded by reversing both of
//! its sequences, running each through the recurrence, concatenating the
//! two final hidden states, and projecting:
//!
//! ```text
//! embedding = tanh(W_proj · [h_input; h_command] + b_proj)
//! ```
//!
//! The margin objective pushes the sampled negative's embedding away
//! from the question while pulling the oracle's toward it:
//!
//! ```text
//! hinge = margin − ‖eQ − eN‖² + ‖eQ − eA‖²
//! loss  = max(0, hinge) + 0.5 · reg · ‖W_proj‖²
//! ```
//!
//! Gradients are the exact derivative of that loss (the `2·diff` factor
//! from `d‖diff‖²/de` included), so the numerical gradient check holds
//! with no scaling caveats.

use crate::config::RankerConfig;
use crate::rnn::params::{GradBuffers, RnnParams};
use crate::rnn::recurrence::{backprop_window, run_forward, tanh, tanh_grad};
use crate::rnn::RankerError;
use crate::types::{Parse, TokenId};

/// Forward cache for one encoded parse: everything the backward pass
/// needs to revisit.
#[derive(Debug, Clone)]
pub struct ParseEncoding {
    /// Input sequence, reversed (the order the recurrence consumed).
    pub input_rev: Vec<TokenId>,
    /// Command sequence, reversed.
    pub command_rev: Vec<TokenId>,
    /// Hidden trajectory for the reversed input sequence.
    pub input_states: Vec<Vec<f64>>,
    /// Hidden trajectory for the reversed command sequence.
    pub command_states: Vec<Vec<f64>>,
    /// Concatenated final hidden states, length 2H.
    pub concat: Vec<f64>,
    /// Comparison embedding, length M.
    pub embedding: Vec<f64>,
}

/// Encode a parse: reverse, recur both sequences, concatenate, project.
pub fn encode(params: &RnnParams, parse: &Parse) -> Result<ParseEncoding, RankerError> {
    let mut input_rev = parse.input.clone();
    input_rev.reverse();
    let mut command_rev = parse.command.clone();
    command_rev.reverse();

    let input_states = run_forward(params, &input_rev)?;
    let command_states = run_forward(params, &command_rev)?;

    let mut concat = Vec::with_capacity(2 * params.hidden_dim);
    concat.extend_from_slice(&input_states[input_rev.len()]);
    concat.extend_from_slice(&command_states[command_rev.len()]);

    let embedding = project(params, &concat)?;

    Ok(ParseEncoding {
        input_rev,
        command_rev,
        input_states,
        command_states,
        concat,
        embedding,
    })
}

/// Apply the shared projection: `tanh(W_proj · concat + b_proj)`.
pub fn project(params: &RnnParams, concat: &[f64]) -> Result<Vec<f64>, RankerError> {
    let width = 2 * params.hidden_dim;
    let m = params.middle_dim;
    if concat.len() != width {
        return Err(RankerError::ShapeMismatch {
            what: "concatenated hidden state",
            expected: width,
            actual: concat.len(),
        });
    }
    if params.w_proj.len() != m * width {
        return Err(RankerError::ShapeMismatch {
            what: "projection matrix",
            expected: m * width,
            actual: params.w_proj.len(),
        });
    }

    let mut out = vec![0.0; m];
    for (row, o) in out.iter_mut().enumerate() {
        let mut acc = params.b_proj[row];
        for (k, &c) in concat.iter().enumerate() {
            acc += params.w_proj[row * width + k] * c;
        }
        *o = tanh(acc);
    }
    Ok(out)
}

/// Squared Euclidean distance between two embeddings.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y) * (x - y))
        .sum()
}

/// Margin loss for one example against an explicitly supplied negative.
///
/// Deterministic given its inputs — the public loss API samples the
/// negative first and delegates here, and the gradient checker holds
/// one fixed negative across the analytic and numeric passes.
pub fn margin_loss_with_negative(
    params: &RnnParams,
    question: &Parse,
    oracle: &Parse,
    negative: &Parse,
    config: &RankerConfig,
) -> Result<f64, RankerError> {
    let q = encode(params, question)?;
    let a = encode(params, oracle)?;
    let n = encode(params, negative)?;

    let s_pos = squared_distance(&q.embedding, &a.embedding);
    let s_neg = squared_distance(&q.embedding, &n.embedding);
    let hinge = config.margin - s_neg + s_pos;

    let w_norm_sq: f64 = params.w_proj.iter().map(|&w| w * w).sum();
    Ok(hinge.max(0.0) + 0.5 * config.reg * w_norm_sq)
}

/// Accumulate gradients for one example against an explicit negative.
///
/// A clean no-op whenever the hinge is inactive (`hinge <= 0`): the
/// buffers are left untouched. `bptt` is the backward window length,
/// passed separately from the config so the gradient checker can widen
/// it without mutating hyperparameters.
pub fn accumulate_with_negative(
    params: &RnnParams,
    grads: &mut GradBuffers,
    question: &Parse,
    oracle: &Parse,
    negative: &Parse,
    config: &RankerConfig,
    bptt: usize,
) -> Result<(), RankerError> {
    // ========================================================================
    // 1. Forward: encode question, oracle, negative
    // ========================================================================
    let q = encode(params, question)?;
    let a = encode(params, oracle)?;
    let n = encode(params, negative)?;

    let diff_pos: Vec<f64> = sub(&q.embedding, &a.embedding);
    let diff_neg: Vec<f64> = sub(&q.embedding, &n.embedding);
    let s_pos: f64 = diff_pos.iter().map(|d| d * d).sum();
    let s_neg: f64 = diff_neg.iter().map(|d| d * d).sum();

    // ========================================================================
    // 2. Hinge gate: inactive margin contributes zero gradient
    // ========================================================================
    let hinge = config.margin - s_neg + s_pos;
    if hinge <= 0.0 {
        return Ok(());
    }

    // ========================================================================
    // 3. Projection-layer gradients
    // ========================================================================
    let m = params.middle_dim;
    let mut delta_qneg = vec![0.0; m];
    let mut delta_neg = vec![0.0; m];
    let mut delta_q = vec![0.0; m];
    let mut delta_a = vec![0.0; m];
    for i in 0..m {
        delta_qneg[i] = -2.0 * tanh_grad(q.embedding[i]) * diff_neg[i];
        delta_neg[i] = 2.0 * tanh_grad(n.embedding[i]) * diff_neg[i];
        delta_q[i] = 2.0 * tanh_grad(q.embedding[i]) * diff_pos[i];
        delta_a[i] = -2.0 * tanh_grad(a.embedding[i]) * diff_pos[i];
    }

    add_outer(&mut grads.w_proj, &delta_qneg, &q.concat);
    add_outer(&mut grads.w_proj, &delta_neg, &n.concat);
    add_outer(&mut grads.w_proj, &delta_q, &q.concat);
    add_outer(&mut grads.w_proj, &delta_a, &a.concat);
    for i in 0..m {
        grads.b_proj[i] += delta_qneg[i] + delta_neg[i] + delta_q[i] + delta_a[i];
    }

    for (g, &w) in grads.w_proj.iter_mut().zip(params.w_proj.iter()) {
        *g += config.reg * w;
    }

    if !config.backprop_wordvecs {
        return Ok(());
    }

    // ========================================================================
    // 4. Word-vector backprop: through W_projᵀ into each recurrence
    // ========================================================================
    let delta_q_total: Vec<f64> = (0..m).map(|i| delta_q[i] + delta_qneg[i]).collect();
    let d_q = proj_transpose_mul(params, &delta_q_total);
    let d_a = proj_transpose_mul(params, &delta_a);
    let d_n = proj_transpose_mul(params, &delta_neg);

    let h = params.hidden_dim;
    backprop_window(params, grads, &q.input_rev, &q.input_states, &d_q[..h], bptt);
    backprop_window(params, grads, &a.input_rev, &a.input_states, &d_a[..h], bptt);
    backprop_window(params, grads, &q.command_rev, &q.command_states, &d_q[h..], bptt);
    backprop_window(params, grads, &a.command_rev, &a.command_states, &d_a[h..], bptt);
    backprop_window(params, grads, &n.command_rev, &n.command_states, &d_n[h..], bptt);
    backprop_window(params, grads, &n.input_rev, &n.input_states, &d_n[..h], bptt);

    Ok(())
}

fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(&x, &y)| x - y).collect()
}

/// `dst += outer(delta, vec)`, dst laid out `delta.len()` x `vec.len()`.
fn add_outer(dst: &mut [f64], delta: &[f64], vec: &[f64]) {
    let width = vec.len();
    for (row, &d) in delta.iter().enumerate() {
        for (k, &v) in vec.iter().enumerate() {
            dst[row * width + k] += d * v;
        }
    }
}

/// `W_projᵀ · delta`, length 2H.
fn proj_transpose_mul(params: &RnnParams, delta: &[f64]) -> Vec<f64> {
    let width = 2 * params.hidden_dim;
    let mut out = vec![0.0; width];
    for (row, &d) in delta.iter().enumerate() {
        for (k, o) in out.iter_mut().enumerate() {
            *o += params.w_proj[row * width + k] * d;
        }
    }
    out
}
