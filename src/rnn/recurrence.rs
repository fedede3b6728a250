//! Hidden-state recurrence: forward pass over a token sequence and
//! truncated backpropagation-through-time.
//!
//! ```text
//! forward:   h(t+1) = sigmoid(W_rec · h(t) + L[x(t)])
//! backward:  dsig   = sigmoid_grad(h(t+1)) ⊙ delta
//!            dW_rec += outer(dsig, h(t))
//!            dL[x(t)] = dsig                 (overwrite by key)
//!            delta  = W_recᵀ · dsig
//! ```
//!
//! The backward pass walks at most `bptt` steps from the end of the
//! sequence — a bounded recent window, not full-sequence BPTT.

use crate::rnn::params::{GradBuffers, RnnParams};
use crate::rnn::RankerError;
use crate::types::TokenId;

/// Run the recurrence forward over `tokens`.
///
/// Returns the hidden-state trajectory: `tokens.len() + 1` states of
/// `hidden_dim` values, state 0 being the zero initial state. The
/// caller is expected to have already reversed the sequence.
pub fn run_forward(
    params: &RnnParams,
    tokens: &[TokenId],
) -> Result<Vec<Vec<f64>>, RankerError> {
    let h = params.hidden_dim;
    let mut states = Vec::with_capacity(tokens.len() + 1);
    states.push(vec![0.0; h]);

    for (t, &token) in tokens.iter().enumerate() {
        let word = params.word_vec(token)?;
        let mut next = vec![0.0; h];
        for r in 0..h {
            let mut acc = word[r];
            for c in 0..h {
                acc += params.w_rec[r * h + c] * states[t][c];
            }
            next[r] = sigmoid(acc);
        }
        states.push(next);
    }
    Ok(states)
}

/// Propagate an error signal backward through at most `bptt` timesteps.
///
/// `delta` is the gradient w.r.t. the final hidden state; `states` is
/// the trajectory produced by [`run_forward`] for the same (reversed)
/// `tokens`. Accumulates `outer(dsig, h(t))` into the recurrence-matrix
/// gradient and **overwrites** the sparse row for each visited token —
/// if a token repeats inside the window, only the last-written row
/// survives (documented collision policy, not summation).
pub fn backprop_window(
    params: &RnnParams,
    grads: &mut GradBuffers,
    tokens: &[TokenId],
    states: &[Vec<f64>],
    delta: &[f64],
    bptt: usize,
) {
    if tokens.is_empty() {
        return;
    }
    let h = params.hidden_dim;
    let last = tokens.len() - 1;
    let mut dh = delta.to_vec();

    for j in 0..bptt {
        if j > last {
            break;
        }
        let i = last - j;

        let mut dsig = vec![0.0; h];
        for r in 0..h {
            dsig[r] = sigmoid_grad(states[i + 1][r]) * dh[r];
        }

        for r in 0..h {
            for c in 0..h {
                grads.w_rec[r * h + c] += dsig[r] * states[i][c];
            }
        }
        grads.set_word_vec_row(tokens[i], dsig.clone());

        let mut dh_next = vec![0.0; h];
        for c in 0..h {
            let mut acc = 0.0;
            for r in 0..h {
                acc += params.w_rec[r * h + c] * dsig[r];
            }
            dh_next[c] = acc;
        }
        dh = dh_next;
    }
}

// ============================================================================
// Activation functions
// ============================================================================

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of sigmoid expressed through its *output* activation:
/// for h = sigmoid(x), d sigmoid/dx = h · (1 − h).
#[inline]
pub fn sigmoid_grad(h: f64) -> f64 {
    h * (1.0 - h)
}

#[inline]
pub fn tanh(x: f64) -> f64 {
    2.0 * sigmoid(2.0 * x) - 1.0
}

/// Derivative of tanh expressed through its output: 1 − f².
#[inline]
pub fn tanh_grad(f: f64) -> f64 {
    1.0 - f * f
}
