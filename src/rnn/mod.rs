//! Margin-ranking RNN — parameter store, recurrence, scoring, sampling.
//!
//! The model scores a candidate parse against a question utterance by
//! running each side's two token sequences (input, command) through a
//! shared sigmoid recurrence and comparing projected embeddings:
//!
//! ```text
//! h(t+1)    = sigmoid(W_rec · h(t) + L[x(t)])        per reversed token x(t)
//! embedding = tanh(W_proj · [h_input; h_command] + b)
//! loss      = max(0, margin − ‖eQ − eN‖² + ‖eQ − eA‖²) + 0.5·reg·‖W_proj‖²
//! ```
//!
//! where eQ, eA, eN are the embeddings of the question, the oracle parse,
//! and a sampled negative parse. Sequences are processed in **reverse**
//! order, so the first token has the greatest influence on the final
//! hidden state.
//!
//! All gradients are hand-derived and accumulated into explicit buffers:
//! dense gradients add in place, sparse word-vector gradients overwrite
//! by row key. Backpropagation through time is truncated to a bounded
//! recent window.
//!
//! Training is online: one example at a time, forward → margin check →
//! backprop → SGD, no minibatching.

pub mod checkpoint;
pub mod gradcheck;
pub mod params;
pub mod ranker;
pub mod recurrence;
pub mod sampler;
pub mod scoring;

pub use gradcheck::GradCheckReport;
pub use params::{GradBuffers, RnnParams};
pub use ranker::ParseRanker;
pub use sampler::sample_negative;

use thiserror::Error;

/// Errors raised by the ranking model.
///
/// Malformed inputs fail at the point of use; there are no retries and
/// no partial-state corruption — a failed call leaves the gradient
/// buffers exactly as they were (gradient accumulation writes nothing
/// before its inputs validate).
#[derive(Debug, Error)]
pub enum RankerError {
    /// A token id fell outside the vocabulary range `[0, vocab_size)`.
    #[error("token id {token} outside vocabulary range [0, {vocab_size})")]
    TokenOutOfRange { token: usize, vocab_size: usize },

    /// Two array dimensions that must agree did not.
    #[error("{what}: expected dimension {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Negative sampling failed to find a candidate structurally
    /// distinct from the oracle within the retry bound.
    #[error("no structurally distinct negative candidate found after {attempts} attempts")]
    ExhaustedCandidates { attempts: usize },

    /// The pretrained word-vector table was empty (or had zero-width rows).
    #[error("word-vector table is empty")]
    EmptyWordVectors,

    /// A hyperparameter failed range validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}
