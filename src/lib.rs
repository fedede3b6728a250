//! parse-ranker: margin-ranking RNN for scoring candidate parses.
//!
//! Scores and ranks candidate parses of natural-language commands
//! against an input utterance. Both sides of a comparison are (input,
//! command) token-sequence pairs; each runs through a shared sigmoid
//! recurrence and a tanh projection into a fixed-size embedding, and
//! candidates are ranked by squared embedding distance to the question.
//! Training uses a hinge margin objective with one sampled negative per
//! example and truncated backpropagation-through-time, all gradients
//! hand-derived.
//!
//! ## Architecture
//!
//! - **Parameter store** (`rnn::params`): dense recurrence/projection
//!   parameters, the sparse word-vector table, mirrored gradient buffers
//! - **Recurrence engine** (`rnn::recurrence`): forward trajectory +
//!   bounded-window BPTT
//! - **Scoring & loss** (`rnn::scoring`): encoding, margin loss,
//!   gradient accumulation, squared-distance ranking
//! - **Negative sampler** (`rnn::sampler`): structurally distinct
//!   candidate, or a synthesized single-token pair
//! - **Orchestrator** (`rnn::ranker`): the `ParseRanker` training-loop
//!   API, including the numerical gradient check

pub mod config;
pub mod rnn;
pub mod types;

// Re-export the model and its configuration
pub use config::RankerConfig;
pub use rnn::ParseRanker;
pub use rnn::RankerError;

// Re-export shared data types
pub use types::{AnswerSet, Parse, TokenId};

// Re-export checkpointing
pub use rnn::checkpoint::{load_from_disk, save_to_disk, RankerCheckpoint, CHECKPOINT_VERSION};

// Re-export gradient checking
pub use rnn::gradcheck::{GradCheckReport, DEFAULT_TOLERANCE, GRAD_CHECK_BPTT};
