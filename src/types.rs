//! Shared data types for parse ranking.
//!
//! A training example pairs a question utterance with an answer set of
//! candidate parses. Both sides have the same shape — an (input, command)
//! pair of token sequences — and run through the same shared recurrence.

use serde::{Deserialize, Serialize};

/// Integer token id indexing into the word-vector table.
pub type TokenId = usize;

/// A pair of token sequences: the input tokens and the command tokens.
///
/// Used both for candidate parses and for the question utterance.
/// Structural equality (derived `PartialEq`) is elementwise equality of
/// both sequences — this is what the negative sampler uses to reject
/// candidates identical to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parse {
    /// Token sequence for the input side.
    pub input: Vec<TokenId>,
    /// Token sequence for the command side.
    pub command: Vec<TokenId>,
}

impl Parse {
    pub fn new(input: Vec<TokenId>, command: Vec<TokenId>) -> Self {
        Self { input, command }
    }

    /// Total token count across both sequences.
    pub fn token_count(&self) -> usize {
        self.input.len() + self.command.len()
    }
}

/// The answer side of a training example: the full candidate list plus
/// the gold (oracle) parse.
///
/// The candidate list drives both negative sampling and prediction; the
/// oracle is the positive example in the margin objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSet {
    /// All candidate parses for this example.
    pub candidates: Vec<Parse>,
    /// The gold correct parse.
    pub oracle: Parse,
}

impl AnswerSet {
    pub fn new(candidates: Vec<Parse>, oracle: Parse) -> Self {
        Self { candidates, oracle }
    }
}
