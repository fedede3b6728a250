//! Negative sampling: pick a structurally different candidate parse, or
//! synthesize a degenerate one when there is no alternative.

use rand::Rng;
use tracing::debug;

use crate::rnn::RankerError;
use crate::types::{AnswerSet, Parse};

/// Retry bound for rejection sampling. The draw is uniform over the
/// candidate list, so with at least one structurally distinct candidate
/// the chance of exhausting this many retries is negligible; hitting the
/// bound means every candidate equals the oracle.
pub const MAX_SAMPLE_ATTEMPTS: usize = 64;

/// Sample a negative parse for one training example.
///
/// With more than one candidate, draws uniformly and rejects draws
/// structurally equal to the oracle, failing with `ExhaustedCandidates`
/// after [`MAX_SAMPLE_ATTEMPTS`]. With a single candidate there is
/// nothing to draw from, so a degenerate negative is synthesized: one
/// random token on each side, uniform over the vocabulary.
pub fn sample_negative(
    rng: &mut impl Rng,
    answers: &AnswerSet,
    vocab_size: usize,
) -> Result<Parse, RankerError> {
    if answers.candidates.len() > 1 {
        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            let idx = rng.gen_range(0..answers.candidates.len());
            let candidate = &answers.candidates[idx];
            if *candidate != answers.oracle {
                return Ok(candidate.clone());
            }
        }
        return Err(RankerError::ExhaustedCandidates {
            attempts: MAX_SAMPLE_ATTEMPTS,
        });
    }

    debug!("single-candidate answer set; synthesizing degenerate negative");
    Ok(Parse::new(
        vec![rng.gen_range(0..vocab_size)],
        vec![rng.gen_range(0..vocab_size)],
    ))
}
