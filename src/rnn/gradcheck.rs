//! Numerical gradient verification by central finite differences.
//!
//! Compares the hand-derived gradients from one accumulation pass
//! against `(J(θ+ε) − J(θ−ε)) / 2ε` for every element of the projection
//! matrix and bias and — when word-vector backprop is enabled — the
//! recurrence matrix and each touched word-vector row.
//!
//! Two preconditions for a meaningful comparison, both handled by
//! [`ParseRanker::grad_check`](crate::rnn::ranker::ParseRanker::grad_check):
//! the negative parse must be held fixed across the analytic and numeric
//! passes, and the BPTT window must cover the longest sequence so the
//! truncated analytic gradient equals the full one. Token ids should be
//! pairwise distinct across the six sequences involved: the sparse
//! buffers overwrite by key, so a repeated token diverges from the true
//! (summed) gradient by design.

use std::fmt;

use crate::config::RankerConfig;
use crate::rnn::params::{GradBuffers, RnnParams};
use crate::rnn::scoring::{accumulate_with_negative, margin_loss_with_negative};
use crate::rnn::RankerError;
use crate::types::Parse;

/// Window length substituted for the configured BPTT bound during a
/// check — wide enough to cover any realistic sequence.
pub const GRAD_CHECK_BPTT: usize = 100;

/// Central-difference step size.
const FD_EPSILON: f64 = 1e-4;

/// Standard pass tolerance on the max absolute difference.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Per-parameter check summary.
#[derive(Debug, Clone)]
pub struct ParamCheck {
    /// Parameter name (`w_proj`, `b_proj`, `w_rec`, `word_vecs[token]`).
    pub name: String,
    /// Elements compared.
    pub checked: usize,
    /// Largest |analytic − numeric| across those elements.
    pub max_abs_diff: f64,
}

/// Result of a full gradient check.
#[derive(Debug, Clone)]
pub struct GradCheckReport {
    /// One entry per parameter checked.
    pub sections: Vec<ParamCheck>,
}

impl GradCheckReport {
    /// Largest |analytic − numeric| across every checked element.
    pub fn max_abs_diff(&self) -> f64 {
        self.sections
            .iter()
            .map(|s| s.max_abs_diff)
            .fold(0.0, f64::max)
    }

    /// Total elements compared.
    pub fn checked(&self) -> usize {
        self.sections.iter().map(|s| s.checked).sum()
    }

    pub fn passed(&self, tolerance: f64) -> bool {
        self.max_abs_diff() <= tolerance
    }
}

impl fmt::Display for GradCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.sections {
            writeln!(
                f,
                "{}: {} elements, max |analytic - numeric| = {:.3e}",
                s.name, s.checked, s.max_abs_diff
            )?;
        }
        write!(
            f,
            "overall: {} elements, max |analytic - numeric| = {:.3e}",
            self.checked(),
            self.max_abs_diff()
        )
    }
}

/// Addressable parameter element.
#[derive(Debug, Clone, Copy)]
enum Slot {
    WRec(usize),
    WProj(usize),
    BProj(usize),
    WordVec(usize),
}

fn read_slot(params: &RnnParams, slot: Slot) -> f64 {
    match slot {
        Slot::WRec(i) => params.w_rec[i],
        Slot::WProj(i) => params.w_proj[i],
        Slot::BProj(i) => params.b_proj[i],
        Slot::WordVec(i) => params.word_vecs[i],
    }
}

fn write_slot(params: &mut RnnParams, slot: Slot, value: f64) {
    match slot {
        Slot::WRec(i) => params.w_rec[i] = value,
        Slot::WProj(i) => params.w_proj[i] = value,
        Slot::BProj(i) => params.b_proj[i] = value,
        Slot::WordVec(i) => params.word_vecs[i] = value,
    }
}

/// Central difference at one slot. The slot is restored before any
/// error propagates.
fn fd_slot<L>(params: &mut RnnParams, slot: Slot, loss: &L) -> Result<f64, RankerError>
where
    L: Fn(&RnnParams) -> Result<f64, RankerError>,
{
    let orig = read_slot(params, slot);
    write_slot(params, slot, orig + FD_EPSILON);
    let plus = loss(params);
    write_slot(params, slot, orig - FD_EPSILON);
    let minus = loss(params);
    write_slot(params, slot, orig);
    Ok((plus? - minus?) / (2.0 * FD_EPSILON))
}

fn check_section<L>(
    params: &mut RnnParams,
    name: &str,
    analytic: &[f64],
    make_slot: fn(usize) -> Slot,
    loss: &L,
) -> Result<ParamCheck, RankerError>
where
    L: Fn(&RnnParams) -> Result<f64, RankerError>,
{
    let mut max_abs_diff = 0.0f64;
    for (idx, &a) in analytic.iter().enumerate() {
        let numeric = fd_slot(params, make_slot(idx), loss)?;
        max_abs_diff = max_abs_diff.max((a - numeric).abs());
    }
    Ok(ParamCheck {
        name: name.to_owned(),
        checked: analytic.len(),
        max_abs_diff,
    })
}

/// Run the full check for one example against a fixed negative.
///
/// `bptt` bounds the analytic backward pass; pass [`GRAD_CHECK_BPTT`]
/// (or anything covering the longest sequence) or the recurrence and
/// word-vector comparisons will be truncated while the numeric loss is
/// not. With `backprop_wordvecs` disabled only the projection layer
/// carries analytic gradients, so only `w_proj` and `b_proj` are
/// compared.
pub fn check_gradients(
    params: &mut RnnParams,
    question: &Parse,
    oracle: &Parse,
    negative: &Parse,
    config: &RankerConfig,
    bptt: usize,
) -> Result<GradCheckReport, RankerError> {
    let mut grads = GradBuffers::new(params);
    accumulate_with_negative(params, &mut grads, question, oracle, negative, config, bptt)?;
    let analytic = grads;

    let loss =
        |p: &RnnParams| margin_loss_with_negative(p, question, oracle, negative, config);

    let mut sections = Vec::new();
    sections.push(check_section(
        params,
        "w_proj",
        &analytic.w_proj,
        Slot::WProj,
        &loss,
    )?);
    sections.push(check_section(
        params,
        "b_proj",
        &analytic.b_proj,
        Slot::BProj,
        &loss,
    )?);

    if config.backprop_wordvecs {
        sections.push(check_section(
            params,
            "w_rec",
            &analytic.w_rec,
            Slot::WRec,
            &loss,
        )?);

        let mut tokens: Vec<usize> = analytic.word_vecs.keys().copied().collect();
        tokens.sort_unstable();
        let h = params.hidden_dim;
        for token in tokens {
            let row = &analytic.word_vecs[&token];
            let mut max_abs_diff = 0.0f64;
            for (k, &a) in row.iter().enumerate() {
                let numeric = fd_slot(params, Slot::WordVec(token * h + k), &loss)?;
                max_abs_diff = max_abs_diff.max((a - numeric).abs());
            }
            sections.push(ParamCheck {
                name: format!("word_vecs[{token}]"),
                checked: row.len(),
                max_abs_diff,
            });
        }
    }

    Ok(GradCheckReport { sections })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_params(middle_dim: usize) -> RnnParams {
        let mut rng = StdRng::seed_from_u64(17);
        let table: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                vec![
                    0.07 * i as f64 - 0.9,
                    -0.05 * i as f64 + 0.4,
                    0.02 * i as f64,
                ]
            })
            .collect();
        RnnParams::from_pretrained(table, middle_dim, &mut rng).expect("valid table")
    }

    fn active_margin_config() -> RankerConfig {
        // Embeddings live in (-1, 1)^M, so squared distances are bounded
        // by 4M and a margin of 4M + 1 keeps the hinge active and far
        // from its kink for any parameter perturbation.
        RankerConfig {
            middle_dim: 3,
            margin: 13.0,
            reg: 1e-3,
            ..RankerConfig::default()
        }
    }

    fn example() -> (Parse, Parse, Parse) {
        // Token ids pairwise distinct across all six sequences so the
        // overwrite-by-key sparse policy coincides with true summation.
        let question = Parse::new(vec![1, 2], vec![3, 4]);
        let oracle = Parse::new(vec![5, 6], vec![7, 8]);
        let negative = Parse::new(vec![9, 10], vec![11, 12]);
        (question, oracle, negative)
    }

    #[test]
    fn test_projection_gradients_match_numeric() {
        let mut params = make_params(3);
        let config = active_margin_config();
        let (question, oracle, negative) = example();

        let report =
            check_gradients(&mut params, &question, &oracle, &negative, &config, 1)
                .expect("check");
        assert_eq!(report.sections.len(), 2);
        assert!(
            report.passed(DEFAULT_TOLERANCE),
            "projection check failed:\n{report}"
        );
    }

    #[test]
    fn test_full_gradients_match_numeric_with_wordvec_backprop() {
        let mut params = make_params(3);
        let mut config = active_margin_config();
        config.backprop_wordvecs = true;
        let (question, oracle, negative) = example();

        let report = check_gradients(
            &mut params,
            &question,
            &oracle,
            &negative,
            &config,
            GRAD_CHECK_BPTT,
        )
        .expect("check");
        // w_proj + b_proj + w_rec + 12 touched word-vector rows.
        assert_eq!(report.sections.len(), 15);
        assert!(report.passed(DEFAULT_TOLERANCE), "full check failed:\n{report}");
    }

    #[test]
    fn test_truncated_window_diverges_from_full_gradient() {
        // With bptt = 1 the analytic recurrence gradient stops after one
        // step while the numeric loss sees the whole sequence — the
        // check must detect the difference.
        let mut params = make_params(3);
        let mut config = active_margin_config();
        config.backprop_wordvecs = true;
        let question = Parse::new(vec![1, 2, 13, 14], vec![3, 4]);
        let oracle = Parse::new(vec![5, 6], vec![7, 8]);
        let negative = Parse::new(vec![9, 10], vec![11, 12]);

        let truncated =
            check_gradients(&mut params, &question, &oracle, &negative, &config, 1)
                .expect("check");
        let full = check_gradients(
            &mut params,
            &question,
            &oracle,
            &negative,
            &config,
            GRAD_CHECK_BPTT,
        )
        .expect("check");
        assert!(full.max_abs_diff() < truncated.max_abs_diff());
    }

    #[test]
    fn test_slot_restore_leaves_params_unchanged() {
        let mut params = make_params(3);
        let before = params.clone();
        let config = active_margin_config();
        let (question, oracle, negative) = example();
        check_gradients(&mut params, &question, &oracle, &negative, &config, 1)
            .expect("check");
        assert_eq!(params.w_proj, before.w_proj);
        assert_eq!(params.w_rec, before.w_rec);
        assert_eq!(params.word_vecs, before.word_vecs);
    }
}
