//! Gradient-check harness for the parse ranker.
//!
//! Builds a model over a Gaussian-initialized word-vector table, runs
//! the numerical gradient check on a fixed training example, and exits
//! non-zero if the analytic gradients disagree with central finite
//! differences.
//!
//! Usage:
//!   cargo run --bin grad-check
//!   cargo run --bin grad-check -- --vocab-size 1000 --hidden-dim 5 --backprop-wordvecs

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::info;

use parse_ranker::{
    AnswerSet, Parse, ParseRanker, RankerConfig, DEFAULT_TOLERANCE,
};

/// Numerical gradient check for the margin-ranking RNN.
#[derive(Parser)]
#[command(name = "grad-check")]
struct Args {
    /// Vocabulary size of the random word-vector table.
    #[arg(long, default_value = "1000")]
    vocab_size: usize,

    /// Hidden dimension (word-vector row width).
    #[arg(long, default_value = "5")]
    hidden_dim: usize,

    /// Comparison embedding dimension.
    #[arg(long, default_value = "5")]
    middle_dim: usize,

    /// Margin constant. The default keeps the hinge active for any
    /// embedding pair (squared distances are bounded by 4 * middle_dim),
    /// so the check never sits on the hinge kink.
    #[arg(long)]
    margin: Option<f64>,

    /// Also check the recurrence matrix and word-vector rows.
    #[arg(long)]
    backprop_wordvecs: bool,

    /// RNG seed for the table, parameter init, and negative sampling.
    #[arg(long, default_value = "10")]
    seed: u64,

    /// Pass tolerance on the max |analytic - numeric| difference.
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,grad_check=debug")),
        )
        .init();

    let args = Args::parse();

    // Gaussian table with variance 0.1, the usual pretraining stand-in.
    let normal = Normal::new(0.0, 0.1f64.sqrt()).context("invalid normal distribution")?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let table: Vec<Vec<f64>> = (0..args.vocab_size)
        .map(|_| (0..args.hidden_dim).map(|_| normal.sample(&mut rng)).collect())
        .collect();

    let config = RankerConfig {
        middle_dim: args.middle_dim,
        margin: args
            .margin
            .unwrap_or(4.0 * args.middle_dim as f64 + 1.0),
        backprop_wordvecs: args.backprop_wordvecs,
        seed: args.seed,
        ..RankerConfig::default()
    };

    let mut ranker =
        ParseRanker::new(table, config).context("failed to construct parse ranker")?;

    // Fixed example: a single-candidate answer set, so the sampled
    // negative is a synthesized single-token pair.
    let question = Parse::new(vec![411, 339, 46], vec![341, 591, 83, 355, 175]);
    let answers = AnswerSet::new(
        vec![question.clone()],
        Parse::new(vec![21, 1], vec![2, 3, 4]),
    );

    let report = ranker
        .grad_check(&answers, &question)
        .context("gradient check failed to run")?;

    info!("gradient check report:\n{report}");

    if report.passed(args.tolerance) {
        info!(
            tolerance = args.tolerance,
            checked = report.checked(),
            "gradient check PASSED"
        );
        Ok(())
    } else {
        anyhow::bail!(
            "gradient check FAILED: max |analytic - numeric| = {:.3e} exceeds tolerance {:.1e}",
            report.max_abs_diff(),
            args.tolerance
        )
    }
}
