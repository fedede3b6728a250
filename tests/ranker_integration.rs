//! End-to-end tests for the parse ranker: training, prediction,
//! gradient verification, checkpoint persistence, and config loading
//! exercised through the public API.

use rand::rngs::StdRng;
use rand::SeedableRng;

use parse_ranker::rnn::sample_negative;
use parse_ranker::{
    load_from_disk, save_to_disk, AnswerSet, Parse, ParseRanker, RankerConfig, RankerError,
    DEFAULT_TOLERANCE,
};

fn make_table(vocab: usize, hidden: usize) -> Vec<Vec<f64>> {
    (0..vocab)
        .map(|i| {
            (0..hidden)
                .map(|k| 0.04 * ((i * hidden + k) % 13) as f64 - 0.22)
                .collect()
        })
        .collect()
}

/// 4M + 1 keeps the hinge active for any pair of embeddings, which
/// makes training steps observable and gradient checks well-posed.
fn active_margin(middle_dim: usize) -> f64 {
    4.0 * middle_dim as f64 + 1.0
}

// ============================================================================
// Training & prediction
// ============================================================================

#[test]
fn end_to_end_training_and_prediction() {
    let config = RankerConfig {
        middle_dim: 3,
        margin: active_margin(3),
        backprop_wordvecs: true,
        bptt: 2,
        ..RankerConfig::default()
    };
    let mut ranker = ParseRanker::new(make_table(40, 4), config).expect("model");

    let oracle_a = Parse::new(vec![1, 2, 3], vec![4, 5]);
    let answers_a = AnswerSet::new(
        vec![oracle_a.clone(), Parse::new(vec![6, 7], vec![8, 9])],
        oracle_a.clone(),
    );
    let question_a = Parse::new(vec![10, 11], vec![12, 13, 14]);

    let oracle_b = Parse::new(vec![20, 21], vec![22]);
    let answers_b = AnswerSet::new(
        vec![Parse::new(vec![23, 24], vec![25]), oracle_b.clone()],
        oracle_b.clone(),
    );
    let question_b = Parse::new(vec![26, 27, 28], vec![29]);

    for _ in 0..10 {
        ranker.train_step(&answers_a, &question_a).expect("train");
        ranker.train_step(&answers_b, &question_b).expect("train");
    }
    assert_eq!(ranker.examples_seen(), 20);

    let loss = ranker
        .compute_loss(
            &[answers_a.clone(), answers_b.clone()],
            &[question_a.clone(), question_b.clone()],
        )
        .expect("loss");
    assert!(loss.is_finite() && loss >= 0.0);

    let predictions = ranker
        .predict(&[answers_a, answers_b], &[question_a, question_b])
        .expect("predict");
    assert_eq!(predictions.len(), 2);
    assert!(predictions.iter().all(Option::is_some));
}

#[test]
fn batch_loss_sums_single_losses() {
    // Each answer set has exactly one structurally distinct candidate,
    // so negative sampling — and therefore every loss — is deterministic.
    let config = RankerConfig {
        middle_dim: 3,
        ..RankerConfig::default()
    };
    let mut ranker = ParseRanker::new(make_table(40, 4), config).expect("model");

    let oracle = Parse::new(vec![1, 2], vec![3]);
    let answers = AnswerSet::new(
        vec![oracle.clone(), Parse::new(vec![4, 5], vec![6])],
        oracle,
    );
    let question = Parse::new(vec![7, 8], vec![9]);

    let single = ranker.compute_single_loss(&answers, &question).expect("loss");
    let batch = ranker
        .compute_loss(
            &[answers.clone(), answers.clone()],
            &[question.clone(), question.clone()],
        )
        .expect("loss");
    assert!((batch - 2.0 * single).abs() < 1e-12);

    let mean = ranker
        .compute_mean_loss(
            &[answers.clone(), answers],
            &[question.clone(), question.clone()],
        )
        .expect("mean");
    // Normalized by total question tokens: 2 questions x 3 tokens.
    assert!((mean - batch / 6.0).abs() < 1e-12);
}

#[test]
fn loss_never_drops_below_regularization_floor() {
    let config = RankerConfig {
        middle_dim: 3,
        margin: 1e-12,
        reg: 1e-3,
        ..RankerConfig::default()
    };
    let mut ranker = ParseRanker::new(make_table(40, 4), config).expect("model");

    // Question equals the oracle: the pull-together term is zero and the
    // tiny margin clamps, leaving exactly 0.5 * reg * ||W_proj||^2.
    let oracle = Parse::new(vec![1, 2], vec![3]);
    let answers = AnswerSet::new(
        vec![oracle.clone(), Parse::new(vec![4, 5], vec![6])],
        oracle.clone(),
    );
    let loss = ranker.compute_single_loss(&answers, &oracle).expect("loss");
    let floor = 0.5
        * ranker.config().reg
        * ranker.params().w_proj.iter().map(|w| w * w).sum::<f64>();
    assert!((loss - floor).abs() < 1e-12);
}

// ============================================================================
// Gradient verification
// ============================================================================

#[test]
fn grad_check_passes_on_fixed_single_candidate_workload() {
    // The reference workload: H=5, V=1000, a single-candidate answer
    // set, so the sampled negative is a synthesized single-token pair.
    let config = RankerConfig {
        middle_dim: 5,
        margin: active_margin(5),
        ..RankerConfig::default()
    };
    let mut ranker = ParseRanker::new(make_table(1000, 5), config).expect("model");

    let question = Parse::new(vec![411, 339, 46], vec![341, 591, 83, 355, 175]);
    let answers = AnswerSet::new(
        vec![question.clone()],
        Parse::new(vec![21, 1], vec![2, 3, 4]),
    );

    let loss = ranker.compute_single_loss(&answers, &question).expect("loss");
    assert!(loss.is_finite() && loss >= 0.0);

    let report = ranker.grad_check(&answers, &question).expect("grad check");
    assert!(
        report.passed(DEFAULT_TOLERANCE),
        "gradient check failed:\n{report}"
    );
    assert_eq!(
        ranker.bptt(),
        ranker.config().bptt,
        "window must be restored after the check"
    );
}

#[test]
fn grad_check_passes_with_wordvec_backprop() {
    let config = RankerConfig {
        middle_dim: 4,
        margin: active_margin(4),
        backprop_wordvecs: true,
        ..RankerConfig::default()
    };
    let mut ranker = ParseRanker::new(make_table(1000, 5), config).expect("model");

    // Two candidates with token ids pairwise distinct from the question
    // and oracle: the negative is deterministic and the sparse
    // overwrite-by-key policy coincides with true accumulation.
    let oracle = Parse::new(vec![100, 101, 102], vec![103, 104]);
    let answers = AnswerSet::new(
        vec![oracle.clone(), Parse::new(vec![200, 201], vec![202, 203])],
        oracle,
    );
    let question = Parse::new(vec![300, 301, 302], vec![303, 304, 305]);

    let report = ranker.grad_check(&answers, &question).expect("grad check");
    assert!(
        report.passed(DEFAULT_TOLERANCE),
        "gradient check failed:\n{report}"
    );
    // Projection, bias, recurrence, and one row per touched token.
    assert!(report.sections.len() > 3);
}

// ============================================================================
// Negative sampling
// ============================================================================

#[test]
fn sampled_negative_is_never_the_oracle() {
    let oracle = Parse::new(vec![1, 2], vec![3]);
    let answers = AnswerSet::new(
        vec![
            oracle.clone(),
            Parse::new(vec![4], vec![5]),
            Parse::new(vec![6], vec![7, 8]),
        ],
        oracle,
    );
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let negative = sample_negative(&mut rng, &answers, 1000).expect("sample");
        assert_ne!(negative, answers.oracle);
    }
}

#[test]
fn single_candidate_falls_back_to_synthetic_negative() {
    let question = Parse::new(vec![411, 339, 46], vec![341, 591, 83, 355, 175]);
    let answers = AnswerSet::new(
        vec![question.clone()],
        Parse::new(vec![21, 1], vec![2, 3, 4]),
    );
    let mut rng = StdRng::seed_from_u64(42);
    let negative = sample_negative(&mut rng, &answers, 1000).expect("sample");
    assert_eq!(negative.input.len(), 1);
    assert_eq!(negative.command.len(), 1);
    assert!(negative.input[0] < 1000 && negative.command[0] < 1000);
}

#[test]
fn indistinct_candidates_error_instead_of_looping() {
    let oracle = Parse::new(vec![1, 2], vec![3]);
    let answers = AnswerSet::new(vec![oracle.clone(), oracle.clone()], oracle);
    let mut rng = StdRng::seed_from_u64(42);
    let err = sample_negative(&mut rng, &answers, 1000);
    assert!(matches!(err, Err(RankerError::ExhaustedCandidates { .. })));
}

// ============================================================================
// Checkpoint persistence
// ============================================================================

#[test]
fn checkpoint_disk_round_trip_preserves_predictions() {
    let config = RankerConfig {
        middle_dim: 3,
        margin: active_margin(3),
        backprop_wordvecs: true,
        ..RankerConfig::default()
    };
    let mut trained = ParseRanker::new(make_table(40, 4), config.clone()).expect("model");

    let oracle = Parse::new(vec![1, 2], vec![3, 4]);
    let answers = AnswerSet::new(
        vec![oracle.clone(), Parse::new(vec![5, 6], vec![7])],
        oracle,
    );
    let question = Parse::new(vec![8, 9], vec![10, 11]);
    for _ in 0..5 {
        trained.train_step(&answers, &question).expect("train");
    }

    let dir = tempfile::tempdir().expect("tmpdir");
    let path = dir.path().join("ranker.json");
    save_to_disk(&trained.snapshot(), &path).expect("save");
    let loaded = load_from_disk(&path).expect("load");

    let mut restored = ParseRanker::new(make_table(40, 4), config).expect("model");
    restored.restore_from(&loaded).expect("restore");
    assert_eq!(restored.examples_seen(), 5);

    assert_eq!(
        trained.predict_single(&answers, &question).expect("predict"),
        restored.predict_single(&answers, &question).expect("predict"),
    );
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn toml_config_drives_the_model() {
    let config = RankerConfig::from_toml_str(
        r#"
middle_dim = 6
margin = 2.0
bptt = 3
backprop_wordvecs = true
seed = 77
"#,
    )
    .expect("parse");
    let ranker = ParseRanker::new(make_table(20, 4), config).expect("model");
    assert_eq!(ranker.params().middle_dim, 6);
    assert_eq!(ranker.bptt(), 3);
    assert!(ranker.config().backprop_wordvecs);
}

#[test]
fn out_of_vocabulary_token_fails_at_point_of_use() {
    let ranker = ParseRanker::new(
        make_table(20, 4),
        RankerConfig {
            middle_dim: 3,
            ..RankerConfig::default()
        },
    )
    .expect("model");
    let oracle = Parse::new(vec![1], vec![2]);
    let answers = AnswerSet::new(vec![oracle.clone()], oracle);
    let err = ranker.predict_single(&answers, &Parse::new(vec![99], vec![0]));
    assert!(matches!(
        err,
        Err(RankerError::TokenOutOfRange {
            token: 99,
            vocab_size: 20,
        })
    ));
}
