//! `ParseRanker`: the top-level model that owns parameters, gradient
//! buffers, the RNG, and hyperparameters, and exposes the training-loop
//! API — accumulate/apply gradients, predict, loss reporting, and the
//! gradient-check wrapper.
//!
//! All mutation funnels through `&mut self`, which is what enforces the
//! single-writer contract on the gradient buffers: one accumulation
//! pass fully completes before the buffers are applied or reset.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::RankerConfig;
use crate::rnn::gradcheck::{check_gradients, GradCheckReport, GRAD_CHECK_BPTT};
use crate::rnn::params::{GradBuffers, RnnParams};
use crate::rnn::sampler::sample_negative;
use crate::rnn::scoring::{
    accumulate_with_negative, encode, margin_loss_with_negative, squared_distance,
};
use crate::rnn::RankerError;
use crate::types::{AnswerSet, Parse};

/// Margin-ranking RNN over (input, command) token-sequence pairs.
#[derive(Debug)]
pub struct ParseRanker {
    config: RankerConfig,
    params: RnnParams,
    grads: GradBuffers,
    rng: StdRng,
    /// Runtime BPTT window. Starts at `config.bptt`; the gradient-check
    /// wrapper temporarily widens it and restores it afterwards.
    bptt: usize,
    examples_seen: u64,
}

impl ParseRanker {
    /// Build a model over a pretrained word-vector table.
    ///
    /// The hidden dimension is inferred from the table's row width and
    /// the vocabulary size from its row count. Dense parameters are
    /// initialized from the seeded RNG; the table is copied as-is.
    pub fn new(word_vectors: Vec<Vec<f64>>, config: RankerConfig) -> Result<Self, RankerError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let params = RnnParams::from_pretrained(word_vectors, config.middle_dim, &mut rng)?;
        let grads = GradBuffers::new(&params);
        info!(
            hidden_dim = params.hidden_dim,
            vocab_size = params.vocab_size,
            middle_dim = params.middle_dim,
            num_params = params.num_params(),
            "initialized parse ranker"
        );
        Ok(Self {
            bptt: config.bptt,
            config,
            params,
            grads,
            rng,
            examples_seen: 0,
        })
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    pub fn params(&self) -> &RnnParams {
        &self.params
    }

    pub fn gradients(&self) -> &GradBuffers {
        &self.grads
    }

    /// Current BPTT window length.
    pub fn bptt(&self) -> usize {
        self.bptt
    }

    /// Training examples accumulated so far.
    pub fn examples_seen(&self) -> u64 {
        self.examples_seen
    }

    pub(crate) fn params_mut(&mut self) -> &mut RnnParams {
        &mut self.params
    }

    pub(crate) fn set_examples_seen(&mut self, n: u64) {
        self.examples_seen = n;
    }

    /// Accumulate gradients for one example: sample a negative, run the
    /// forward passes, and — if the margin is active — add the
    /// hand-derived gradients into the buffers.
    pub fn accumulate_gradients(
        &mut self,
        answers: &AnswerSet,
        question: &Parse,
    ) -> Result<(), RankerError> {
        let negative = sample_negative(&mut self.rng, answers, self.params.vocab_size)?;
        accumulate_with_negative(
            &self.params,
            &mut self.grads,
            question,
            &answers.oracle,
            &negative,
            &self.config,
            self.bptt,
        )?;
        self.examples_seen += 1;
        Ok(())
    }

    /// Zero the dense gradient buffers and clear the sparse map.
    pub fn reset_gradients(&mut self) {
        self.grads.reset();
    }

    /// SGD step at the configured learning rate, then reset the buffers.
    pub fn apply_gradients(&mut self) {
        self.params.apply_sgd(&self.grads, self.config.learning_rate);
        self.grads.reset();
    }

    /// One online training step: reset, accumulate, apply.
    pub fn train_step(&mut self, answers: &AnswerSet, question: &Parse) -> Result<(), RankerError> {
        self.reset_gradients();
        self.accumulate_gradients(answers, question)?;
        self.apply_gradients();
        Ok(())
    }

    /// Rank every candidate by squared embedding distance to the
    /// question and return the index of the closest one (`None` for an
    /// empty candidate list). Ties keep the earliest index — strict
    /// `<` comparison.
    pub fn predict_single(
        &self,
        answers: &AnswerSet,
        question: &Parse,
    ) -> Result<Option<usize>, RankerError> {
        let q = encode(&self.params, question)?;
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in answers.candidates.iter().enumerate() {
            let enc = encode(&self.params, candidate)?;
            let cost = squared_distance(&q.embedding, &enc.embedding);
            match best {
                Some((_, best_cost)) if cost >= best_cost => {}
                _ => best = Some((i, cost)),
            }
        }
        Ok(best.map(|(i, _)| i))
    }

    /// Predict over a batch of (answer set, question) pairs.
    pub fn predict(
        &self,
        answer_sets: &[AnswerSet],
        questions: &[Parse],
    ) -> Result<Vec<Option<usize>>, RankerError> {
        check_batch_lengths(answer_sets, questions)?;
        answer_sets
            .iter()
            .zip(questions.iter())
            .map(|(answers, question)| self.predict_single(answers, question))
            .collect()
    }

    /// Margin + regularization loss for one example, against a freshly
    /// sampled negative (so repeated calls can differ when more than
    /// one distinct negative exists).
    pub fn compute_single_loss(
        &mut self,
        answers: &AnswerSet,
        question: &Parse,
    ) -> Result<f64, RankerError> {
        let negative = sample_negative(&mut self.rng, answers, self.params.vocab_size)?;
        margin_loss_with_negative(
            &self.params,
            question,
            &answers.oracle,
            &negative,
            &self.config,
        )
    }

    /// Total loss over a batch.
    pub fn compute_loss(
        &mut self,
        answer_sets: &[AnswerSet],
        questions: &[Parse],
    ) -> Result<f64, RankerError> {
        check_batch_lengths(answer_sets, questions)?;
        let mut total = 0.0;
        for (answers, question) in answer_sets.iter().zip(questions.iter()) {
            total += self.compute_single_loss(answers, question)?;
        }
        Ok(total)
    }

    /// Batch loss normalized by the total token count across all
    /// question sequences (input length + command length per question),
    /// not by example count. An all-empty batch reports zero.
    pub fn compute_mean_loss(
        &mut self,
        answer_sets: &[AnswerSet],
        questions: &[Parse],
    ) -> Result<f64, RankerError> {
        let total = self.compute_loss(answer_sets, questions)?;
        let ntot: usize = questions.iter().map(Parse::token_count).sum();
        if ntot == 0 {
            return Ok(0.0);
        }
        Ok(total / ntot as f64)
    }

    /// Numerically verify the hand-derived gradients on one example.
    ///
    /// Temporarily widens the BPTT window to [`GRAD_CHECK_BPTT`] so the
    /// truncated backward pass covers the whole sequence, samples one
    /// negative and holds it fixed across the analytic and numeric
    /// passes, then restores the configured window — also on the error
    /// path.
    pub fn grad_check(
        &mut self,
        answers: &AnswerSet,
        question: &Parse,
    ) -> Result<GradCheckReport, RankerError> {
        let saved = self.bptt;
        self.bptt = GRAD_CHECK_BPTT;
        debug!(
            window = GRAD_CHECK_BPTT,
            "widening BPTT window to cover the full sequence for gradient check"
        );

        let result = sample_negative(&mut self.rng, answers, self.params.vocab_size).and_then(
            |negative| {
                check_gradients(
                    &mut self.params,
                    question,
                    &answers.oracle,
                    &negative,
                    &self.config,
                    self.bptt,
                )
            },
        );

        self.bptt = saved;
        debug!(window = saved, "restored BPTT window");
        result
    }
}

fn check_batch_lengths(answer_sets: &[AnswerSet], questions: &[Parse]) -> Result<(), RankerError> {
    if answer_sets.len() != questions.len() {
        return Err(RankerError::ShapeMismatch {
            what: "batch length",
            expected: answer_sets.len(),
            actual: questions.len(),
        });
    }
    Ok(())
}
