use ndarray::{s, Array1, Array2, Array3, ArrayD, ArrayViewD, Axis};

use crate::diagnostics::{AnomalyKind, AnomalyRecord, DiagnosticSink, TracingSink};
use crate::math::scale::effective_scale;
use crate::math::softmax::{masked_softmax3, normalized_confidence, softmax_lane};
use crate::shape::{self, DiagonalModelPolicy, ModelCollapsePolicy, ScoreShapeError};

#[derive(Clone, Debug)]
pub struct EstimatorConfig {
    /// Base softmax slope from scores to probabilities, before the per-trial
    /// target-count correction.
    pub softmax_scale: f64,
    /// Collapse the decision-point axis to one probability vector per trial.
    pub marginalize_models: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            softmax_scale: 2.0,
            marginalize_models: true,
        }
    }
}

/// Converts accumulated evidence scores into per-trial target probabilities.
///
/// Stateless between calls; `estimate` is `&mut self` only so the owned
/// diagnostics sink can record anomalies. Inputs are never mutated.
pub struct TargetProbabilityEstimator {
    cfg: EstimatorConfig,
    policy: Box<dyn ModelCollapsePolicy>,
    sink: Box<dyn DiagnosticSink>,
}

impl Default for TargetProbabilityEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

impl TargetProbabilityEstimator {
    pub fn new(cfg: EstimatorConfig) -> Self {
        Self {
            cfg,
            policy: Box::new(DiagonalModelPolicy),
            sink: Box::new(TracingSink),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn ModelCollapsePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Accepts scores of rank 1..=4 (see `shape::to_trial_major`) and an
    /// optional validity mask of rank 1..=2. Returns (trial, target)
    /// probabilities when the decision axis is collapsed, or the full
    /// (trial, decision-point, target) tensor when there is a single
    /// decision point or collapsing is disabled. Rows of invalid trials are
    /// all zero; every other row sums to 1.
    pub fn estimate(
        &mut self,
        scores: ArrayViewD<'_, f64>,
        valid_targets: Option<ArrayViewD<'_, bool>>,
    ) -> Result<ArrayD<f64>, ScoreShapeError> {
        let scores = shape::to_trial_major(scores, self.policy.as_ref())?;
        let (n_trials, n_decis, n_targets) = scores.dim();

        let mask = match valid_targets {
            Some(m) => shape::normalize_mask(m, n_trials, n_targets)?,
            None => shape::derive_mask(&scores),
        };

        let scales: Vec<f64> = mask
            .outer_iter()
            .map(|row| {
                let n_valid = row.iter().filter(|&&v| v).count();
                effective_scale(self.cfg.softmax_scale, n_valid)
            })
            .collect();

        let mut scaled = scores.clone();
        for (t, mut trial) in scaled.outer_iter_mut().enumerate() {
            trial.mapv_inplace(|v| v * scales[t]);
        }
        let per_decision = masked_softmax3(&scaled, &mask);

        let mut probs = if self.cfg.marginalize_models && n_decis > 1 {
            collapse_decision_axis(&scores, &per_decision, &mask, &scales).into_dyn()
        } else {
            per_decision.into_dyn()
        };

        self.zero_non_finite_trials(&mut probs);
        Ok(probs)
    }

    /// Trials containing non-finite values are forced to all-zero rather
    /// than letting NaN reach the selection stage. A strict subset of bad
    /// trials is an unexpected numerical failure and is reported; a fully
    /// bad batch is zeroed the same way without a report.
    fn zero_non_finite_trials(&mut self, probs: &mut ArrayD<f64>) {
        let n_trials = probs.shape()[0];
        let mut affected = Vec::new();
        for (t, mut trial) in probs.outer_iter_mut().enumerate() {
            if trial.iter().any(|v| !v.is_finite()) {
                trial.fill(0.0);
                affected.push(t);
            }
        }
        if !affected.is_empty() && affected.len() < n_trials {
            self.sink.record(AnomalyRecord {
                kind: AnomalyKind::NonFiniteProbabilities,
                affected_trials: affected,
                total_trials: n_trials,
            });
        }
    }
}

/// Entropy-guided collapse of the decision-point axis, one trial at a time.
///
/// The elbow is the first decision point of maximal confidence; earlier
/// points carry less accumulated evidence and are dropped. The raw scores
/// from the elbow onward are averaged, rescaled, and renormalized.
fn collapse_decision_axis(
    raw: &Array3<f64>,
    per_decision: &Array3<f64>,
    mask: &Array2<bool>,
    scales: &[f64],
) -> Array2<f64> {
    let (n_trials, n_decis, n_targets) = raw.dim();
    let mut out = Array2::zeros((n_trials, n_targets));

    for t in 0..n_trials {
        let mut elbow = 0usize;
        let mut best = f64::NEG_INFINITY;
        for (d, lane) in per_decision.index_axis(Axis(0), t).outer_iter().enumerate() {
            let c = normalized_confidence(lane);
            if c > best {
                best = c;
                elbow = d;
            }
        }

        let span = (n_decis - elbow) as f64;
        let mut avg = Array1::<f64>::zeros(n_targets);
        for d in elbow..n_decis {
            avg += &raw.slice(s![t, d, ..]);
        }
        avg.mapv_inplace(|v| v * scales[t] / span);

        softmax_lane(avg.view_mut(), Some(mask.row(t)));
        out.row_mut(t).assign(&avg);
    }

    out
}
