use ndarray::{Array2, Array3, ArrayD, ArrayView1, ArrayViewD, ArrayViewMut1, Axis};

use crate::shape::{self, ScoreShapeError};

/// Floor on the normalizing sum; keeps fully masked lanes at exact zero
/// instead of NaN.
const SUM_FLOOR: f64 = 1e-6;

/// Floor inside the entropy log.
const PROB_FLOOR: f64 = 1e-8;

/// Softmax over the last axis of a rank 1..=4 score tensor, with an optional
/// validity mask applied per trial. Masked-out entries come back as exact
/// zeros; a lane with no valid entries comes back all zero.
pub fn masked_softmax(
    scores: ArrayViewD<'_, f64>,
    valid_targets: Option<ArrayViewD<'_, bool>>,
) -> Result<ArrayD<f64>, ScoreShapeError> {
    let rank = scores.ndim();
    if rank == 0 || rank > 4 {
        return Err(ScoreShapeError::UnsupportedRank(rank));
    }
    let dims = scores.shape().to_vec();
    let n_targets = dims[rank - 1];
    let n_trials = if rank >= 3 { dims[rank - 3] } else { 1 };
    let n_decis = if rank >= 2 { dims[rank - 2] } else { 1 };

    let mask = match valid_targets {
        Some(m) => Some(shape::normalize_mask(m, n_trials, n_targets)?),
        None => None,
    };

    let mut out = scores.to_owned();
    for (i, lane) in out.lanes_mut(Axis(rank - 1)).into_iter().enumerate() {
        let t = (i / n_decis.max(1)) % n_trials.max(1);
        softmax_lane(lane, mask.as_ref().map(|m| m.row(t)));
    }
    Ok(out)
}

/// Canonical-form variant used by the estimator once the mask is resolved.
pub(crate) fn masked_softmax3(scores: &Array3<f64>, mask: &Array2<bool>) -> Array3<f64> {
    let mut out = scores.clone();
    for (t, mut trial) in out.outer_iter_mut().enumerate() {
        for lane in trial.outer_iter_mut() {
            softmax_lane(lane, Some(mask.row(t)));
        }
    }
    out
}

pub(crate) fn softmax_lane(mut lane: ArrayViewMut1<'_, f64>, mask: Option<ArrayView1<'_, bool>>) {
    let valid = |y: usize| mask.map_or(true, |m| m[y]);

    // lane max over valid entries only
    let mut max = f64::NEG_INFINITY;
    for (y, &v) in lane.iter().enumerate() {
        if valid(y) && v > max {
            max = v;
        }
    }
    if max == f64::NEG_INFINITY {
        max = 0.0;
    }

    let mut sum = 0.0;
    for (y, v) in lane.iter_mut().enumerate() {
        let e = if valid(y) { (*v - max).exp() } else { 0.0 };
        *v = e;
        sum += e;
    }

    let denom = sum.max(SUM_FLOOR);
    for v in lane.iter_mut() {
        *v /= denom;
    }
}

/// Inverted normalized entropy of a probability lane: 1.0 when fully peaked,
/// 0.0 when uniform. Higher means more decisive — the inversion from raw
/// Shannon entropy is intentional and relied upon by the elbow search.
pub(crate) fn normalized_confidence(probs: ArrayView1<'_, f64>) -> f64 {
    let n = probs.len();
    if n <= 1 {
        // a one-target distribution is fully determined
        return 1.0;
    }
    let log_n = (n as f64).ln();
    let h: f64 = probs.iter().map(|&p| p * p.max(PROB_FLOOR).ln()).sum();
    1.0 - h / -log_n
}
