use ndarray::{s, Array2, Array3, ArrayD, ArrayView4, ArrayViewD, Axis, Ix2, Ix3, Ix4};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreShapeError {
    #[error("score tensor rank {0} is outside the supported 1..=4 range")]
    UnsupportedRank(usize),
    #[error("{models} model slices cannot be matched one-to-one against {targets} targets")]
    ModelTargetMismatch { models: usize, targets: usize },
    #[error("validity mask rank {0} is outside the supported 1..=2 range")]
    UnsupportedMaskRank(usize),
    #[error("validity mask shape {mask:?} does not cover {trials} trials of {targets} targets")]
    MaskMismatch {
        mask: Vec<usize>,
        trials: usize,
        targets: usize,
    },
}

/// How a leading model axis is collapsed onto the target axis.
pub trait ModelCollapsePolicy {
    fn collapse(&self, scores: ArrayView4<'_, f64>) -> Result<Array3<f64>, ScoreShapeError>;
}

/// Takes model `m` as the designated scorer for target `m`. Only sound when
/// every model emits scores with comparable mean and spread; callers mixing
/// heterogeneously scaled models must renormalize upstream first.
pub struct DiagonalModelPolicy;

impl ModelCollapsePolicy for DiagonalModelPolicy {
    fn collapse(&self, scores: ArrayView4<'_, f64>) -> Result<Array3<f64>, ScoreShapeError> {
        let (n_models, n_trials, n_decis, n_targets) = scores.dim();
        if n_models > n_targets {
            return Err(ScoreShapeError::ModelTargetMismatch {
                models: n_models,
                targets: n_targets,
            });
        }

        // target columns beyond the model count stay zero
        let mut out = Array3::zeros((n_trials, n_decis, n_targets));
        for m in 0..n_models {
            out.slice_mut(s![.., .., m]).assign(&scores.slice(s![m, .., .., m]));
        }
        Ok(out)
    }
}

/// Bring a rank 1..=4 score tensor into canonical
/// (trial, decision-point, target) form.
pub(crate) fn to_trial_major(
    scores: ArrayViewD<'_, f64>,
    policy: &dyn ModelCollapsePolicy,
) -> Result<Array3<f64>, ScoreShapeError> {
    let rank = scores.ndim();
    match rank {
        1 => as_rank3(scores.to_owned().insert_axis(Axis(0)).insert_axis(Axis(0))),
        2 => as_rank3(scores.to_owned().insert_axis(Axis(0))),
        3 => as_rank3(scores.to_owned()),
        4 => {
            if scores.shape()[0] == 1 {
                as_rank3(scores.index_axis(Axis(0), 0).to_owned())
            } else {
                let view = scores
                    .into_dimensionality::<Ix4>()
                    .map_err(|_| ScoreShapeError::UnsupportedRank(rank))?;
                policy.collapse(view)
            }
        }
        _ => Err(ScoreShapeError::UnsupportedRank(rank)),
    }
}

fn as_rank3(scores: ArrayD<f64>) -> Result<Array3<f64>, ScoreShapeError> {
    let rank = scores.ndim();
    scores
        .into_dimensionality::<Ix3>()
        .map_err(|_| ScoreShapeError::UnsupportedRank(rank))
}

/// A target is valid in a trial if any of its scores is nonzero across
/// decision points. NaN counts as nonzero so broken trials stay visible to
/// the non-finite guard instead of being masked away.
pub(crate) fn derive_mask(scores: &Array3<f64>) -> Array2<bool> {
    let (n_trials, _, n_targets) = scores.dim();
    Array2::from_shape_fn((n_trials, n_targets), |(t, y)| {
        scores.slice(s![t, .., y]).iter().any(|&v| v != 0.0)
    })
}

pub(crate) fn normalize_mask(
    mask: ArrayViewD<'_, bool>,
    n_trials: usize,
    n_targets: usize,
) -> Result<Array2<bool>, ScoreShapeError> {
    match mask.ndim() {
        1 => {
            if mask.len() != n_targets {
                return Err(mask_mismatch(&mask, n_trials, n_targets));
            }
            Ok(Array2::from_shape_fn((n_trials, n_targets), |(_, y)| {
                mask[[y]]
            }))
        }
        2 => {
            let dims = mask.shape();
            if dims[0] != n_trials || dims[1] != n_targets {
                return Err(mask_mismatch(&mask, n_trials, n_targets));
            }
            mask.to_owned()
                .into_dimensionality::<Ix2>()
                .map_err(|_| ScoreShapeError::UnsupportedMaskRank(2))
        }
        r => Err(ScoreShapeError::UnsupportedMaskRank(r)),
    }
}

fn mask_mismatch(mask: &ArrayViewD<'_, bool>, trials: usize, targets: usize) -> ScoreShapeError {
    ScoreShapeError::MaskMismatch {
        mask: mask.shape().to_vec(),
        trials,
        targets,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        derive_mask, normalize_mask, to_trial_major, DiagonalModelPolicy, ModelCollapsePolicy,
        ScoreShapeError,
    };
    use ndarray::{array, Array4, ArrayD, IxDyn};

    #[test]
    fn rank_one_becomes_single_trial_single_decision() {
        let v = array![0.5, -0.25, 0.1];
        let out = to_trial_major(v.view().into_dyn(), &DiagonalModelPolicy).unwrap();
        assert_eq!(out.dim(), (1, 1, 3));
        assert_eq!(out[[0, 0, 1]], -0.25);
    }

    #[test]
    fn rank_two_becomes_single_trial() {
        let v = array![[1.0, 2.0], [3.0, 4.0]];
        let out = to_trial_major(v.view().into_dyn(), &DiagonalModelPolicy).unwrap();
        assert_eq!(out.dim(), (1, 2, 2));
        assert_eq!(out[[0, 1, 0]], 3.0);
    }

    #[test]
    fn rank_three_passes_through_unchanged() {
        let v = array![[[1.0, 2.0]], [[3.0, 4.0]]];
        let out = to_trial_major(v.view().into_dyn(), &DiagonalModelPolicy).unwrap();
        assert_eq!(out.dim(), (2, 1, 2));
        assert_eq!(out[[1, 0, 1]], 4.0);
    }

    #[test]
    fn singleton_model_axis_is_dropped() {
        let mut v = Array4::<f64>::zeros((1, 2, 3, 4));
        v[[0, 1, 2, 3]] = 7.0;
        let out = to_trial_major(v.view().into_dyn(), &DiagonalModelPolicy).unwrap();
        assert_eq!(out.dim(), (2, 3, 4));
        assert_eq!(out[[1, 2, 3]], 7.0);
    }

    #[test]
    fn diagonal_policy_picks_matching_model_slices() {
        // model 0 scores target 0 with 5s, model 1 scores target 1 with 7s,
        // off-diagonal slices hold junk that must not leak through
        let mut v = Array4::<f64>::from_elem((2, 1, 2, 2), 99.0);
        v.slice_mut(ndarray::s![0, .., .., 0]).fill(5.0);
        v.slice_mut(ndarray::s![1, .., .., 1]).fill(7.0);
        let out = to_trial_major(v.view().into_dyn(), &DiagonalModelPolicy).unwrap();
        assert_eq!(out.dim(), (1, 2, 2));
        for d in 0..2 {
            assert_eq!(out[[0, d, 0]], 5.0);
            assert_eq!(out[[0, d, 1]], 7.0);
        }
    }

    #[test]
    fn diagonal_policy_zero_fills_unmatched_targets() {
        let v = Array4::<f64>::from_elem((2, 1, 1, 3), 1.0);
        let out = DiagonalModelPolicy.collapse(v.view()).unwrap();
        assert_eq!(out[[0, 0, 0]], 1.0);
        assert_eq!(out[[0, 0, 1]], 1.0);
        assert_eq!(out[[0, 0, 2]], 0.0);
    }

    #[test]
    fn more_models_than_targets_is_rejected() {
        let v = Array4::<f64>::zeros((3, 1, 1, 2));
        let err = to_trial_major(v.view().into_dyn(), &DiagonalModelPolicy).unwrap_err();
        assert_eq!(
            err,
            ScoreShapeError::ModelTargetMismatch {
                models: 3,
                targets: 2
            }
        );
    }

    #[test]
    fn unsupported_ranks_are_rejected() {
        let v5 = ArrayD::<f64>::zeros(IxDyn(&[1, 1, 1, 1, 2]));
        assert_eq!(
            to_trial_major(v5.view(), &DiagonalModelPolicy).unwrap_err(),
            ScoreShapeError::UnsupportedRank(5)
        );
        let v0 = ArrayD::<f64>::zeros(IxDyn(&[]));
        assert_eq!(
            to_trial_major(v0.view(), &DiagonalModelPolicy).unwrap_err(),
            ScoreShapeError::UnsupportedRank(0)
        );
    }

    #[test]
    fn derived_mask_flags_columns_with_any_nonzero_score() {
        let scores = array![[[1.0, 0.0, 0.0], [0.5, 0.0, -0.1]]];
        let mask = derive_mask(&scores);
        assert!(mask[[0, 0]]);
        assert!(!mask[[0, 1]]);
        assert!(mask[[0, 2]]);
    }

    #[test]
    fn rank_one_mask_applies_to_every_trial() {
        let m = array![true, false];
        let out = normalize_mask(m.view().into_dyn(), 3, 2).unwrap();
        assert_eq!(out.dim(), (3, 2));
        for t in 0..3 {
            assert!(out[[t, 0]]);
            assert!(!out[[t, 1]]);
        }
    }

    #[test]
    fn mismatched_masks_fail_fast() {
        let short = array![true];
        assert!(matches!(
            normalize_mask(short.view().into_dyn(), 1, 2),
            Err(ScoreShapeError::MaskMismatch { .. })
        ));

        let wrong_trials = array![[true, true]];
        assert!(matches!(
            normalize_mask(wrong_trials.view().into_dyn(), 2, 2),
            Err(ScoreShapeError::MaskMismatch { .. })
        ));

        let rank3 = ArrayD::<bool>::from_elem(IxDyn(&[1, 1, 2]), true);
        assert_eq!(
            normalize_mask(rank3.view(), 1, 2).unwrap_err(),
            ScoreShapeError::UnsupportedMaskRank(3)
        );
    }
}
