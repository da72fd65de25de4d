//! Threshold-sweep curves built from per-frame metric vectors, and the
//! scalar reductions used for ranking.

use crate::utils::stats::nan_mean;

/// Number of points in the success plots (IoU-family thresholds over [0, 1]).
pub const NBINS_IOU: usize = 101;

/// Number of points in the precision plots. Pixel thresholds are the
/// integers 0..=400; normalized thresholds are 401 points over [0, 1].
pub const NBINS_CE: usize = 401;

/// Pixel threshold at which the precision score is read off the curve.
pub const CE_THRESHOLD: usize = 20;

/// The five per-sequence curves.
#[derive(Debug, Clone)]
pub struct SequenceCurves {
    pub succ_iou: Vec<f64>,
    pub succ_diou: Vec<f64>,
    pub succ_giou: Vec<f64>,
    pub prec: Vec<f64>,
    pub norm_prec: Vec<f64>,
}

impl SequenceCurves {
    /// Curves of a sequence that produced no valid frames. All-NaN so the
    /// sequence contributes nothing to cross-sequence averaging.
    pub fn undefined() -> Self {
        Self {
            succ_iou: vec![f64::NAN; NBINS_IOU],
            succ_diou: vec![f64::NAN; NBINS_IOU],
            succ_giou: vec![f64::NAN; NBINS_IOU],
            prec: vec![f64::NAN; NBINS_CE],
            norm_prec: vec![f64::NAN; NBINS_CE],
        }
    }
}

/// Evenly spaced thresholds over [0, 1].
pub fn linspace01(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
}

/// Fraction of frames whose metric exceeds the threshold. NaN metrics are
/// treated as missing, so they distort neither numerator nor denominator.
fn fraction_above(values: &[f32], threshold: f64) -> f64 {
    let indicators = values
        .iter()
        .map(|v| {
            if v.is_nan() {
                f64::NAN
            } else if *v as f64 > threshold {
                1.0
            } else {
                0.0
            }
        })
        .collect::<Vec<_>>();
    nan_mean(&indicators)
}

/// Fraction of frames whose metric is below the threshold.
fn fraction_below(values: &[f32], threshold: f64) -> f64 {
    let indicators = values
        .iter()
        .map(|v| {
            if v.is_nan() {
                f64::NAN
            } else if (*v as f64) < threshold {
                1.0
            } else {
                0.0
            }
        })
        .collect::<Vec<_>>();
    nan_mean(&indicators)
}

/// Builds the five evaluation curves from per-frame metric vectors.
pub fn calc_curves(
    ious: &[f32],
    dious: &[f32],
    gious: &[f32],
    center_errors: &[f32],
    norm_center_errors: &[f32],
) -> SequenceCurves {
    let thr_iou = linspace01(NBINS_IOU);
    let thr_nce = linspace01(NBINS_CE);

    SequenceCurves {
        succ_iou: thr_iou.iter().map(|t| fraction_above(ious, *t)).collect(),
        succ_diou: thr_iou.iter().map(|t| fraction_above(dious, *t)).collect(),
        succ_giou: thr_iou.iter().map(|t| fraction_above(gious, *t)).collect(),
        prec: (0..NBINS_CE)
            .map(|t| fraction_below(center_errors, t as f64))
            .collect(),
        norm_prec: thr_nce
            .iter()
            .map(|t| fraction_below(norm_center_errors, *t))
            .collect(),
    }
}

/// Success score: NaN-aware mean of the success curve over all thresholds.
pub fn success_score(curve: &[f64]) -> f64 {
    nan_mean(curve)
}

/// Success rate: the curve value at the 0.5 overlap threshold.
pub fn success_rate(curve: &[f64]) -> f64 {
    curve[NBINS_IOU / 2]
}

/// Precision score: the curve value at the fixed pixel threshold.
pub fn precision_score(curve: &[f64]) -> f64 {
    curve[CE_THRESHOLD]
}

/// Normalized precision score: the fraction of valid frames whose predicted
/// center falls inside the ground-truth box. Deliberately not read off the
/// curve, kept for compatibility with the dataset's established convention.
pub fn norm_prec_score(in_region_flags: &[bool]) -> f64 {
    if in_region_flags.is_empty() {
        f64::NAN
    } else {
        in_region_flags.iter().filter(|f| **f).count() as f64 / in_region_flags.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn success_curve_is_monotonically_non_increasing() {
        let ious = [0.95_f32, 0.1, 0.4, 0.62, 0.33, 0.0, 0.88, 0.5];
        let curves = calc_curves(&ious, &ious, &ious, &[0.0; 8], &[0.0; 8]);
        for w in curves.succ_iou.windows(2) {
            assert!(w[1] <= w[0] + EPS);
        }
    }

    #[test]
    fn precision_score_aligns_with_pixel_threshold_index() {
        let errors = [5.0_f32, 15.0, 25.0, 150.0];
        let curves = calc_curves(&[0.5; 4], &[0.5; 4], &[0.5; 4], &errors, &[0.0; 4]);
        assert!((precision_score(&curves.prec) - curves.prec[20]).abs() < EPS);
        // errors below 20 px: two of four frames
        assert!((curves.prec[CE_THRESHOLD] - 0.5).abs() < EPS);
    }

    #[test]
    fn perfect_tracking_scores_one() {
        let n = 10;
        let ious = vec![1.0_f32; n];
        let errors = vec![0.0_f32; n];
        let curves = calc_curves(&ious, &ious, &ious, &errors, &errors);

        assert!((success_score(&curves.succ_iou) - 1.0).abs() < 1e-2);
        assert!((success_rate(&curves.succ_iou) - 1.0).abs() < EPS);
        assert!((precision_score(&curves.prec) - 1.0).abs() < EPS);
        // threshold 1.0 is excluded by the strict comparison
        assert!(curves.succ_iou[NBINS_IOU - 1].abs() < EPS);
    }

    #[test]
    fn nan_frames_do_not_enter_the_denominator() {
        let ious = [1.0_f32, f32::NAN, 0.0, f32::NAN];
        let curves = calc_curves(&ious, &ious, &ious, &[0.0; 4], &[0.0; 4]);
        // one of two defined frames exceeds 0.5
        assert!((curves.succ_iou[NBINS_IOU / 2] - 0.5).abs() < EPS);
    }

    #[test]
    fn empty_input_yields_undefined_curves() {
        let curves = calc_curves(&[], &[], &[], &[], &[]);
        assert!(curves.succ_iou.iter().all(|v| v.is_nan()));
        assert!(curves.prec.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn norm_prec_score_is_the_flag_fraction() {
        assert!((norm_prec_score(&[true, true, false, true]) - 0.75).abs() < EPS);
        assert!(norm_prec_score(&[]).is_nan());
    }
}
