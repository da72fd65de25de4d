//! Per-frame similarity and distance metrics between predicted and
//! ground-truth boxes.
//!
//! All functions operate elementwise over equal-length slices. Frames with
//! undefined (NaN) annotations must be excluded by the caller beforehand.

use crate::utils::bbox::BoundingBox;
use crate::Errors;
use anyhow::Result;

fn check_geometry(b: &BoundingBox) -> Result<()> {
    if b.width() < 0.0 || b.height() < 0.0 {
        Err(Errors::InvalidGeometry(b.width(), b.height()).into())
    } else {
        Ok(())
    }
}

/// Intersection-over-Union of a single box pair. Zero when the union area
/// is zero.
pub fn iou_single(a: &BoundingBox, b: &BoundingBox) -> Result<f32> {
    check_geometry(a)?;
    check_geometry(b)?;

    let intersection = BoundingBox::intersection(a, b);
    let union = (a.area() + b.area()) as f64 - intersection;
    if union <= 0.0 {
        Ok(0.0)
    } else {
        Ok((intersection / union) as f32)
    }
}

/// Distance-IoU: IoU penalized by the squared center distance relative to
/// the squared diagonal of the smallest enclosing box. Can be negative.
pub fn diou_single(a: &BoundingBox, b: &BoundingBox) -> Result<f32> {
    let iou = iou_single(a, b)?;

    let (acx, acy) = a.center();
    let (bcx, bcy) = b.center();
    let d2 = (acx - bcx).powi(2) + (acy - bcy).powi(2);

    let enclosing = BoundingBox::enclosing(a, b);
    let c2 = enclosing.width().powi(2) + enclosing.height().powi(2);

    if c2 > 0.0 {
        Ok(iou - d2 / c2)
    } else {
        Ok(iou)
    }
}

/// Generalized-IoU: IoU penalized by the enclosing-box area not covered by
/// the union. Can be negative.
pub fn giou_single(a: &BoundingBox, b: &BoundingBox) -> Result<f32> {
    check_geometry(a)?;
    check_geometry(b)?;

    let intersection = BoundingBox::intersection(a, b);
    let union = (a.area() + b.area()) as f64 - intersection;
    let iou = if union <= 0.0 {
        0.0
    } else {
        intersection / union
    };

    let enclosing_area = BoundingBox::enclosing(a, b).area() as f64;
    if enclosing_area > 0.0 {
        Ok((iou - (enclosing_area - union) / enclosing_area) as f32)
    } else {
        Ok(iou as f32)
    }
}

/// Euclidean distance between box centers in pixels.
pub fn center_error_single(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let (acx, acy) = a.center();
    let (bcx, bcy) = b.center();
    ((acx - bcx).powi(2) + (acy - bcy).powi(2)).sqrt()
}

/// Euclidean distance between box centers with each coordinate divided by
/// the corresponding frame dimension. The flag is set when the predicted
/// center falls inside the ground-truth box extent.
pub fn normalized_center_error_single(
    pred: &BoundingBox,
    gt: &BoundingBox,
    bound: (u32, u32),
) -> (f32, bool) {
    let (pcx, pcy) = pred.center();
    let (gcx, gcy) = gt.center();

    let dx = (pcx - gcx) / bound.0 as f32;
    let dy = (pcy - gcy) / bound.1 as f32;
    let error = (dx.powi(2) + dy.powi(2)).sqrt();

    let in_region = pcx >= gt.x()
        && pcx <= gt.x() + gt.width()
        && pcy >= gt.y()
        && pcy <= gt.y() + gt.height();

    (error, in_region)
}

fn elementwise<F>(pred: &[BoundingBox], gt: &[BoundingBox], f: F) -> Result<Vec<f32>>
where
    F: Fn(&BoundingBox, &BoundingBox) -> Result<f32>,
{
    if pred.len() != gt.len() {
        return Err(Errors::ShapeMismatch(pred.len(), gt.len()).into());
    }
    pred.iter().zip(gt).map(|(p, g)| f(p, g)).collect()
}

pub fn iou(pred: &[BoundingBox], gt: &[BoundingBox]) -> Result<Vec<f32>> {
    elementwise(pred, gt, |p, g| iou_single(p, g))
}

pub fn diou(pred: &[BoundingBox], gt: &[BoundingBox]) -> Result<Vec<f32>> {
    elementwise(pred, gt, |p, g| diou_single(p, g))
}

pub fn giou(pred: &[BoundingBox], gt: &[BoundingBox]) -> Result<Vec<f32>> {
    elementwise(pred, gt, |p, g| giou_single(p, g))
}

pub fn center_error(pred: &[BoundingBox], gt: &[BoundingBox]) -> Result<Vec<f32>> {
    elementwise(pred, gt, |p, g| Ok(center_error_single(p, g)))
}

pub fn normalized_center_error(
    pred: &[BoundingBox],
    gt: &[BoundingBox],
    bound: (u32, u32),
) -> Result<(Vec<f32>, Vec<bool>)> {
    if pred.len() != gt.len() {
        return Err(Errors::ShapeMismatch(pred.len(), gt.len()).into());
    }
    Ok(pred
        .iter()
        .zip(gt)
        .map(|(p, g)| normalized_center_error_single(p, g, bound))
        .unzip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EPS;
    use rand::Rng;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let bb = BoundingBox::new(3.0, 7.0, 20.0, 10.0);
        assert!((iou_single(&bb, &bb).unwrap() - 1.0).abs() < EPS);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let bb1 = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let bb2 = BoundingBox::new(10.0, 10.0, 2.0, 2.0);
        assert!(iou_single(&bb1, &bb2).unwrap().abs() < EPS);
    }

    #[test]
    fn iou_of_degenerate_pair_is_zero() {
        let bb = BoundingBox::new(0.0, 0.0, 0.0, 0.0);
        assert!(iou_single(&bb, &bb).unwrap().abs() < EPS);
    }

    #[test]
    fn negative_extent_is_rejected() {
        let bad = BoundingBox::new(0.0, 0.0, -1.0, 2.0);
        let good = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        assert!(iou_single(&bad, &good).is_err());
        assert!(giou_single(&good, &bad).is_err());
        assert!(diou_single(&bad, &bad).is_err());
    }

    #[test]
    fn center_error_is_symmetric() {
        let bb1 = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
        let bb2 = BoundingBox::new(7.0, 1.0, 2.0, 8.0);
        assert!(
            (center_error_single(&bb1, &bb2) - center_error_single(&bb2, &bb1)).abs() < EPS
        );
    }

    #[test]
    fn penalized_variants_do_not_exceed_iou() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let a = BoundingBox::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(1.0..40.0),
                rng.gen_range(1.0..40.0),
            );
            let b = BoundingBox::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(1.0..40.0),
                rng.gen_range(1.0..40.0),
            );
            let iou = iou_single(&a, &b).unwrap();
            assert!(diou_single(&a, &b).unwrap() <= iou + EPS);
            assert!(giou_single(&a, &b).unwrap() <= iou + EPS);
        }
    }

    #[test]
    fn in_region_flag_follows_predicted_center() {
        let gt = BoundingBox::new(10.0, 10.0, 10.0, 10.0);
        let inside = BoundingBox::new(12.0, 12.0, 6.0, 6.0);
        let outside = BoundingBox::new(30.0, 30.0, 6.0, 6.0);

        let (err, flag) = normalized_center_error_single(&inside, &gt, (100, 100));
        assert!(flag);
        assert!(err < 1.0);

        let (_, flag) = normalized_center_error_single(&outside, &gt, (100, 100));
        assert!(!flag);
    }

    #[test]
    fn elementwise_shape_mismatch() {
        let a = vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0)];
        let b = Vec::default();
        assert!(iou(&a, &b).is_err());
    }
}
