//! NaN-aware reductions.
//!
//! NaN entries are treated as missing: they contribute neither to the sum nor
//! to the denominator. A reduction over an input with no finite entries is
//! NaN, so empty sequences fall out of cross-sequence averages naturally.

/// Mean over finite entries. NaN when there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Sum over finite entries. Zero when there are none.
pub fn nan_sum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

/// Columnwise NaN-aware mean of equally sized rows.
///
/// A row that is entirely NaN contributes to no column. Panics when the rows
/// disagree in length.
pub fn column_nan_mean(rows: &[Vec<f64>]) -> Vec<f64> {
    if rows.is_empty() {
        return Vec::new();
    }
    let width = rows[0].len();
    let mut sums = vec![0.0_f64; width];
    let mut counts = vec![0_usize; width];
    for row in rows {
        assert_eq!(row.len(), width);
        for (i, v) in row.iter().enumerate() {
            if !v.is_nan() {
                sums[i] += v;
                counts[i] += 1;
            }
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(s, c)| if *c == 0 { f64::NAN } else { s / *c as f64 })
        .collect()
}

/// Mean over strictly positive entries, `None` when there are none.
pub fn mean_positive(values: &[f64]) -> Option<f64> {
    let positive = values
        .iter()
        .filter(|v| **v > 0.0)
        .copied()
        .collect::<Vec<_>>();
    if positive.is_empty() {
        None
    } else {
        Some(positive.iter().sum::<f64>() / positive.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn nan_mean_skips_missing() {
        assert!((nan_mean(&[1.0, f64::NAN, 3.0]) - 2.0).abs() < EPS);
        assert!(nan_mean(&[f64::NAN, f64::NAN]).is_nan());
        assert!(nan_mean(&[]).is_nan());
    }

    #[test]
    fn nan_sum_skips_missing() {
        assert!((nan_sum(&[1.0, f64::NAN, 3.0]) - 4.0).abs() < EPS);
        assert!(nan_sum(&[]).abs() < EPS);
    }

    #[test]
    fn column_mean_excludes_all_nan_rows() {
        let rows = vec![
            vec![1.0, 0.0],
            vec![f64::NAN, f64::NAN],
            vec![3.0, 1.0],
        ];
        let mean = column_nan_mean(&rows);
        assert!((mean[0] - 2.0).abs() < EPS);
        assert!((mean[1] - 0.5).abs() < EPS);
    }

    #[test]
    fn mean_positive_filters() {
        assert_eq!(mean_positive(&[-1.0, 0.0, -1.0]), None);
        let m = mean_positive(&[-1.0, 2.0, 4.0]).unwrap();
        assert!((m - 3.0).abs() < EPS);
    }
}
