//! Ranking and comparison plots over aggregated reports.
//!
//! Each of the five curve kinds is rendered independently, with its own
//! ranking order. Ranking is stable, so equal scores keep the order the
//! trackers were inserted into the report with.

use crate::curves::{linspace01, NBINS_CE, NBINS_IOU};
use crate::report::{OverallPerformance, Performance};
use anyhow::Result;
use log::info;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

/// Scalar score selector for ranking and plotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKey {
    SuccessIou,
    SuccessDiou,
    SuccessGiou,
    Precision,
    NormPrecision,
}

impl MetricKey {
    pub const ALL: [MetricKey; 5] = [
        MetricKey::SuccessIou,
        MetricKey::SuccessDiou,
        MetricKey::SuccessGiou,
        MetricKey::Precision,
        MetricKey::NormPrecision,
    ];

    pub fn score(&self, overall: &OverallPerformance) -> f64 {
        match self {
            MetricKey::SuccessIou => overall.success_score_iou,
            MetricKey::SuccessDiou => overall.success_score_diou,
            MetricKey::SuccessGiou => overall.success_score_giou,
            MetricKey::Precision => overall.precision_score,
            MetricKey::NormPrecision => overall.norm_prec_score,
        }
    }

    pub fn curve<'a>(&self, overall: &'a OverallPerformance) -> &'a [f64] {
        match self {
            MetricKey::SuccessIou => &overall.success_curve_iou,
            MetricKey::SuccessDiou => &overall.success_curve_diou,
            MetricKey::SuccessGiou => &overall.success_curve_giou,
            MetricKey::Precision => &overall.precision_curve,
            MetricKey::NormPrecision => &overall.normalized_precision_curve,
        }
    }

    /// Threshold grid the curve is drawn against.
    pub fn thresholds(&self) -> Vec<f64> {
        match self {
            MetricKey::SuccessIou | MetricKey::SuccessDiou | MetricKey::SuccessGiou => {
                linspace01(NBINS_IOU)
            }
            MetricKey::Precision => (0..NBINS_CE).map(|t| t as f64).collect(),
            MetricKey::NormPrecision => linspace01(NBINS_CE),
        }
    }

    pub fn plot_file(&self, repetition: usize) -> String {
        match self {
            MetricKey::SuccessIou => format!("overall_success_plot_iou_{repetition}.png"),
            MetricKey::SuccessDiou => format!("overall_success_plot_diou_{repetition}.png"),
            MetricKey::SuccessGiou => format!("overall_success_plot_giou_{repetition}.png"),
            MetricKey::Precision => format!("overall_precision_plot_{repetition}.png"),
            MetricKey::NormPrecision => {
                format!("overall_norm_precision_plot_{repetition}.png")
            }
        }
    }

    fn title(&self) -> &'static str {
        match self {
            MetricKey::SuccessIou => "Success plots (based on IoU)",
            MetricKey::SuccessDiou => "Success plots (based on DIoU)",
            MetricKey::SuccessGiou => "Success plots (based on GIoU)",
            MetricKey::Precision => "Precision plots",
            MetricKey::NormPrecision => "Normalized precision plots",
        }
    }

    fn axis_labels(&self) -> (&'static str, &'static str) {
        match self {
            MetricKey::SuccessIou | MetricKey::SuccessDiou | MetricKey::SuccessGiou => {
                ("Overlap threshold", "Success rate")
            }
            MetricKey::Precision => ("Location error threshold", "Precision"),
            MetricKey::NormPrecision => {
                ("Normalized location error threshold", "Normalized precision")
            }
        }
    }

    fn x_max(&self) -> f64 {
        match self {
            MetricKey::Precision => (NBINS_CE - 1) as f64,
            _ => 1.0,
        }
    }

    fn legend_position(&self) -> SeriesLabelPosition {
        match self {
            MetricKey::Precision | MetricKey::NormPrecision => SeriesLabelPosition::LowerRight,
            _ => SeriesLabelPosition::LowerLeft,
        }
    }
}

/// Tracker names ordered descending by the named scalar score. Stable on
/// ties; undefined scores rank last.
pub fn rank<'a>(performance: &'a Performance, key: MetricKey) -> Vec<&'a str> {
    let mut scored = performance
        .iter()
        .map(|(name, perf)| (name, key.score(&perf.overall)))
        .collect::<Vec<_>>();
    scored.sort_by(|l, r| {
        let l = if l.1.is_nan() { f64::NEG_INFINITY } else { l.1 };
        let r = if r.1.is_nan() { f64::NEG_INFINITY } else { r.1 };
        r.partial_cmp(&l).unwrap()
    });
    scored.into_iter().map(|(name, _)| name).collect()
}

/// Renders the five comparison plots into the report directory and returns
/// the file paths.
pub fn plot_curves(
    performance: &Performance,
    report_dir: &Path,
    repetition: usize,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::with_capacity(MetricKey::ALL.len());
    for key in MetricKey::ALL {
        let file = report_dir.join(key.plot_file(repetition));
        render_curve(performance, key, &file)?;
        info!("Saving {} to {}", key.title(), file.display());
        files.push(file);
    }
    Ok(files)
}

fn chart_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow::anyhow!("plotting failed: {e}")
}

fn render_curve(performance: &Performance, key: MetricKey, file: &Path) -> Result<()> {
    let ranked = rank(performance, key);
    let thresholds = key.thresholds();
    let (x_desc, y_desc) = key.axis_labels();

    let root = BitMapBackend::new(file, (960, 720)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(key.title(), ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(42)
        .y_label_area_size(48)
        .build_cartesian_2d(0f64..key.x_max(), 0f64..1f64)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(chart_err)?;

    for (i, name) in ranked.iter().enumerate() {
        let tracker = performance
            .get(name)
            .expect("ranked names come from the performance map");
        let curve = key.curve(&tracker.overall);
        let score = key.score(&tracker.overall);
        let color = Palette99::pick(i).to_rgba();

        let points = thresholds
            .iter()
            .zip(curve)
            .filter(|(_, v)| v.is_finite())
            .map(|(t, v)| (*t, *v))
            .collect::<Vec<_>>();

        chart
            .draw_series(LineSeries::new(points, &color))
            .map_err(chart_err)?
            .label(format!("{name}: [{score:.3}]"))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], color));
    }

    chart
        .configure_series_labels()
        .position(key.legend_position())
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    Ok(())
}
