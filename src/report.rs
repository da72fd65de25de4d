//! Report aggregation: loads per-sequence tracking records, computes curves
//! and scores, averages across sequences and caches per-tracker reports.
//!
//! A cached report is loaded verbatim when present, the same
//! idempotent-by-existence policy the result store uses.

use crate::curves::{
    calc_curves, norm_prec_score, precision_score, success_rate, success_score, SequenceCurves,
};
use crate::dataset::{Sequence, SequenceDataset, Subset};
use crate::metrics;
use crate::store::ResultStore;
use crate::utils::bbox::BoundingBox;
use crate::utils::stats::{column_nan_mean, mean_positive, nan_mean};
use crate::Errors;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::ser::SerializeMap;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Serde adapters mapping non-finite values to JSON null and back to NaN.
/// Sequences with no valid frames produce NaN scores, which plain JSON
/// cannot carry.
pub mod json_nan {
    pub mod scalar {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
            if v.is_finite() {
                s.serialize_f64(*v)
            } else {
                s.serialize_none()
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
            Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
        }
    }

    pub mod curve {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
            s.collect_seq(
                v.iter()
                    .map(|x| if x.is_finite() { Some(*x) } else { None }),
            )
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
            Ok(Vec::<Option<f64>>::deserialize(d)?
                .into_iter()
                .map(|x| x.unwrap_or(f64::NAN))
                .collect())
        }
    }
}

/// Per-sequence scalar scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceScores {
    #[serde(with = "json_nan::scalar")]
    pub success_score_iou: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_score_diou: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_score_giou: f64,
    #[serde(with = "json_nan::scalar")]
    pub precision_score: f64,
    #[serde(with = "json_nan::scalar")]
    pub norm_prec_score: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_rate_iou: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_rate_diou: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_rate_giou: f64,
    /// Average frames per second, -1 when no timing is available
    pub speed_fps: f64,
}

/// Cross-sequence curves and scores of one tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallPerformance {
    #[serde(with = "json_nan::curve")]
    pub success_curve_iou: Vec<f64>,
    #[serde(with = "json_nan::curve")]
    pub success_curve_diou: Vec<f64>,
    #[serde(with = "json_nan::curve")]
    pub success_curve_giou: Vec<f64>,
    #[serde(with = "json_nan::curve")]
    pub precision_curve: Vec<f64>,
    #[serde(with = "json_nan::curve")]
    pub normalized_precision_curve: Vec<f64>,
    #[serde(with = "json_nan::scalar")]
    pub success_score_iou: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_score_diou: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_score_giou: f64,
    #[serde(with = "json_nan::scalar")]
    pub precision_score: f64,
    #[serde(with = "json_nan::scalar")]
    pub norm_prec_score: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_rate_iou: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_rate_diou: f64,
    #[serde(with = "json_nan::scalar")]
    pub success_rate_giou: f64,
    pub speed_fps: f64,
}

/// Report of one tracker on one subset and repetition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerPerformance {
    pub overall: OverallPerformance,
    pub seq_wise: BTreeMap<String, SequenceScores>,
}

/// Combined multi-tracker report. Keeps tracker insertion order, which is the
/// tie-break order for ranking.
#[derive(Debug, Clone, Default)]
pub struct Performance {
    entries: Vec<(String, TrackerPerformance)>,
}

impl Performance {
    pub fn insert(&mut self, name: impl Into<String>, perf: TrackerPerformance) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = perf;
        } else {
            self.entries.push((name, perf));
        }
    }

    pub fn get(&self, name: &str) -> Option<&TrackerPerformance> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrackerPerformance)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl serde::Serialize for Performance {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, perf) in &self.entries {
            map.serialize_entry(name, perf)?;
        }
        map.end()
    }
}

impl<'de> serde::Deserialize<'de> for Performance {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> serde::de::Visitor<'de> for MapVisitor {
            type Value = Performance;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of tracker name to performance")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Performance, A::Error> {
                let mut perf = Performance::default();
                while let Some((name, entry)) =
                    access.next_entry::<String, TrackerPerformance>()?
                {
                    perf.insert(name, entry);
                }
                Ok(perf)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

/// Aggregates persisted tracking records of one subset and repetition into
/// per-tracker reports.
pub struct ReportAggregator<'a, D: SequenceDataset> {
    dataset: &'a D,
    store: &'a ResultStore,
    subset: Subset,
    repetition: usize,
    analysis_dir: PathBuf,
    report_dir: PathBuf,
}

impl<'a, D: SequenceDataset> ReportAggregator<'a, D> {
    pub fn new(
        dataset: &'a D,
        store: &'a ResultStore,
        save_dir: &Path,
        subset: Subset,
        repetition: usize,
    ) -> Self {
        Self {
            dataset,
            store,
            subset,
            repetition,
            analysis_dir: save_dir.join("analysis"),
            report_dir: save_dir.join("reports"),
        }
    }

    /// Directory the combined report and the plots go to.
    pub fn report_dir(&self, first_tracker: &str) -> PathBuf {
        self.report_dir
            .join(self.subset.as_str())
            .join(first_tracker)
    }

    fn cache_file(&self, tracker_name: &str) -> PathBuf {
        self.analysis_dir.join(self.subset.as_str()).join(format!(
            "{}_{}_{}.json",
            tracker_name, self.subset, self.repetition
        ))
    }

    /// Evaluates all trackers, persists the combined report and returns it
    /// together with the report directory.
    pub fn report(&self, tracker_names: &[&str]) -> Result<(Performance, PathBuf)> {
        assert!(!tracker_names.is_empty());

        let mut performance = Performance::default();
        for name in tracker_names {
            performance.insert(*name, self.evaluate_tracker(name)?);
        }

        let report_dir = self.report_dir(tracker_names[0]);
        fs::create_dir_all(&report_dir)
            .with_context(|| format!("creating report dir {}", report_dir.display()))?;
        let report_file = report_dir.join(format!("performance_{}.json", self.repetition));
        fs::write(&report_file, serde_json::to_string_pretty(&performance)?)
            .with_context(|| format!("writing report {}", report_file.display()))?;
        info!("Report saved at {}", report_file.display());

        Ok((performance, report_dir))
    }

    /// Evaluates one tracker over the whole subset, loading the cached
    /// report instead when one exists.
    pub fn evaluate_tracker(&self, tracker_name: &str) -> Result<TrackerPerformance> {
        let cache_file = self.cache_file(tracker_name);
        if cache_file.is_file() {
            info!(
                "Existing report for {tracker_name}, loading {}",
                cache_file.display()
            );
            let body = fs::read_to_string(&cache_file)
                .with_context(|| format!("reading cached report {}", cache_file.display()))?;
            return serde_json::from_str(&body)
                .with_context(|| format!("parsing cached report {}", cache_file.display()));
        }

        let mut succ_rows = Vec::new();
        let mut succ_drows = Vec::new();
        let mut succ_grows = Vec::new();
        let mut prec_rows = Vec::new();
        let mut norm_prec_rows = Vec::new();
        let mut norm_scores = Vec::new();
        let mut speeds = Vec::new();
        let mut seq_wise = BTreeMap::new();

        for s in 0..self.dataset.len() {
            let seq = self.dataset.get(s)?;
            info!(
                "Repetition {}: evaluating tracker {tracker_name} on sequence {}",
                self.repetition, seq.name
            );

            let (curves, scores) = self.evaluate_sequence(tracker_name, &seq)?;
            succ_rows.push(curves.succ_iou);
            succ_drows.push(curves.succ_diou);
            succ_grows.push(curves.succ_giou);
            prec_rows.push(curves.prec);
            norm_prec_rows.push(curves.norm_prec);
            norm_scores.push(scores.norm_prec_score);
            speeds.push(scores.speed_fps);
            seq_wise.insert(seq.name.clone(), scores);
        }

        let succ_curve = column_nan_mean(&succ_rows);
        let succ_dcurve = column_nan_mean(&succ_drows);
        let succ_gcurve = column_nan_mean(&succ_grows);
        let prec_curve = column_nan_mean(&prec_rows);
        let norm_prec_curve = column_nan_mean(&norm_prec_rows);

        let norm_defined = norm_scores
            .iter()
            .filter(|v| v.is_finite() && **v != 0.0)
            .copied()
            .collect::<Vec<_>>();

        let overall = OverallPerformance {
            success_score_iou: success_score(&succ_curve),
            success_score_diou: success_score(&succ_dcurve),
            success_score_giou: success_score(&succ_gcurve),
            precision_score: precision_score(&prec_curve),
            norm_prec_score: nan_mean(&norm_defined),
            success_rate_iou: success_rate(&succ_curve),
            success_rate_diou: success_rate(&succ_dcurve),
            success_rate_giou: success_rate(&succ_gcurve),
            speed_fps: mean_positive(&speeds).unwrap_or(-1.0),
            success_curve_iou: succ_curve,
            success_curve_diou: succ_dcurve,
            success_curve_giou: succ_gcurve,
            precision_curve: prec_curve,
            normalized_precision_curve: norm_prec_curve,
        };

        let performance = TrackerPerformance { overall, seq_wise };

        if let Some(parent) = cache_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating analysis dir {}", parent.display()))?;
        }
        fs::write(&cache_file, serde_json::to_string_pretty(&performance)?)
            .with_context(|| format!("writing cached report {}", cache_file.display()))?;

        Ok(performance)
    }

    /// Evaluates one tracker on one sequence: clamps the predictions to the
    /// frame, drops absent and unannotated frames, computes curves and scores.
    fn evaluate_sequence(
        &self,
        tracker_name: &str,
        seq: &Sequence,
    ) -> Result<(SequenceCurves, SequenceScores)> {
        let first_frame = seq
            .frames
            .first()
            .ok_or_else(|| Errors::NoValidAnnotations(seq.name.clone()))?;
        let bound = image::image_dimensions(first_frame)
            .with_context(|| format!("probing resolution of {}", first_frame.display()))?;

        let boxes = self
            .store
            .read_boxes(tracker_name, &seq.name, self.repetition)?
            .into_iter()
            .map(|b| b.clip(bound))
            .collect::<Vec<_>>();

        // A mismatch indicates a stale or corrupted record; never truncate.
        if boxes.len() != seq.groundtruth.len() {
            return Err(Errors::ShapeMismatch(boxes.len(), seq.groundtruth.len()).into());
        }

        let mut pred = Vec::new();
        let mut gt = Vec::new();
        for (i, row) in seq.groundtruth.iter().enumerate() {
            let absent = seq.absent.get(i).copied().unwrap_or(false);
            if absent || row.iter().any(|v| v.is_nan()) {
                continue;
            }
            pred.push(boxes[i]);
            gt.push(BoundingBox::from_row(*row));
        }

        let speed = self.sequence_speed(tracker_name, &seq.name);

        if pred.is_empty() {
            warn!("No valid annotations in sequence {}", seq.name);
            let curves = SequenceCurves::undefined();
            let scores = scores_from(&curves, f64::NAN, speed);
            return Ok((curves, scores));
        }

        let ious = metrics::iou(&pred, &gt)?;
        let dious = metrics::diou(&pred, &gt)?;
        let gious = metrics::giou(&pred, &gt)?;
        let center_errors = metrics::center_error(&pred, &gt)?;
        let (norm_center_errors, flags) = metrics::normalized_center_error(&pred, &gt, bound)?;

        let curves = calc_curves(&ious, &dious, &gious, &center_errors, &norm_center_errors);
        let scores = scores_from(&curves, norm_prec_score(&flags), speed);
        Ok((curves, scores))
    }

    /// NaN-aware mean of 1/time over frames with strictly positive recorded
    /// time; -1 when no such frame or no time record exists.
    fn sequence_speed(&self, tracker_name: &str, seq_name: &str) -> f64 {
        match self.store.read_times(tracker_name, seq_name, self.repetition) {
            Ok(times) => {
                let inverted = times
                    .iter()
                    .filter(|t| **t > 0.0)
                    .map(|t| 1.0 / *t)
                    .collect::<Vec<_>>();
                if inverted.is_empty() {
                    -1.0
                } else {
                    nan_mean(&inverted)
                }
            }
            Err(_) => {
                warn!("{}", Errors::MissingTimeFile(seq_name.to_string()));
                -1.0
            }
        }
    }
}

fn scores_from(curves: &SequenceCurves, norm_prec: f64, speed: f64) -> SequenceScores {
    SequenceScores {
        success_score_iou: success_score(&curves.succ_iou),
        success_score_diou: success_score(&curves.succ_diou),
        success_score_giou: success_score(&curves.succ_giou),
        precision_score: precision_score(&curves.prec),
        norm_prec_score: norm_prec,
        success_rate_iou: success_rate(&curves.succ_iou),
        success_rate_diou: success_rate(&curves.succ_diou),
        success_rate_giou: success_rate(&curves.succ_giou),
        speed_fps: speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::{NBINS_CE, NBINS_IOU};

    fn dummy_scores(v: f64) -> SequenceScores {
        SequenceScores {
            success_score_iou: v,
            success_score_diou: v,
            success_score_giou: v,
            precision_score: v,
            norm_prec_score: v,
            success_rate_iou: v,
            success_rate_diou: v,
            success_rate_giou: v,
            speed_fps: 30.0,
        }
    }

    fn dummy_overall(v: f64) -> OverallPerformance {
        OverallPerformance {
            success_curve_iou: vec![v; NBINS_IOU],
            success_curve_diou: vec![v; NBINS_IOU],
            success_curve_giou: vec![v; NBINS_IOU],
            precision_curve: vec![v; NBINS_CE],
            normalized_precision_curve: vec![v; NBINS_CE],
            success_score_iou: v,
            success_score_diou: v,
            success_score_giou: v,
            precision_score: v,
            norm_prec_score: v,
            success_rate_iou: v,
            success_rate_diou: v,
            success_rate_giou: v,
            speed_fps: 30.0,
        }
    }

    #[test]
    fn nan_scores_roundtrip_through_json_null() {
        let perf = TrackerPerformance {
            overall: dummy_overall(f64::NAN),
            seq_wise: BTreeMap::from([("0001".to_string(), dummy_scores(f64::NAN))]),
        };
        let body = serde_json::to_string(&perf).unwrap();
        assert!(body.contains("null"));

        let parsed: TrackerPerformance = serde_json::from_str(&body).unwrap();
        assert!(parsed.overall.success_score_iou.is_nan());
        assert!(parsed.overall.success_curve_iou.iter().all(|v| v.is_nan()));
        assert!(parsed.seq_wise["0001"].precision_score.is_nan());
    }

    #[test]
    fn performance_keeps_insertion_order() {
        let mut perf = Performance::default();
        perf.insert("zeta", TrackerPerformance {
            overall: dummy_overall(0.5),
            seq_wise: BTreeMap::new(),
        });
        perf.insert("alpha", TrackerPerformance {
            overall: dummy_overall(0.5),
            seq_wise: BTreeMap::new(),
        });

        let names = perf.names().collect::<Vec<_>>();
        assert_eq!(names, vec!["zeta", "alpha"]);

        let body = serde_json::to_string(&perf).unwrap();
        assert!(body.find("zeta").unwrap() < body.find("alpha").unwrap());

        let parsed: Performance = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.names().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn cached_scores_reload_bit_identical() {
        // scores like 100/101 have no short decimal form; a lossy float
        // parser would break the load-the-cache-verbatim policy
        let perf = TrackerPerformance {
            overall: dummy_overall(100.0 / 101.0),
            seq_wise: BTreeMap::from([("0001".to_string(), dummy_scores(1.0 / 3.0))]),
        };
        let body = serde_json::to_string(&perf).unwrap();
        let parsed: TrackerPerformance = serde_json::from_str(&body).unwrap();

        assert_eq!(
            parsed.overall.success_score_iou.to_bits(),
            perf.overall.success_score_iou.to_bits()
        );
        assert_eq!(
            parsed.seq_wise["0001"].precision_score.to_bits(),
            perf.seq_wise["0001"].precision_score.to_bits()
        );
        assert_eq!(body, serde_json::to_string(&parsed).unwrap());
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let mut perf = Performance::default();
        perf.insert("a", TrackerPerformance {
            overall: dummy_overall(0.1),
            seq_wise: BTreeMap::new(),
        });
        perf.insert("a", TrackerPerformance {
            overall: dummy_overall(0.9),
            seq_wise: BTreeMap::new(),
        });
        assert_eq!(perf.len(), 1);
        assert!((perf.get("a").unwrap().overall.success_score_iou - 0.9).abs() < 1e-9);
    }
}
