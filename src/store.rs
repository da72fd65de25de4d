//! Persistent per-(record, sequence, repetition) tracking results.
//!
//! Boxes are integer-formatted comma-delimited rows, times are 8-decimal
//! rows, restart positions one integer per line. A record that already
//! exists on disk is trusted and the run skipped; there is no partial-write
//! recovery, so a crash mid-write must be cleaned up by hand before a re-run.

use crate::dataset::Subset;
use crate::protocol::{Protocol, TrackResult};
use crate::utils::bbox::BoundingBox;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ResultStore {
    result_dir: PathBuf,
    time_dir: PathBuf,
    subset: Subset,
}

impl ResultStore {
    pub fn new(save_dir: &Path, subset: Subset) -> Self {
        Self {
            result_dir: save_dir.join("results"),
            time_dir: save_dir.join("time"),
            subset,
        }
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    pub fn time_dir(&self) -> &Path {
        &self.time_dir
    }

    pub fn record_file(&self, record: &str, seq_name: &str, repetition: usize) -> PathBuf {
        self.result_dir
            .join(record)
            .join(self.subset.as_str())
            .join(format!("{record}_{seq_name}_{repetition}.txt"))
    }

    pub fn time_file(&self, record: &str, seq_name: &str, repetition: usize) -> PathBuf {
        self.time_dir
            .join(record)
            .join(self.subset.as_str())
            .join(format!("{record}_{seq_name}_{repetition}.txt"))
    }

    pub fn init_positions_file(
        &self,
        record: &str,
        seq_name: &str,
        repetition: usize,
    ) -> PathBuf {
        self.result_dir
            .join(record)
            .join(self.subset.as_str())
            .join(format!("init_{record}_{seq_name}_{repetition}.txt"))
    }

    /// Idempotent-skip check: a prior complete record is trusted without
    /// validation.
    pub fn exists(&self, record: &str, seq_name: &str, repetition: usize) -> bool {
        self.record_file(record, seq_name, repetition).is_file()
    }

    pub fn write_record(
        &self,
        record: &str,
        seq_name: &str,
        repetition: usize,
        result: &TrackResult,
        protocol: Protocol,
    ) -> Result<()> {
        let record_file = self.record_file(record, seq_name, repetition);
        let time_file = self.time_file(record, seq_name, repetition);
        create_parent(&record_file)?;
        create_parent(&time_file)?;

        let mut rows = String::new();
        for bbox in &result.boxes {
            let [x, y, w, h] = bbox.as_row();
            writeln!(rows, "{},{},{},{}", x as i64, y as i64, w as i64, h as i64)?;
        }
        fs::write(&record_file, rows)
            .with_context(|| format!("writing record {}", record_file.display()))?;

        let mut rows = String::new();
        for t in &result.times {
            writeln!(rows, "{t:.8}")?;
        }
        fs::write(&time_file, rows)
            .with_context(|| format!("writing times {}", time_file.display()))?;

        if protocol == Protocol::RestartOpe {
            let init_file = self.init_positions_file(record, seq_name, repetition);
            let mut rows = String::new();
            for position in &result.init_positions {
                writeln!(rows, "{position}")?;
            }
            fs::write(&init_file, rows)
                .with_context(|| format!("writing init positions {}", init_file.display()))?;
        }

        Ok(())
    }

    pub fn read_boxes(
        &self,
        record: &str,
        seq_name: &str,
        repetition: usize,
    ) -> Result<Vec<BoundingBox>> {
        let path = self.record_file(record, seq_name, repetition);
        let rows = crate::dataset::read_box_rows(&path)?;
        Ok(rows.into_iter().map(BoundingBox::from_row).collect())
    }

    pub fn read_times(&self, record: &str, seq_name: &str, repetition: usize) -> Result<Vec<f64>> {
        let path = self.time_file(record, seq_name, repetition);
        let body = fs::read_to_string(&path)
            .with_context(|| format!("reading times {}", path.display()))?;
        body.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| {
                l.parse::<f64>()
                    .with_context(|| format!("malformed time row in {}", path.display()))
            })
            .collect()
    }

    pub fn read_init_positions(
        &self,
        record: &str,
        seq_name: &str,
        repetition: usize,
    ) -> Result<Vec<usize>> {
        let path = self.init_positions_file(record, seq_name, repetition);
        let body = fs::read_to_string(&path)
            .with_context(|| format!("reading init positions {}", path.display()))?;
        body.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| {
                l.parse::<usize>()
                    .with_context(|| format!("malformed init position in {}", path.display()))
            })
            .collect()
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EPS;

    fn sample_result() -> TrackResult {
        TrackResult {
            boxes: vec![
                BoundingBox::new(10.0, 20.0, 30.0, 40.0),
                BoundingBox::new(11.7, 21.2, 30.0, 40.0),
            ],
            times: vec![0.5, 0.0312549],
            init_positions: vec![5, 12],
        }
    }

    #[test]
    fn roundtrip_with_integer_formatting() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path(), Subset::Val);
        assert!(!store.exists("trk", "0001", 1));

        store
            .write_record("trk", "0001", 1, &sample_result(), Protocol::RestartOpe)
            .unwrap();
        assert!(store.exists("trk", "0001", 1));

        let boxes = store.read_boxes("trk", "0001", 1).unwrap();
        assert_eq!(boxes.len(), 2);
        // fractional coordinates are truncated on write
        assert!(boxes[1].almost_same(&BoundingBox::new(11.0, 21.0, 30.0, 40.0), EPS));

        let times = store.read_times("trk", "0001", 1).unwrap();
        assert!((times[0] - 0.5).abs() < 1e-9);
        assert!((times[1] - 0.0312549).abs() < 1e-9);

        let init = store.read_init_positions("trk", "0001", 1).unwrap();
        assert_eq!(init, vec![5, 12]);
    }

    #[test]
    fn ope_records_have_no_init_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path(), Subset::Val);
        store
            .write_record("trk", "0001", 1, &sample_result(), Protocol::Ope)
            .unwrap();
        assert!(!store.init_positions_file("trk", "0001", 1).is_file());
    }

    #[test]
    fn time_rows_are_8_decimal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path(), Subset::Val);
        store
            .write_record("trk", "0001", 1, &sample_result(), Protocol::Ope)
            .unwrap();
        let body = fs::read_to_string(store.time_file("trk", "0001", 1)).unwrap();
        assert_eq!(body.lines().next().unwrap(), "0.50000000");
    }
}
