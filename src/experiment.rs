//! Experiment pipeline: runs trackers over a dataset subset, aggregates
//! reports and renders comparison plots.
//!
//! Sequences are processed one at a time and frames one at a time; the
//! tracker is an opaque blocking call. Resumption relies entirely on the
//! idempotent-skip checks of the result store and the report cache, so a
//! single process per save directory is a precondition.

use crate::dataset::{SequenceDataset, Subset};
use crate::presenter;
use crate::protocol::{track_sequence, FrameObserver, Protocol, Tracker};
use crate::report::{Performance, ReportAggregator};
use crate::store::ResultStore;
use anyhow::{Context, Result};
use itertools::Itertools;
use log::{info, warn};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

pub struct Experiment<D: SequenceDataset> {
    dataset: D,
    store: ResultStore,
    save_dir: PathBuf,
    subset: Subset,
    repetition: usize,
}

impl<D: SequenceDataset> Experiment<D> {
    pub fn new(
        dataset: D,
        save_dir: impl Into<PathBuf>,
        subset: Subset,
        repetition: usize,
    ) -> Result<Self> {
        let save_dir = save_dir.into();
        fs::create_dir_all(&save_dir)
            .with_context(|| format!("creating save dir {}", save_dir.display()))?;
        let store = ResultStore::new(&save_dir, subset);
        Ok(Self {
            dataset,
            store,
            save_dir,
            subset,
            repetition,
        })
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    /// Runs the tracker over every sequence of the subset under the selected
    /// protocol. Sequences with an existing record are skipped.
    pub fn run(
        &self,
        tracker: &mut dyn Tracker,
        protocol: Protocol,
        observer: &mut dyn FrameObserver,
    ) -> Result<()> {
        info!("Running tracker {} on {} sequences", tracker.name(), self.dataset.len());
        let record = protocol.record_name(tracker.name());

        for s in 0..self.dataset.len() {
            let seq = self.dataset.get(s)?;
            info!(
                "--Sequence {}/{}: {} (repetition {})",
                s + 1,
                self.dataset.len(),
                seq.name,
                self.repetition
            );

            if self.store.exists(&record, &seq.name, self.repetition) {
                info!("  Found results, skipping {}", seq.name);
                continue;
            }

            let result = track_sequence(tracker, &seq, protocol, observer)?;
            self.store
                .write_record(&record, &seq.name, self.repetition, &result, protocol)?;
            info!(
                "  Results recorded at {}",
                self.store
                    .record_file(&record, &seq.name, self.repetition)
                    .display()
            );
        }

        Ok(())
    }

    /// Aggregates the named trackers into a combined report, persists it and
    /// renders the comparison plots.
    ///
    /// On the test subset no local ground truth exists for evaluation;
    /// instead a submission archive is packaged per tracker and `None` is
    /// returned.
    pub fn report(&self, tracker_names: &[&str]) -> Result<Option<Performance>> {
        assert!(!tracker_names.is_empty());

        if self.subset == Subset::Test {
            for name in tracker_names {
                let archive = self.package_submission(name)?;
                info!("Records saved at {}", archive.display());
            }
            return Ok(None);
        }

        let aggregator = ReportAggregator::new(
            &self.dataset,
            &self.store,
            &self.save_dir,
            self.subset,
            self.repetition,
        );
        let (performance, report_dir) = aggregator.report(tracker_names)?;
        if let Err(e) = presenter::plot_curves(&performance, &report_dir, self.repetition) {
            warn!("Comparison plots were not rendered: {e:#}");
        }
        Ok(Some(performance))
    }

    /// Copies this repetition's result and time files into the fixed
    /// submission layout and archives it.
    fn package_submission(&self, tracker_name: &str) -> Result<PathBuf> {
        let submission_dir = self
            .store
            .result_dir()
            .join(tracker_name)
            .join("submission");
        let result_out = submission_dir.join("result");
        let time_out = submission_dir.join("time");
        fs::create_dir_all(&result_out)?;
        fs::create_dir_all(&time_out)?;

        let suffix = format!("_{}.txt", self.repetition);
        let result_in = self
            .store
            .result_dir()
            .join(tracker_name)
            .join(self.subset.as_str());
        let time_in = self
            .store
            .time_dir()
            .join(tracker_name)
            .join(self.subset.as_str());

        copy_repetition_files(&result_in, &result_out, &suffix)?;
        copy_repetition_files(&time_in, &time_out, &suffix)?;

        let archive = submission_dir.with_extension("zip");
        zip_directory(&submission_dir, &archive)?;
        Ok(archive)
    }
}

/// Copies files ending in the repetition suffix, dropping the suffix from
/// the destination name.
fn copy_repetition_files(from: &Path, to: &Path, suffix: &str) -> Result<()> {
    let entries = fs::read_dir(from)
        .with_context(|| format!("listing {}", from.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .sorted();

    for path in entries {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if let Some(stem) = file_name.strip_suffix(suffix) {
            let dst = to.join(format!("{stem}.txt"));
            info!("Copy result to {}", dst.display());
            fs::copy(&path, &dst)
                .with_context(|| format!("copying {} to {}", path.display(), dst.display()))?;
        }
    }
    Ok(())
}

/// Archives a directory tree, entry names relative to the directory.
fn zip_directory(dir: &Path, archive: &Path) -> Result<()> {
    let file = fs::File::create(archive)
        .with_context(|| format!("creating archive {}", archive.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut stack = vec![dir.to_path_buf()];
    let mut files = Vec::new();
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();

    for path in files {
        let name = path
            .strip_prefix(dir)
            .expect("walk stays under the archived directory")
            .to_string_lossy()
            .replace('\\', "/");
        writer.start_file(name, options)?;
        let body = fs::read(&path)?;
        writer.write_all(&body)?;
    }
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DiskDataset;
    use crate::protocol::NoopObserver;
    use crate::testing::{write_synthetic_dataset, OracleTracker, SyntheticSequence};

    fn synthetic_rows(n: usize) -> Vec<[f32; 4]> {
        (0..n)
            .map(|i| [5.0 + i as f32, 6.0, 12.0, 10.0])
            .collect()
    }

    #[test]
    fn test_subset_report_packages_submission() {
        let data_dir = tempfile::tempdir().unwrap();
        let save_dir = tempfile::tempdir().unwrap();

        let seq = SyntheticSequence {
            name: "0001".to_string(),
            groundtruth: synthetic_rows(5),
            restart_flags: vec![false; 5],
            absent: vec![false; 5],
        };
        write_synthetic_dataset(data_dir.path(), Subset::Test, &[seq], (64, 48)).unwrap();

        let dataset = DiskDataset::open(data_dir.path(), Subset::Test).unwrap();
        let experiment = Experiment::new(dataset, save_dir.path(), Subset::Test, 1).unwrap();

        let mut tracker = OracleTracker::new("oracle", synthetic_rows(5));
        experiment
            .run(&mut tracker, Protocol::Ope, &mut NoopObserver)
            .unwrap();

        let performance = experiment.report(&["oracle"]).unwrap();
        assert!(performance.is_none());

        let submission = save_dir
            .path()
            .join("results")
            .join("oracle")
            .join("submission");
        assert!(submission.join("result").join("oracle_0001.txt").is_file());
        assert!(submission.join("time").join("oracle_0001.txt").is_file());
        assert!(submission.with_extension("zip").is_file());
    }
}
