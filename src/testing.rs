//! Scripted trackers and synthetic on-disk datasets used by the test suite.

use crate::dataset::{Sequence, Subset};
use crate::protocol::Tracker;
use crate::utils::bbox::BoundingBox;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Tracker that replays a scripted box per frame, addressing the script by
/// the numeric frame file stem. With the ground truth as the script it is a
/// perfect tracker.
pub struct OracleTracker {
    name: String,
    script: Vec<[f32; 4]>,
}

impl OracleTracker {
    pub fn new(name: impl Into<String>, script: Vec<[f32; 4]>) -> Self {
        Self {
            name: name.into(),
            script,
        }
    }
}

impl Tracker for OracleTracker {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _frame: &Path, _bbox: BoundingBox) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, frame: &Path) -> Result<BoundingBox> {
        let stem = frame
            .file_stem()
            .and_then(|s| s.to_str())
            .context("frame file has no stem")?;
        let index = stem
            .parse::<usize>()
            .with_context(|| format!("frame stem {stem} is not an index"))?;
        let row = self
            .script
            .get(index)
            .with_context(|| format!("no scripted box for frame {index}"))?;
        Ok(BoundingBox::from_row(*row))
    }
}

/// Tracker that drifts away from the last box it was initialized with;
/// useful for asserting restart bookkeeping.
pub struct DriftTracker {
    name: String,
    current: BoundingBox,
    init_calls: usize,
}

impl DriftTracker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: BoundingBox::default(),
            init_calls: 0,
        }
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls
    }
}

impl Tracker for DriftTracker {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _frame: &Path, bbox: BoundingBox) -> Result<()> {
        self.current = bbox;
        self.init_calls += 1;
        Ok(())
    }

    fn update(&mut self, _frame: &Path) -> Result<BoundingBox> {
        self.current = BoundingBox::new(
            self.current.x() + 3.0,
            self.current.y() + 2.0,
            self.current.width(),
            self.current.height(),
        );
        Ok(self.current)
    }
}

/// In-memory sequence whose frame paths need not exist; enough for the
/// protocol runner, which never opens the frames itself.
pub fn memory_sequence(
    name: &str,
    groundtruth: Vec<[f32; 4]>,
    restart_flags: Vec<bool>,
    absent: Vec<bool>,
) -> Sequence {
    let frames = (0..groundtruth.len())
        .map(|i| PathBuf::from(format!("frames/{i:06}.jpg")))
        .collect();
    Sequence {
        name: name.to_string(),
        frames,
        groundtruth,
        restart_flags,
        absent,
    }
}

/// Per-sequence description for [`write_synthetic_dataset`].
pub struct SyntheticSequence {
    pub name: String,
    pub groundtruth: Vec<[f32; 4]>,
    pub restart_flags: Vec<bool>,
    pub absent: Vec<bool>,
}

/// Writes a complete on-disk dataset with real PNG frames of the given
/// resolution, in the layout `DiskDataset` expects.
pub fn write_synthetic_dataset(
    root: &Path,
    subset: Subset,
    sequences: &[SyntheticSequence],
    resolution: (u32, u32),
) -> Result<()> {
    let names = sequences
        .iter()
        .map(|s| s.name.clone())
        .collect::<Vec<_>>();
    let info: HashMap<&str, Vec<String>> = HashMap::from([(subset.as_str(), names)]);
    fs::create_dir_all(root)?;
    fs::write(root.join("info.json"), serde_json::to_string_pretty(&info)?)?;

    for seq in sequences {
        let frame_dir = root
            .join("data")
            .join(subset.as_str())
            .join(format!("frame_{}", seq.name));
        fs::create_dir_all(&frame_dir)?;
        let frame = image::RgbImage::new(resolution.0, resolution.1);
        for i in 0..seq.groundtruth.len() {
            frame
                .save(frame_dir.join(format!("{i:06}.png")))
                .context("writing synthetic frame")?;
        }

        let attribute_dir = root.join("attribute");
        for kind in ["groundtruth", "restart", "absent"] {
            fs::create_dir_all(attribute_dir.join(kind))?;
        }

        let mut rows = String::new();
        for row in &seq.groundtruth {
            writeln!(rows, "{},{},{},{}", row[0], row[1], row[2], row[3])?;
        }
        fs::write(
            attribute_dir.join("groundtruth").join(format!("{}.txt", seq.name)),
            rows,
        )?;

        write_flags(
            &attribute_dir.join("restart").join(format!("{}.txt", seq.name)),
            &seq.restart_flags,
        )?;
        write_flags(
            &attribute_dir.join("absent").join(format!("{}.txt", seq.name)),
            &seq.absent,
        )?;
    }

    Ok(())
}

fn write_flags(path: &Path, flags: &[bool]) -> Result<()> {
    let mut rows = String::new();
    for flag in flags {
        writeln!(rows, "{}", u8::from(*flag))?;
    }
    fs::write(path, rows)?;
    Ok(())
}
