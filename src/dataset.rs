//! Sequence data model and the dataset capability consumed by the
//! experiment pipeline.
//!
//! A dataset yields, per sequence, the ordered frame files, an N x 4
//! ground-truth array (NaN rows mark undefined frames), a restart-flag array
//! for the R-OPE protocol, and an absent-flag array marking frames with no
//! valid target or in transition.

use crate::utils::bbox::BoundingBox;
use crate::Errors;
use anyhow::{Context, Result};
use log::warn;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Dataset subset selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Train,
    Val,
    Test,
}

impl Subset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subset::Train => "train",
            Subset::Val => "val",
            Subset::Test => "test",
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled video sequence. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub name: String,
    /// Ordered frame image files
    pub frames: Vec<PathBuf>,
    /// One (x, y, w, h) row per frame; NaN rows mark undefined frames
    pub groundtruth: Vec<[f32; 4]>,
    /// Frames where the R-OPE protocol forces a reinitialization
    pub restart_flags: Vec<bool>,
    /// Frames excluded from evaluation (no target or scene transition)
    pub absent: Vec<bool>,
}

impl Sequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Ground-truth box of a frame, `None` when the annotation is undefined.
    pub fn gt_box(&self, frame: usize) -> Option<BoundingBox> {
        let row = self.groundtruth.get(frame)?;
        if row.iter().any(|v| v.is_nan()) {
            None
        } else {
            Some(BoundingBox::from_row(*row))
        }
    }
}

/// Dataset capability: indexable by position or sequence name.
pub trait SequenceDataset {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered sequence names.
    fn seq_names(&self) -> &[String];

    fn get(&self, index: usize) -> Result<Sequence>;

    fn get_by_name(&self, name: &str) -> Result<Sequence> {
        let index = self
            .seq_names()
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Errors::MissingSequenceName(name.to_string()))?;
        self.get(index)
    }
}

/// On-disk dataset with the layout
/// `data/<subset>/frame_<seq>/*.{jpg,png}` for frames and
/// `attribute/{groundtruth,restart,absent}/<seq>.txt` for per-frame
/// annotations. The sequence list comes from `info.json` at the root,
/// mapping subset name to an ordered name array.
pub struct DiskDataset {
    root: PathBuf,
    subset: Subset,
    seq_names: Vec<String>,
}

impl DiskDataset {
    pub fn open(root: impl Into<PathBuf>, subset: Subset) -> Result<Self> {
        let root = root.into();
        let info_file = root.join("info.json");
        let info = fs::read_to_string(&info_file)
            .with_context(|| format!("reading dataset info {}", info_file.display()))?;
        let info: HashMap<String, Vec<String>> = serde_json::from_str(&info)
            .with_context(|| format!("parsing dataset info {}", info_file.display()))?;

        let seq_names = info
            .get(subset.as_str())
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            root,
            subset,
            seq_names,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subset(&self) -> Subset {
        self.subset
    }

    fn attribute_file(&self, kind: &str, seq_name: &str) -> PathBuf {
        self.root
            .join("attribute")
            .join(kind)
            .join(format!("{seq_name}.txt"))
    }

    fn list_frames(&self, seq_name: &str) -> Result<Vec<PathBuf>> {
        let dir = self
            .root
            .join("data")
            .join(self.subset.as_str())
            .join(format!("frame_{seq_name}"));
        let mut frames = fs::read_dir(&dir)
            .with_context(|| format!("listing frames in {}", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("jpg") | Some("jpeg") | Some("png")
                )
            })
            .collect::<Vec<_>>();
        frames.sort();
        Ok(frames)
    }
}

impl SequenceDataset for DiskDataset {
    fn len(&self) -> usize {
        self.seq_names.len()
    }

    fn seq_names(&self) -> &[String] {
        &self.seq_names
    }

    fn get(&self, index: usize) -> Result<Sequence> {
        let name = self
            .seq_names
            .get(index)
            .ok_or_else(|| Errors::MissingSequenceName(format!("#{index}")))?
            .clone();

        let frames = self.list_frames(&name)?;
        let groundtruth = read_box_rows(&self.attribute_file("groundtruth", &name))?;
        let restart_flags = read_flags(&self.attribute_file("restart", &name))?;

        let absent_file = self.attribute_file("absent", &name);
        let absent = if absent_file.is_file() {
            read_flags(&absent_file)?
        } else {
            warn!(
                "No absent attribute for sequence {name}, treating all frames as present"
            );
            vec![false; frames.len()]
        };

        Ok(Sequence {
            name,
            frames,
            groundtruth,
            restart_flags,
            absent,
        })
    }
}

/// Parses comma-delimited (x, y, w, h) rows. Undefined frames are NaN rows.
pub fn read_box_rows(path: &Path) -> Result<Vec<[f32; 4]>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("reading annotation {}", path.display()))?;
    let mut rows = Vec::new();
    for (lineno, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = line
            .split(',')
            .map(|f| f.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("{}:{}: malformed row", path.display(), lineno + 1))?;
        if fields.len() != 4 {
            anyhow::bail!(
                "{}:{}: expected 4 columns, got {}",
                path.display(),
                lineno + 1,
                fields.len()
            );
        }
        rows.push([fields[0], fields[1], fields[2], fields[3]]);
    }
    Ok(rows)
}

/// Parses one 0/1 flag per line.
pub fn read_flags(path: &Path) -> Result<Vec<bool>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("reading flags {}", path.display()))?;
    let mut flags = Vec::new();
    for (lineno, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = line
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .parse::<i64>()
            .with_context(|| format!("{}:{}: malformed flag", path.display(), lineno + 1))?;
        flags.push(value != 0);
    }
    Ok(flags)
}
