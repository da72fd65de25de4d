//! Tracking protocols and the per-sequence protocol runner.
//!
//! OPE runs the tracker continuously from the first frame. R-OPE additionally
//! reinitializes the tracker with the ground-truth box at scheduled frames,
//! simulating a human correction, and records where that happened so the
//! degradation after recovery can be measured.

use crate::dataset::Sequence;
use crate::utils::bbox::BoundingBox;
use crate::Errors;
use anyhow::Result;
use log::warn;
use std::path::Path;
use std::time::Instant;

/// Evaluation protocol selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// One-pass evaluation, no correction
    Ope,
    /// Restart-OPE: reinitialize with ground truth at flagged frames
    RestartOpe,
}

impl Protocol {
    /// Name under which results of a tracker are recorded.
    pub fn record_name(&self, tracker_name: &str) -> String {
        match self {
            Protocol::Ope => tracker_name.to_string(),
            Protocol::RestartOpe => format!("{tracker_name}_restart"),
        }
    }
}

/// Tracker capability consumed by the runner. The implementation is presumed
/// to run on its own compute resource; calls block until done. A tracker must
/// tolerate being re-initialized mid-sequence.
pub trait Tracker {
    fn name(&self) -> &str;

    fn init(&mut self, frame: &Path, bbox: BoundingBox) -> Result<()>;

    fn update(&mut self, frame: &Path) -> Result<BoundingBox>;
}

/// Per-frame pass-through for visualization or image saving. Failures are
/// logged and never abort the run.
pub trait FrameObserver {
    fn observe(
        &mut self,
        seq_name: &str,
        frame_index: usize,
        frame: &Path,
        bbox: &BoundingBox,
    ) -> Result<()>;
}

/// Observer that does nothing.
pub struct NoopObserver;

impl FrameObserver for NoopObserver {
    fn observe(&mut self, _: &str, _: usize, _: &Path, _: &BoundingBox) -> Result<()> {
        Ok(())
    }
}

/// Result of running one tracker over one sequence.
#[derive(Debug, Clone, Default)]
pub struct TrackResult {
    /// One predicted box per frame; the first frame is ground truth by
    /// convention
    pub boxes: Vec<BoundingBox>,
    /// Per-frame elapsed seconds; frames where the tracker was (re)initialized
    /// record the initialization call
    pub times: Vec<f64>,
    /// Frame indices where reinitialization occurred (R-OPE only)
    pub init_positions: Vec<usize>,
}

/// Drives a tracker over one sequence under the selected protocol.
pub fn track_sequence(
    tracker: &mut dyn Tracker,
    seq: &Sequence,
    protocol: Protocol,
    observer: &mut dyn FrameObserver,
) -> Result<TrackResult> {
    let first_gt = seq
        .gt_box(0)
        .ok_or_else(|| Errors::NoValidAnnotations(seq.name.clone()))?;

    let mut result = TrackResult::default();

    let started = Instant::now();
    tracker.init(&seq.frames[0], first_gt)?;
    result.boxes.push(first_gt);
    result.times.push(started.elapsed().as_secs_f64());
    notify_observer(observer, seq, 0, &first_gt);

    for frame in 1..seq.len() {
        let started = Instant::now();
        let mut bbox = tracker.update(&seq.frames[frame])?;
        let mut elapsed = started.elapsed().as_secs_f64();

        if protocol == Protocol::RestartOpe && seq.restart_flags.get(frame) == Some(&true) {
            match seq.gt_box(frame) {
                Some(gt) => {
                    let started = Instant::now();
                    tracker.init(&seq.frames[frame], gt)?;
                    elapsed = started.elapsed().as_secs_f64();
                    bbox = gt;
                    result.init_positions.push(frame);
                }
                None => {
                    warn!(
                        "Restart scheduled at frame {frame} of {} has no annotation, skipping",
                        seq.name
                    );
                }
            }
        }

        result.boxes.push(bbox);
        result.times.push(elapsed);
        notify_observer(observer, seq, frame, &bbox);
    }

    Ok(result)
}

fn notify_observer(
    observer: &mut dyn FrameObserver,
    seq: &Sequence,
    frame: usize,
    bbox: &BoundingBox,
) {
    if let Err(e) = observer.observe(&seq.name, frame, &seq.frames[frame], bbox) {
        warn!("Observer failed on frame {frame} of {}: {e:#}", seq.name);
    }
}
