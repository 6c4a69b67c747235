use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::descriptor::{Descriptor, DescriptorProvider};
use crate::detection::Detection;
use crate::error::{Result, TrackerError};

/// Produces frames and the raw circles found in them. Detections carry no identity and no
/// correspondence to earlier frames.
pub trait DetectionSource {
    type Frame;

    /// `Ok(None)` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Self::Frame>>;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Vec<Detection>>;

    /// Number of frames, when known up front
    fn length(&self) -> Option<u64> {
        None
    }
}

/// A detection as stored in replay files: sub-pixel circle plus its precomputed descriptor.
#[derive(Clone, Debug, Deserialize)]
struct RawEntry {
    x: f32,
    y: f32,
    r: f32,
    #[serde(default)]
    descriptor: Option<Descriptor>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    frame: Option<u64>,
    #[serde(default)]
    detections: Vec<RawEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReplayEntry {
    pub detection: Detection,
    pub descriptor: Option<Descriptor>,
}

/// A frame whose detections and descriptors were computed ahead of time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplayFrame {
    /// Frame number as written by the producer, informational only
    pub label: Option<u64>,
    pub entries: Vec<ReplayEntry>,
}

impl ReplayFrame {
    pub fn detections(&self) -> Vec<Detection> {
        self.entries.iter().map(|e| e.detection).collect()
    }
}

impl From<RawFrame> for ReplayFrame {
    fn from(raw: RawFrame) -> Self {
        ReplayFrame {
            label: raw.frame,
            entries: raw
                .detections
                .into_iter()
                .map(|e| ReplayEntry {
                    detection: Detection::from_f32(e.x, e.y, e.r),
                    descriptor: e.descriptor,
                })
                .collect(),
        }
    }
}

/// Reads one JSON object per line:
/// `{"frame": 3, "detections": [{"x": 10.2, "y": 40.0, "r": 12.5, "descriptor": [[...32 bytes], ...]}]}`.
/// A `null` or missing descriptor marks a region that could not be described.
pub struct JsonlSource {
    reader: Box<dyn BufRead>,
    line: String,
    line_number: usize,
}

impl JsonlSource {
    pub fn open(path: &Path) -> Result<JsonlSource> {
        let file = File::open(path).map_err(|err| {
            TrackerError::source_unavailable(format!("cannot open {}: {}", path.display(), err))
        })?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead + 'static>(reader: R) -> JsonlSource {
        JsonlSource {
            reader: Box::new(reader),
            line: String::new(),
            line_number: 0,
        }
    }
}

impl DetectionSource for JsonlSource {
    type Frame = ReplayFrame;

    fn next_frame(&mut self) -> Result<Option<ReplayFrame>> {
        loop {
            self.line.clear();
            self.line_number += 1;
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return Ok(None),
                Err(err) => {
                    return Err(TrackerError::source_unavailable(format!(
                        "failed to read line {}: {}",
                        self.line_number, err
                    )))
                }
                _ => {}
            }
            if self.line.trim().is_empty() {
                continue;
            }

            let raw: RawFrame = serde_json::from_str(&self.line).map_err(|err| {
                TrackerError::source_unavailable(format!(
                    "malformed frame on line {}: {}",
                    self.line_number, err
                ))
            })?;
            return Ok(Some(raw.into()));
        }
    }

    fn detect(&mut self, frame: &ReplayFrame) -> Result<Vec<Detection>> {
        Ok(frame.detections())
    }
}

/// Serves the descriptors stored alongside replayed detections.
#[derive(Debug, Default)]
pub struct ReplayDescriptors;

impl DescriptorProvider for ReplayDescriptors {
    type Frame = ReplayFrame;

    fn describe(&mut self, frame: &ReplayFrame, detection: &Detection) -> Result<Option<Descriptor>> {
        match frame.entries.iter().find(|e| e.detection == *detection) {
            Some(entry) => Ok(entry.descriptor.clone()),
            None => {
                warn!(
                    "detection ({}, {}, r={}) is not part of the replayed frame",
                    detection.x, detection.y, detection.r
                );
                Ok(None)
            }
        }
    }

    /// Pairs detections with entries in order, so circles that round to the same pixels keep
    /// their own descriptors. Detections dropped before describing only skip entries.
    fn describe_all(
        &mut self,
        frame: &ReplayFrame,
        detections: &[Detection],
    ) -> Result<Vec<Option<Descriptor>>> {
        let mut entries = frame.entries.iter();
        Ok(detections
            .iter()
            .map(|detection| match entries.find(|e| e.detection == *detection) {
                Some(entry) => entry.descriptor.clone(),
                None => {
                    warn!(
                        "detection ({}, {}, r={}) is not part of the replayed frame",
                        detection.x, detection.y, detection.r
                    );
                    None
                }
            })
            .collect())
    }
}
