use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::detection::Detection;
use crate::error::{Result, TrackerError};
use crate::my_types::*;

/// Per-frame count of identities matched or created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    #[serde(rename = "Frame")]
    pub frame: FrameIndex,
    #[serde(rename = "UniqueCircles")]
    pub unique_circles: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PersistentCircle {
    pub id: TrackId,
    pub appearances: u32,
}

/// End-of-stream result of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub identities_created: u64,
    /// True when the run was stopped before the source ran dry
    pub stopped_early: bool,
    pub persistent: Vec<PersistentCircle>,
}

impl RunSummary {
    pub fn persistent_count(&self) -> usize {
        self.persistent.len()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Receives one record per processed frame, in frame order, then the summary.
pub trait FrameReportEmitter {
    fn emit_frame(&mut self, record: &FrameRecord) -> Result<()>;

    fn finish(&mut self, summary: &RunSummary) -> Result<()>;
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer)
}

/// `Frame,UniqueCircles` table.
pub struct CsvReport<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvReport<File> {
    pub fn create(path: &Path) -> Result<Self> {
        CsvReport::new(File::create(path)?)
    }
}

impl<W: Write> CsvReport<W> {
    /// Writes the header immediately; an empty run still yields it.
    pub fn new(writer: W) -> Result<Self> {
        let mut writer = csv_writer(writer);
        writer.write_record(["Frame", "UniqueCircles"])?;
        Ok(CsvReport { writer })
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| TrackerError::Io(err.into_error()))
    }
}

impl<W: Write> FrameReportEmitter for CsvReport<W> {
    fn emit_frame(&mut self, record: &FrameRecord) -> Result<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn finish(&mut self, _summary: &RunSummary) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryReport {
    pub records: Vec<FrameRecord>,
    pub summary: Option<RunSummary>,
}

impl FrameReportEmitter for MemoryReport {
    fn emit_frame(&mut self, record: &FrameRecord) -> Result<()> {
        self.records.push(*record);
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct CircleRow {
    #[serde(rename = "Circle_No")]
    circle_no: String,
    #[serde(rename = "Center_X")]
    center_x: Option<i32>,
    #[serde(rename = "Center_Y")]
    center_y: Option<i32>,
    #[serde(rename = "Radius")]
    radius: Option<i32>,
    #[serde(rename = "Diameter")]
    diameter: Option<i32>,
    #[serde(rename = "Total_Detected")]
    total_detected: Option<usize>,
}

/// Table of the circles found in a single image, closed by a total row.
pub fn write_circle_table<W: Write>(writer: W, circles: &[Detection]) -> Result<()> {
    let mut writer = csv_writer(writer);
    writer.write_record([
        "Circle_No",
        "Center_X",
        "Center_Y",
        "Radius",
        "Diameter",
        "Total_Detected",
    ])?;
    for (idx, c) in circles.iter().enumerate() {
        writer.serialize(CircleRow {
            circle_no: (idx + 1).to_string(),
            center_x: Some(c.x),
            center_y: Some(c.y),
            radius: Some(c.r),
            diameter: Some(2 * c.r),
            total_detected: None,
        })?;
    }
    writer.serialize(CircleRow {
        circle_no: "Total".to_string(),
        center_x: None,
        center_y: None,
        radius: None,
        diameter: None,
        total_detected: Some(circles.len()),
    })?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_report() {
        let mut report = CsvReport::new(Vec::new()).unwrap();
        report
            .emit_frame(&FrameRecord { frame: 1, unique_circles: 0 })
            .unwrap();
        report
            .emit_frame(&FrameRecord { frame: 2, unique_circles: 3 })
            .unwrap();
        report.finish(&RunSummary::default()).unwrap();
        let text = String::from_utf8(report.into_inner().unwrap()).unwrap();
        assert_eq!(text, "Frame,UniqueCircles\n1,0\n2,3\n");
    }

    #[test]
    fn test_empty_run_still_has_header() {
        let mut report = CsvReport::new(Vec::new()).unwrap();
        report.finish(&RunSummary::default()).unwrap();
        let text = String::from_utf8(report.into_inner().unwrap()).unwrap();
        assert_eq!(text, "Frame,UniqueCircles\n");
    }

    #[test]
    fn test_circle_table() {
        let mut out = Vec::new();
        write_circle_table(&mut out, &[Detection::new(10, 20, 5), Detection::new(40, 41, 12)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Circle_No,Center_X,Center_Y,Radius,Diameter,Total_Detected\n1,10,20,5,10,\n2,40,41,12,24,\nTotal,,,,,2\n"
        );
    }

    #[test]
    fn test_summary_json() {
        let summary = RunSummary {
            frames_processed: 20,
            identities_created: 2,
            stopped_early: false,
            persistent: vec![PersistentCircle { id: 1, appearances: 20 }],
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["persistent"][0]["appearances"], 20);
        assert_eq!(value["frames_processed"], 20);
    }
}
