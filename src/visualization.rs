use std::path::Path;

use opencv as cv2;
use cv2::prelude::*;
use cv2::{core, imgproc, videoio};

#[cfg(feature = "rerun")]
use ndarray as nd;
#[cfg(feature = "rerun")]
use rerun::{RecordingStream, RecordingStreamBuilder};

use crate::error::{Result, TrackerError};
use crate::tracker::FrameOutcome;
use crate::vision::VideoFrame;

#[cfg(feature = "rerun")]
trait AsArray {
    fn try_as_array(&self) -> Result<nd::Array3<u8>>;
}

#[cfg(feature = "rerun")]
impl AsArray for core::Mat {
    fn try_as_array(&self) -> Result<nd::Array3<u8>> {
        let bytes = self.data_bytes()?;
        let size = self.size()?;
        let a = nd::ArrayView3::from_shape((size.height as usize, size.width as usize, 3), bytes)
            .map_err(|err| TrackerError::source_unavailable(err.to_string()))?;
        Ok(a.to_owned())
    }
}

/// Draw every assignment of the frame: circle outline and `ID n` label, plus a frame counter
/// banner.
pub fn draw_overlay(image: &mut core::Mat, outcome: &FrameOutcome) -> Result<()> {
    let green = core::Scalar::new(0., 255., 0., 0.);
    let yellow = core::Scalar::new(0., 255., 255., 0.);
    let white = core::Scalar::new(255., 255., 255., 0.);

    for assignment in &outcome.assignments {
        let d = assignment.detection;
        imgproc::circle(image, core::Point::new(d.x, d.y), d.r, green, 2, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            image,
            &format!("ID {}", assignment.track_id),
            core::Point::new(d.x - 10, d.y - d.r - 5),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            yellow,
            1,
            imgproc::LINE_8,
            false,
        )?;
    }
    imgproc::put_text(
        image,
        &format!(
            "Frame: {} | Circles: {}",
            outcome.frame_number,
            outcome.unique_count()
        ),
        core::Point::new(20, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.7,
        white,
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

/// Writes annotated frames to an mp4 file and, with the `rerun` feature, to a recording.
pub struct OverlayWriter {
    writer: videoio::VideoWriter,
    #[cfg(feature = "rerun")]
    recorder: Option<RecordingStream>,
}

impl OverlayWriter {
    pub fn create(path: &Path, fps: f64, width: i32, height: i32) -> Result<Self> {
        let fourcc = videoio::VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = videoio::VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            fps,
            core::Size::new(width, height),
            true,
        )?;
        if !writer.is_opened()? {
            return Err(TrackerError::source_unavailable(format!(
                "cannot write video {}",
                path.display()
            )));
        }
        Ok(OverlayWriter {
            writer,
            #[cfg(feature = "rerun")]
            recorder: None,
        })
    }

    #[cfg(feature = "rerun")]
    pub fn with_recording(mut self, path: &Path) -> Result<Self> {
        let recorder = RecordingStreamBuilder::new("circle-tracker")
            .save(path)
            .map_err(|err| TrackerError::source_unavailable(err.to_string()))?;
        self.recorder = Some(recorder);
        Ok(self)
    }

    pub fn write(&mut self, frame: &VideoFrame, outcome: &FrameOutcome) -> Result<()> {
        let mut annotated = frame.color.try_clone()?;
        draw_overlay(&mut annotated, outcome)?;
        self.writer.write(&annotated)?;

        self.record(&annotated)
    }

    #[cfg(feature = "rerun")]
    fn record(&self, annotated: &core::Mat) -> Result<()> {
        let Some(recorder) = &self.recorder else {
            return Ok(());
        };
        let mut rgb = core::Mat::default();
        imgproc::cvt_color(annotated, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let image = rerun::Image::try_from(rgb.try_as_array()?)
            .map_err(|err| TrackerError::source_unavailable(err.to_string()))?;
        recorder
            .log("video/overlay", &image)
            .map_err(|err| TrackerError::source_unavailable(err.to_string()))
    }

    #[cfg(not(feature = "rerun"))]
    fn record(&self, _annotated: &core::Mat) -> Result<()> {
        Ok(())
    }
}
