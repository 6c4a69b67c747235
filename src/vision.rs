use std::path::Path;

use log::info;
use opencv as cv2;
use cv2::prelude::*;
use cv2::{core, features2d, imgcodecs, imgproc, videoio};

use crate::descriptor::{Descriptor, DescriptorProvider, DescriptorRow, DESCRIPTOR_BYTES};
use crate::detection::Detection;
use crate::error::{Result, TrackerError};
use crate::source::DetectionSource;

/// `HoughCircles` settings.
#[derive(Clone, Copy, Debug)]
pub struct HoughParams {
    pub dp: f64,
    pub min_dist: f64,
    pub canny_threshold: f64,
    pub accumulator_threshold: f64,
    pub min_radius: i32,
    pub max_radius: i32,
}

impl HoughParams {
    pub fn video(min_radius: i32) -> Self {
        HoughParams {
            dp: 1.2,
            min_dist: 30.,
            canny_threshold: 50.,
            accumulator_threshold: 30.,
            min_radius,
            max_radius: 100,
        }
    }

    /// Still images allow circles closer together.
    pub fn image(min_radius: i32) -> Self {
        HoughParams {
            min_dist: 20.,
            ..Self::video(min_radius)
        }
    }
}

/// A decoded video frame and its grayscale copy.
pub struct VideoFrame {
    pub color: core::Mat,
    pub gray: core::Mat,
}

impl VideoFrame {
    pub fn from_color(color: core::Mat) -> Result<Self> {
        let mut gray = core::Mat::default();
        imgproc::cvt_color(&color, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        Ok(VideoFrame { color, gray })
    }
}

/// Grayscale, 9x9 Gaussian blur, Hough gradient circles, rounded to whole pixels.
pub fn detect_circles(gray: &core::Mat, params: &HoughParams) -> Result<Vec<Detection>> {
    let mut blurred = core::Mat::default();
    imgproc::gaussian_blur(
        gray,
        &mut blurred,
        core::Size::new(9, 9),
        2.,
        0.,
        core::BORDER_DEFAULT,
    )?;
    let mut circles = core::Vector::<core::Vec3f>::new();
    imgproc::hough_circles(
        &blurred,
        &mut circles,
        imgproc::HOUGH_GRADIENT,
        params.dp,
        params.min_dist,
        params.canny_threshold,
        params.accumulator_threshold,
        params.min_radius,
        params.max_radius,
    )?;
    Ok(circles
        .iter()
        .map(|c| Detection::from_f32(c[0], c[1], c[2]))
        .collect())
}

/// Frames read from a video file with circles found by `HoughCircles`.
pub struct HoughCircleSource {
    capture: videoio::VideoCapture,
    params: HoughParams,
    length: Option<u64>,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
}

impl HoughCircleSource {
    pub fn open(path: &Path, params: HoughParams) -> Result<Self> {
        let capture = videoio::VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(TrackerError::source_unavailable(format!(
                "cannot open video {}",
                path.display()
            )));
        }
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        info!(
            "opened {}: {}x{} at {:.1} fps, {} frames",
            path.display(),
            width,
            height,
            fps,
            frame_count
        );
        Ok(HoughCircleSource {
            capture,
            params,
            length: (frame_count > 0.).then_some(frame_count as u64),
            fps,
            width,
            height,
        })
    }
}

impl DetectionSource for HoughCircleSource {
    type Frame = VideoFrame;

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let mut color = core::Mat::default();
        if !self.capture.read(&mut color)? || color.empty() {
            return Ok(None);
        }
        Ok(Some(VideoFrame::from_color(color)?))
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Detection>> {
        detect_circles(&frame.gray, &self.params)
    }

    fn length(&self) -> Option<u64> {
        self.length
    }
}

/// ORB keypoints and binary descriptors computed on the circle's bounding square.
pub struct OrbDescriptorProvider {
    orb: core::Ptr<dyn features2d::ORB>,
}

impl OrbDescriptorProvider {
    pub fn new(features: i32) -> Result<Self> {
        let orb = <dyn features2d::ORB>::create(
            features,
            1.2,
            8,
            31,
            0,
            2,
            features2d::ORB_ScoreType::HARRIS_SCORE,
            31,
            20,
        )?;
        Ok(OrbDescriptorProvider { orb })
    }
}

impl DescriptorProvider for OrbDescriptorProvider {
    type Frame = VideoFrame;

    fn describe(&mut self, frame: &VideoFrame, detection: &Detection) -> Result<Option<Descriptor>> {
        let region = detection.region(frame.gray.cols(), frame.gray.rows());
        if region.is_empty() {
            return Ok(None);
        }
        let rect = core::Rect::new(region.x1, region.y1, region.width(), region.height());
        let crop = core::Mat::roi(&frame.gray, rect)?;

        let mut keypoints = core::Vector::<core::KeyPoint>::new();
        let mut descriptors = core::Mat::default();
        self.orb.detect_and_compute(
            &crop,
            &core::Mat::default(),
            &mut keypoints,
            &mut descriptors,
            false,
        )?;
        if descriptors.empty() || descriptors.cols() as usize != DESCRIPTOR_BYTES {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(descriptors.rows() as usize);
        for i in 0..descriptors.rows() {
            let bytes = descriptors.at_row::<u8>(i)?;
            let mut row: DescriptorRow = [0; DESCRIPTOR_BYTES];
            row.copy_from_slice(&bytes[..DESCRIPTOR_BYTES]);
            rows.push(row);
        }
        Ok(Descriptor::new(rows))
    }
}

/// Count the circles in a single image.
pub fn detect_circles_in_image(path: &Path, params: &HoughParams) -> Result<Vec<Detection>> {
    let color = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
    if color.empty() {
        return Err(TrackerError::source_unavailable(format!(
            "cannot read image {}",
            path.display()
        )));
    }
    let frame = VideoFrame::from_color(color)?;
    detect_circles(&frame.gray, params)
}
