//! Frame sampling, resizing and BGR → RGB conversion.

use image::RgbImage;
use opencv::core::{self, Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("expected an 8-bit 3-channel frame, got OpenCV type {0}")]
    UnsupportedType(i32),
    #[error("frame buffer of {actual} bytes does not fit {width}x{height} RGB")]
    BufferSize { width: u32, height: u32, actual: usize },
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Selects every `every`-th frame read from the stream; the rest are dropped.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    every: u64,
    count: u64,
}

impl FrameSampler {
    /// `every = 0` behaves like 1 (process all frames).
    pub fn new(every: u32) -> Self {
        Self {
            every: u64::from(every.max(1)),
            count: 0,
        }
    }

    /// Count one frame read; true if it should be processed.
    pub fn should_process(&mut self) -> bool {
        self.count += 1;
        self.count % self.every == 0
    }

    /// Frames counted so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Resize by `factor` on both axes with bilinear interpolation.
pub fn downscale(frame: &Mat, factor: f64) -> Result<Mat, FrameError> {
    if (factor - 1.0).abs() < f64::EPSILON {
        return Ok(frame.try_clone()?);
    }
    let mut resized = Mat::default();
    imgproc::resize(frame, &mut resized, Size::default(), factor, factor, imgproc::INTER_LINEAR)?;
    Ok(resized)
}

/// Copy an OpenCV BGR frame into an RGB image buffer.
pub fn mat_to_rgb(frame: &Mat) -> Result<RgbImage, FrameError> {
    if frame.typ() != core::CV_8UC3 {
        return Err(FrameError::UnsupportedType(frame.typ()));
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let data = rgb.data_bytes()?.to_vec();
    let actual = data.len();
    RgbImage::from_raw(width, height, data).ok_or(FrameError::BufferSize { width, height, actual })
}
