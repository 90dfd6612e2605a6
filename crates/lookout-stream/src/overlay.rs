//! Name labels drawn over recognized faces.

use lookout_core::{BoundingBox, Recognition};
use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc;

pub const FRAME_THICKNESS: i32 = 3;
pub const FONT_THICKNESS: i32 = 2;
const LABEL_HEIGHT: i32 = 22;
const TEXT_INSET_X: i32 = 10;
const TEXT_BASELINE: i32 = 15;
const FONT_SCALE: f64 = 0.5;
const TEXT_GRAY: f64 = 200.0;

/// Deterministic colour for a name, one channel per leading character.
///
/// Each of the first three characters (lower-cased) maps to
/// `(code_point - 'a') * 8`, saturated to 0..=255; missing characters give 0.
/// Channels are in OpenCV order (B, G, R).
pub fn name_to_color(name: &str) -> [u8; 3] {
    let mut channels = [0u8; 3];
    let lowered = name
        .chars()
        .take(3)
        .map(|c| c.to_lowercase().next().unwrap_or(c));
    for (slot, c) in channels.iter_mut().zip(lowered) {
        let value = (i64::from(u32::from(c)) - i64::from(b'a')) * 8;
        *slot = value.clamp(0, 255) as u8;
    }
    channels
}

fn scalar(bgr: [u8; 3]) -> Scalar {
    Scalar::new(f64::from(bgr[0]), f64::from(bgr[1]), f64::from(bgr[2]), 0.0)
}

/// Outline `face`, then put `name` on a filled band sitting on the box's top edge.
pub fn draw_label(frame: &mut Mat, name: &str, face: &BoundingBox) -> opencv::Result<()> {
    let (left, top, right, bottom) = face.corners();
    let color = scalar(name_to_color(name));

    imgproc::rectangle_points(
        frame,
        Point::new(left, top),
        Point::new(right, bottom),
        color,
        FRAME_THICKNESS,
        imgproc::LINE_8,
        0,
    )?;

    let band_top = top - LABEL_HEIGHT;
    imgproc::rectangle_points(
        frame,
        Point::new(left, band_top),
        Point::new(right, top),
        color,
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;

    imgproc::put_text(
        frame,
        name,
        Point::new(left + TEXT_INSET_X, band_top + TEXT_BASELINE),
        imgproc::FONT_HERSHEY_SIMPLEX,
        FONT_SCALE,
        Scalar::all(TEXT_GRAY),
        FONT_THICKNESS,
        imgproc::LINE_8,
        false,
    )
}

pub fn draw_recognitions(frame: &mut Mat, recognitions: &[Recognition]) -> opencv::Result<()> {
    for recognition in recognitions {
        draw_label(frame, &recognition.name, &recognition.face)?;
    }
    Ok(())
}
