use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in original frame coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector confidence in [0, 1]. Higher = more likely a face.
    pub confidence: f32,
}

impl FaceBox {
    /// Clamp the box to an integer pixel rectangle inside a frame of the
    /// given dimensions. Returns `None` for a degenerate (empty) region.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).ceil() as u32).min(frame_width);
        let y1 = ((self.y + self.height).ceil() as u32).min(frame_height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Classifier output for one face crop.
///
/// `distance` is a chi-square distance: lower = more confident. Callers
/// compare it against a threshold to decide known vs. unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: u32,
    pub distance: f32,
}
