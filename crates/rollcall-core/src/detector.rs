//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free 3-stride decoding with NMS post-processing. The detector
//! asset (pretrained ONNX file) is supplied externally; the crate ships no
//! weights of its own.

use crate::types::FaceBox;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector asset not found: {0}")]
    AssetNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<ort::Error<ort::session::builder::SessionBuilder>> for DetectorError {
    fn from(e: ort::Error<ort::session::builder::SessionBuilder>) -> Self {
        DetectorError::Ort(e.into())
    }
}

/// Locates face regions in a grayscale frame.
///
/// The production implementation is [`ScrfdDetector`]; pipelines take this
/// as an explicit constructor argument so tests can substitute a stub.
pub trait FaceDetect {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<FaceBox>, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    session: Session,
    input_size: usize,
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX asset from the given path.
    pub fn load(asset_path: &Path) -> Result<Self, DetectorError> {
        if !asset_path.exists() {
            return Err(DetectorError::AssetNotFound(asset_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(asset_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(path = %asset_path.display(), outputs = num_outputs, "loaded SCRFD detector");

        // Need at least score + bbox tensors for each of the 3 strides.
        if num_outputs < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires at least 6 outputs (3 strides x score/bbox), got {num_outputs}"
            )));
        }

        Ok(Self {
            session,
            input_size: SCRFD_INPUT_SIZE,
        })
    }

    /// Preprocess a grayscale frame into a letterboxed NCHW float tensor.
    fn preprocess(&self, frame: &GrayImage) -> (Array4<f32>, Letterbox) {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let scale = (self.input_size as f32 / width as f32)
            .min(self.input_size as f32 / height as f32);

        let new_w = (width as f32 * scale).round() as usize;
        let new_h = (height as f32 * scale).round() as usize;
        let pad_x = (self.input_size - new_w) as f32 / 2.0;
        let pad_y = (self.input_size - new_h) as f32 / 2.0;

        let resized = image::imageops::resize(
            frame,
            new_w as u32,
            new_h as u32,
            image::imageops::FilterType::Triangle,
        );

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        let mut tensor = Array4::<f32>::zeros((1, 3, self.input_size, self.input_size));
        for y in 0..self.input_size {
            for x in 0..self.input_size {
                let pixel = if y >= pad_y_start
                    && y < pad_y_start + new_h
                    && x >= pad_x_start
                    && x < pad_x_start + new_w
                {
                    resized.get_pixel((x - pad_x_start) as u32, (y - pad_y_start) as u32)[0] as f32
                } else {
                    SCRFD_MEAN // pad value normalizes to 0.0
                };

                let normalized = (pixel - SCRFD_MEAN) / SCRFD_STD;
                // Grayscale replicated across the 3 input channels.
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        (tensor, Letterbox { scale, pad_x, pad_y })
    }
}

impl FaceDetect for ScrfdDetector {
    /// Detect faces, returning boxes in frame coordinates sorted by confidence.
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<FaceBox>, DetectorError> {
        let (input, letterbox) = self.preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            // Standard SCRFD export ordering: [0-2] = scores, [3-5] = bboxes.
            let (_, scores) = outputs[stride_pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[stride_pos + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            all.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_size,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let mut result = nms(all, SCRFD_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(faces = result.len(), "detection complete");
        Ok(result)
    }
}

/// Decode detections for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<FaceBox> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

    let mut detections = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid) as f32 * stride as f32;
        let anchor_cy = (anchor_idx / grid) as f32 * stride as f32;

        // bbox layout: [left, top, right, bottom] offsets in stride units
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        // Map from letterboxed space back to frame space
        let fx1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let fy1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let fx2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let fy2 = (y2 - letterbox.pad_y) / letterbox.scale;

        detections.push(FaceBox {
            x: fx1,
            y: fy1,
            width: fx2 - fx1,
            height: fy2 - fy1,
            confidence: score,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());
        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(x: f32, y: f32, w: f32, h: f32, conf: f32) -> FaceBox {
        FaceBox { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_box(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        let expected = 50.0 / 150.0;
        assert!((iou(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_box(0.0, 0.0, 100.0, 100.0, 0.9),
            make_box(5.0, 5.0, 100.0, 100.0, 0.8),
            make_box(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_decode_stride_maps_back_to_frame_space() {
        // One anchor above threshold at grid cell (1, 1), stride 8, with a
        // letterbox of scale 2 and symmetric padding.
        let grid = 640 / 8;
        let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; num_anchors];
        let mut bboxes = vec![0.0f32; num_anchors * 4];

        // Anchor at cell (1, 1), first anchor of the pair: idx = (1 * grid + 1) * 2
        let idx = (grid + 1) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        // 1 stride-unit extent in every direction -> 16px box centred on (8, 8)
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let letterbox = Letterbox { scale: 2.0, pad_x: 4.0, pad_y: 4.0 };
        let dets = decode_stride(&scores, &bboxes, 8, 640, &letterbox, 0.5);

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        // Letterboxed box: (0,0)-(16,16); de-mapped: ((0-4)/2, ..) = (-2,-2)-(6,6)
        assert!((d.x + 2.0).abs() < 1e-4);
        assert!((d.y + 2.0).abs() < 1e-4);
        assert!((d.width - 8.0).abs() < 1e-4);
        assert!((d.height - 8.0).abs() < 1e-4);
        assert!((d.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stride_below_threshold_skipped() {
        let grid = 640 / 32;
        let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let scores = vec![0.3f32; num_anchors];
        let bboxes = vec![1.0f32; num_anchors * 4];
        let letterbox = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        assert!(decode_stride(&scores, &bboxes, 32, 640, &letterbox, 0.5).is_empty());
    }

    #[test]
    fn test_letterbox_coordinate_roundtrip() {
        let scale = (640.0f32 / 320.0).min(640.0 / 240.0);
        let pad_x = (640.0 - (320.0 * scale).round()) / 2.0;
        let pad_y = (640.0 - (240.0 * scale).round()) / 2.0;
        let letterbox = Letterbox { scale, pad_x, pad_y };

        let orig = (100.0f32, 50.0f32);
        let boxed = (orig.0 * scale + pad_x, orig.1 * scale + pad_y);
        let recovered = (
            (boxed.0 - letterbox.pad_x) / letterbox.scale,
            (boxed.1 - letterbox.pad_y) / letterbox.scale,
        );

        assert!((recovered.0 - orig.0).abs() < 0.1);
        assert!((recovered.1 - orig.1).abs() < 0.1);
    }
}
