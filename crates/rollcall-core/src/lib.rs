//! rollcall-core — Face detection and identity classification engine.
//!
//! Uses SCRFD for face detection via ONNX Runtime and an LBPH
//! (Local Binary Pattern Histograms) classifier for identity prediction.

pub mod detector;
pub mod lbph;
pub mod types;

pub use detector::{FaceDetect, ScrfdDetector};
pub use lbph::LbphModel;
pub use types::{FaceBox, Prediction};
