//! rollcall-engine — the attendance portal's face-recognition core.
//!
//! Four operations, each an independent unit of work triggered by the host
//! request layer: enrollment (labeled frames -> sample store), training
//! (sample store -> model artifact), recognition (frame + artifact ->
//! identities), and reconciliation (identities + ledger -> attendance
//! entries). Detector, registry and ledger handles are injected explicitly;
//! the engine keeps no process-global state.

pub mod config;
pub mod enroll;
pub mod reconcile;
pub mod recognize;
pub mod train;

pub use config::Config;
pub use enroll::{EnrollError, EnrollmentPipeline};
pub use reconcile::{MarkOutcome, MarkStatus, ReconcileError, Reconciler};
pub use recognize::{Recognition, Recognizer, RecognizeError};
pub use train::{TrainError, Trainer, TrainReport};

#[cfg(test)]
pub(crate) mod testing {
    use crate::recognize::Recognition;
    use image::GrayImage;
    use rollcall_core::detector::DetectorError;
    use rollcall_core::{FaceBox, FaceDetect};

    #[derive(Debug)]
    enum StubMode {
        /// One face covering the whole frame, every call.
        FullFrame,
        /// A face on even-numbered calls only.
        Alternating,
        /// Never a face.
        Blind,
    }

    /// Deterministic detector substitute for pipeline tests.
    #[derive(Debug)]
    pub struct StubDetector {
        mode: StubMode,
        calls: usize,
    }

    impl StubDetector {
        pub fn full_frame() -> Self {
            Self { mode: StubMode::FullFrame, calls: 0 }
        }

        pub fn alternating() -> Self {
            Self { mode: StubMode::Alternating, calls: 0 }
        }

        pub fn blind() -> Self {
            Self { mode: StubMode::Blind, calls: 0 }
        }
    }

    impl FaceDetect for StubDetector {
        fn detect(&mut self, frame: &GrayImage) -> Result<Vec<FaceBox>, DetectorError> {
            let call = self.calls;
            self.calls += 1;

            let full = FaceBox {
                x: 0.0,
                y: 0.0,
                width: frame.width() as f32,
                height: frame.height() as f32,
                confidence: 0.99,
            };
            Ok(match self.mode {
                StubMode::FullFrame => vec![full],
                StubMode::Alternating if call % 2 == 0 => vec![full],
                StubMode::Alternating | StubMode::Blind => vec![],
            })
        }
    }

    /// Horizontal stripes of the given period; a distinguishable "face".
    pub fn striped(period: u32) -> GrayImage {
        GrayImage::from_fn(100, 100, |_, y| {
            if (y / period) % 2 == 0 {
                image::Luma([220u8])
            } else {
                image::Luma([30u8])
            }
        })
    }

    /// Checkerboard of the given cell size; a second distinguishable "face".
    pub fn checkered(cell: u32) -> GrayImage {
        GrayImage::from_fn(100, 100, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                image::Luma([200u8])
            } else {
                image::Luma([50u8])
            }
        })
    }

    pub fn encode_png(img: &GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .expect("png encode");
        bytes
    }

    pub fn recognition(roll_number: Option<&str>) -> Recognition {
        Recognition {
            face: FaceBox { x: 0.0, y: 0.0, width: 50.0, height: 50.0, confidence: 0.9 },
            roll_number: roll_number.map(str::to_string),
            distance: if roll_number.is_some() { 12.0 } else { 180.0 },
        }
    }
}
