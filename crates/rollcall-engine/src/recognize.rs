//! Recognizer: detect faces in a frame and classify each against the
//! current model artifact.

use image::GrayImage;
use rollcall_core::detector::DetectorError;
use rollcall_core::{FaceBox, FaceDetect};
use rollcall_store::{ModelArtifact, ModelError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("no trained model at {0} — train before recognizing")]
    ModelNotFound(String),
    #[error("model artifact could not be loaded: {0} — retrain to replace it")]
    ModelCorrupt(String),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ModelError> for RecognizeError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::NotFound(path) => RecognizeError::ModelNotFound(path),
            ModelError::Corrupt(msg) => RecognizeError::ModelCorrupt(msg),
            ModelError::Io(e) => RecognizeError::Io(e),
        }
    }
}

/// One detected face with its classification outcome.
///
/// `roll_number` is `None` when the face is unknown: either the distance to
/// the nearest identity was at or above the threshold, or the predicted
/// label no longer resolves (model trained before an identity was removed).
#[derive(Debug, Clone)]
pub struct Recognition {
    pub face: FaceBox,
    pub roll_number: Option<String>,
    pub distance: f32,
}

/// Loads the model artifact once and serves classification requests.
///
/// Purely read-only: recognition never mutates the sample store, the
/// artifact, or the ledger. After a retrain, call [`Recognizer::reload`] to
/// pick up the replacement artifact.
#[derive(Debug)]
pub struct Recognizer<D: FaceDetect> {
    detector: D,
    artifact: ModelArtifact,
    model_path: PathBuf,
    distance_threshold: f32,
}

impl<D: FaceDetect> Recognizer<D> {
    /// Load the current artifact. Fails with [`RecognizeError::ModelNotFound`]
    /// if training has never run, [`RecognizeError::ModelCorrupt`] if the
    /// artifact cannot be parsed.
    pub fn load(
        model_path: impl Into<PathBuf>,
        detector: D,
        distance_threshold: f32,
    ) -> Result<Self, RecognizeError> {
        let model_path = model_path.into();
        let artifact = ModelArtifact::load(&model_path)?;
        tracing::info!(
            path = %model_path.display(),
            identities = artifact.labels.len(),
            trained_at = %artifact.trained_at,
            "recognizer ready"
        );
        Ok(Self {
            detector,
            artifact,
            model_path,
            distance_threshold,
        })
    }

    /// Re-read the artifact after a retrain signal.
    pub fn reload(&mut self) -> Result<(), RecognizeError> {
        self.artifact = ModelArtifact::load(&self.model_path)?;
        tracing::info!(trained_at = %self.artifact.trained_at, "model artifact reloaded");
        Ok(())
    }

    /// Classify every detectable face in the frame.
    ///
    /// A frame with no faces yields an empty vec, which is a normal outcome,
    /// not an error. A prediction counts as known only when its chi-square
    /// distance is strictly below the threshold (lower = more confident).
    pub fn recognize(&mut self, frame: &GrayImage) -> Result<Vec<Recognition>, RecognizeError> {
        let faces = self.detector.detect(frame)?;

        let mut results = Vec::with_capacity(faces.len());
        for face in faces {
            let Some((x, y, w, h)) = face.clamp_to(frame.width(), frame.height()) else {
                continue;
            };
            let crop = image::imageops::crop_imm(frame, x, y, w, h).to_image();

            let (roll_number, distance) = match self.artifact.classifier.predict(&crop) {
                Some(p) if p.distance < self.distance_threshold => (
                    self.artifact.roll_number_for(p.label).map(str::to_string),
                    p.distance,
                ),
                Some(p) => (None, p.distance),
                None => (None, f32::INFINITY),
            };

            tracing::debug!(
                distance,
                roll_number = roll_number.as_deref().unwrap_or("<unknown>"),
                "face classified"
            );
            results.push(Recognition { face, roll_number, distance });
        }

        Ok(results)
    }
}
