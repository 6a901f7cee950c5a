//! Enrollment pipeline: raw labeled frames in, normalized face crops out.

use image::GrayImage;
use rollcall_core::detector::DetectorError;
use rollcall_core::FaceDetect;
use rollcall_store::{IdentityRegistry, RegistryError, SampleStore, SampleStoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("no student registered with roll number {0}")]
    IdentityNotFound(String),
    #[error("name {claimed:?} does not match the registration for roll number {roll_number}")]
    IdentityMismatch { roll_number: String, claimed: String },
    #[error("no faces could be detected in any of the supplied images")]
    NoFacesDetected,
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Store(#[from] SampleStoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Captures labeled face crops into the sample store.
///
/// Detector and registry handles are injected; the pipeline owns no global
/// state and only ever mutates the sample store.
pub struct EnrollmentPipeline<'a, D: FaceDetect> {
    detector: &'a mut D,
    registry: &'a dyn IdentityRegistry,
    store: &'a SampleStore,
}

impl<'a, D: FaceDetect> EnrollmentPipeline<'a, D> {
    pub fn new(
        detector: &'a mut D,
        registry: &'a dyn IdentityRegistry,
        store: &'a SampleStore,
    ) -> Self {
        Self { detector, registry, store }
    }

    /// Detect, crop and persist face samples from a batch of raw images.
    ///
    /// Returns the number of new samples written. Undecodable images and
    /// images with no detectable face are skipped individually; the batch
    /// fails with [`EnrollError::NoFacesDetected`] only when it yields zero
    /// crops overall. Nothing is written until the identity checks pass, and
    /// all crops land in one sample-store append.
    pub fn enroll(
        &mut self,
        roll_number: &str,
        claimed_name: &str,
        raw_images: &[Vec<u8>],
    ) -> Result<usize, EnrollError> {
        let identity = self
            .registry
            .find_identity(roll_number)?
            .ok_or_else(|| EnrollError::IdentityNotFound(roll_number.to_string()))?;

        if identity.name.to_lowercase() != claimed_name.to_lowercase() {
            return Err(EnrollError::IdentityMismatch {
                roll_number: roll_number.to_string(),
                claimed: claimed_name.to_string(),
            });
        }

        let mut crops: Vec<GrayImage> = Vec::new();
        for (i, bytes) in raw_images.iter().enumerate() {
            let frame = match image::load_from_memory(bytes) {
                Ok(img) => img.to_luma8(),
                Err(e) => {
                    tracing::debug!(image = i, error = %e, "skipping undecodable image");
                    continue;
                }
            };

            let faces = self.detector.detect(&frame)?;
            if faces.is_empty() {
                tracing::debug!(image = i, "no face found, skipping image");
                continue;
            }

            for face in &faces {
                let Some((x, y, w, h)) = face.clamp_to(frame.width(), frame.height()) else {
                    continue;
                };
                crops.push(image::imageops::crop_imm(&frame, x, y, w, h).to_image());
            }
        }

        if crops.is_empty() {
            return Err(EnrollError::NoFacesDetected);
        }

        let written = self.store.append(roll_number, &crops)?;
        tracing::info!(
            roll_number,
            images = raw_images.len(),
            samples = written,
            "enrollment batch saved"
        );
        Ok(written)
    }
}
