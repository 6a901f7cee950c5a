//! Trainer: full batch retrain over the sample store.

use rollcall_core::LbphModel;
use rollcall_store::{ModelArtifact, ModelError, SampleStore, SampleStoreError};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("sample store is empty — enroll students before training")]
    NoTrainingData,
    #[error("training requires samples from at least 2 students, found {found}")]
    InsufficientData { found: usize },
    #[error(transparent)]
    Store(#[from] SampleStoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Summary of a completed training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainReport {
    pub identities: usize,
    pub samples: usize,
}

/// Fits one global classifier over every stored sample and atomically
/// replaces the model artifact. Not incremental: every call retrains from
/// scratch against a snapshot of the store.
pub struct Trainer<'a> {
    store: &'a SampleStore,
    model_path: &'a Path,
}

impl<'a> Trainer<'a> {
    pub fn new(store: &'a SampleStore, model_path: &'a Path) -> Self {
        Self { store, model_path }
    }

    pub fn train(&self) -> Result<TrainReport, TrainError> {
        let samples = self.store.load_all()?;
        if samples.is_empty() {
            return Err(TrainError::NoTrainingData);
        }

        // Dense labels in sorted roll-number order, so identical sample sets
        // always produce the same label space.
        let mut rolls: Vec<String> = samples.iter().map(|(roll, _)| roll.clone()).collect();
        rolls.sort_unstable();
        rolls.dedup();

        if rolls.len() < 2 {
            return Err(TrainError::InsufficientData { found: rolls.len() });
        }

        let label_of: BTreeMap<String, u32> = rolls
            .into_iter()
            .enumerate()
            .map(|(i, roll)| (roll, i as u32))
            .collect();

        let labeled: Vec<(u32, image::GrayImage)> = samples
            .into_iter()
            .map(|(roll, crop)| (label_of[roll.as_str()], crop))
            .collect();

        let classifier = LbphModel::train(&labeled);
        let labels: BTreeMap<u32, String> = label_of
            .into_iter()
            .map(|(roll, label)| (label, roll))
            .collect();

        let report = TrainReport {
            identities: labels.len(),
            samples: labeled.len(),
        };

        ModelArtifact::new(labels, classifier).save(self.model_path)?;
        tracing::info!(
            identities = report.identities,
            samples = report.samples,
            "model retrained"
        );
        Ok(report)
    }
}
