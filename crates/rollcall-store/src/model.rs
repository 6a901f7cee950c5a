//! Model artifact persistence.
//!
//! The artifact bundles the trained LBPH classifier with an explicit
//! label -> roll-number map, so inference never has to re-derive identities
//! from sample directory names. Saving is atomic: the JSON is written to a
//! uniquely-named temporary sibling and renamed over the previous artifact,
//! so a concurrent reader sees either the fully-old or fully-new model, and
//! concurrent writers never share a temp file.

use chrono::{DateTime, Utc};
use rollcall_core::LbphModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Bumped whenever the serialized layout changes incompatibly.
const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no trained model at {0} — run training first")]
    NotFound(String),
    #[error("model artifact unreadable: {0} — retrain to replace it")]
    Corrupt(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A persisted classifier plus its label space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub trained_at: DateTime<Utc>,
    /// Dense classifier label -> roll number.
    pub labels: BTreeMap<u32, String>,
    pub classifier: LbphModel,
}

impl ModelArtifact {
    pub fn new(labels: BTreeMap<u32, String>, classifier: LbphModel) -> Self {
        Self {
            version: FORMAT_VERSION,
            trained_at: Utc::now(),
            labels,
            classifier,
        }
    }

    /// Roll number for a classifier label, if the label was in the training set.
    pub fn roll_number_for(&self, label: u32) -> Option<&str> {
        self.labels.get(&label).map(String::as_str)
    }

    /// Atomically replace the artifact at `path`.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let json = serde_json::to_string(self)
            .map_err(|e| ModelError::Corrupt(format!("serialize: {e}")))?;

        // Each save gets its own temp file, so interleaved retrains cannot
        // rename each other's half-written output into place.
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ModelError::Io(e.error))?;

        tracing::info!(
            path = %path.display(),
            identities = self.labels.len(),
            samples = self.classifier.sample_count(),
            "model artifact saved"
        );
        Ok(())
    }

    /// Load the current artifact from `path`.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.display().to_string()));
        }

        let json = fs::read_to_string(path)?;
        let artifact: Self =
            serde_json::from_str(&json).map_err(|e| ModelError::Corrupt(e.to_string()))?;

        if artifact.version != FORMAT_VERSION {
            return Err(ModelError::Corrupt(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                artifact.version
            )));
        }

        Ok(artifact)
    }
}
