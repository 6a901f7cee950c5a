//! On-disk face sample repository.
//!
//! Layout: `<root>/<roll_number>/face_<index>.png`, grayscale PNG crops.
//! Samples are append-only; the per-identity index is monotonically
//! increasing and never reused, even across sessions — the existing maximum
//! is read before every append. Index allocation is the single
//! serialization point per identity: concurrent appends for the same
//! identity queue on an in-process lock, while different identities never
//! contend.

use image::{GrayImage, ImageFormat};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const SAMPLE_PREFIX: &str = "face_";
const SAMPLE_EXT: &str = ".png";

#[derive(Error, Debug)]
pub enum SampleStoreError {
    #[error("invalid identity key: {0:?}")]
    InvalidKey(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encode: {0}")]
    Encode(#[from] image::ImageError),
}

/// Filesystem-backed sample store rooted at a configured directory.
pub struct SampleStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SampleStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SampleStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Append crops for one identity, returning how many were written.
    ///
    /// Each crop is written to a temporary sibling and renamed into place,
    /// so an aborted call never leaves a partial sample visible.
    pub fn append(&self, roll_number: &str, crops: &[GrayImage]) -> Result<usize, SampleStoreError> {
        validate_key(roll_number)?;

        let lock = self.identity_lock(roll_number);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        let dir = self.root.join(roll_number);
        fs::create_dir_all(&dir)?;
        let mut index = max_index_in(&dir)?;

        for crop in crops {
            index += 1;
            let final_path = dir.join(format!("{SAMPLE_PREFIX}{index}{SAMPLE_EXT}"));
            let tmp_path = dir.join(format!("{SAMPLE_PREFIX}{index}{SAMPLE_EXT}.tmp"));

            let mut file = fs::File::create(&tmp_path)?;
            crop.write_to(&mut file, ImageFormat::Png)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp_path, &final_path)?;
        }

        tracing::info!(roll_number, written = crops.len(), max_index = index, "samples appended");
        Ok(crops.len())
    }

    /// Load every sample from every identity, as `(roll_number, crop)` pairs.
    ///
    /// Ordering is deterministic: identities sorted by key, samples sorted by
    /// index. Undecodable files are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<(String, GrayImage)>, SampleStoreError> {
        let mut identities: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                identities.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        identities.sort();

        let mut samples = Vec::new();
        for roll_number in identities {
            let dir = self.root.join(&roll_number);
            let mut indexed: Vec<(u64, PathBuf)> = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if let Some(index) = parse_sample_index(&path) {
                    indexed.push((index, path));
                }
            }
            indexed.sort_by_key(|(index, _)| *index);

            for (_, path) in indexed {
                match image::open(&path) {
                    Ok(img) => samples.push((roll_number.clone(), img.to_luma8())),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable sample");
                    }
                }
            }
        }

        Ok(samples)
    }

    /// Highest sample index on disk for an identity (0 when none).
    pub fn max_index(&self, roll_number: &str) -> Result<u64, SampleStoreError> {
        validate_key(roll_number)?;
        let dir = self.root.join(roll_number);
        if !dir.exists() {
            return Ok(0);
        }
        max_index_in(&dir)
    }

    /// Bulk-clear every sample for an identity. The index restarts only
    /// because the directory is gone; partial clears are not supported.
    pub fn clear(&self, roll_number: &str) -> Result<(), SampleStoreError> {
        validate_key(roll_number)?;
        let lock = self.identity_lock(roll_number);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        let dir = self.root.join(roll_number);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            tracing::info!(roll_number, "samples cleared");
        }
        Ok(())
    }

    fn identity_lock(&self, roll_number: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(roll_number.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Identity keys become directory names; reject anything path-like.
fn validate_key(key: &str) -> Result<(), SampleStoreError> {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
        return Err(SampleStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn parse_sample_index(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix(SAMPLE_PREFIX)?
        .strip_suffix(SAMPLE_EXT)?
        .parse()
        .ok()
}

fn max_index_in(dir: &Path) -> Result<u64, SampleStoreError> {
    let mut max = 0;
    for entry in fs::read_dir(dir)? {
        if let Some(index) = parse_sample_index(&entry?.path()) {
            max = max.max(index);
        }
    }
    Ok(max)
}
