//! LBPH (Local Binary Pattern Histograms) identity classifier.
//!
//! Each face crop is resized to a canonical square, converted to an LBP code
//! image (radius 1, 8 neighbors), and summarized as a grid of per-cell
//! normalized histograms. Training stores one labeled histogram per sample;
//! prediction is nearest-neighbor by chi-square distance, so a *lower*
//! distance means a more confident match.

use crate::types::Prediction;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Canonical side length every crop is resized to before feature extraction.
pub const CANONICAL_SIZE: u32 = 100;

const LBP_BINS: usize = 256;
const GRID: usize = 8;

/// One training sample's feature vector with its identity label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledHistogram {
    pub label: u32,
    pub values: Vec<f32>,
}

/// Trained LBPH model: the full set of labeled sample histograms.
///
/// Nearest-neighbor over stored samples, like the classical LBPH
/// recognizer. Retraining replaces the whole set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LbphModel {
    histograms: Vec<LabeledHistogram>,
}

impl LbphModel {
    /// Fit a model over `(label, crop)` pairs.
    ///
    /// Crops of any size are accepted; each is resized to the canonical
    /// square first. Deterministic: sample order is preserved.
    pub fn train(samples: &[(u32, GrayImage)]) -> Self {
        let histograms = samples
            .iter()
            .map(|(label, crop)| LabeledHistogram {
                label: *label,
                values: extract_features(crop),
            })
            .collect();
        Self { histograms }
    }

    /// Predict the identity label for a face crop.
    ///
    /// Returns `None` only for an empty model. The returned distance is the
    /// chi-square distance to the nearest stored sample.
    pub fn predict(&self, crop: &GrayImage) -> Option<Prediction> {
        let probe = extract_features(crop);

        let mut best: Option<Prediction> = None;
        for hist in &self.histograms {
            let distance = chi_square(&probe, &hist.values);
            let better = match best {
                None => true,
                Some(b) => distance < b.distance,
            };
            if better {
                best = Some(Prediction { label: hist.label, distance });
            }
        }
        best
    }

    /// Distinct labels present in the model, sorted ascending.
    pub fn labels(&self) -> Vec<u32> {
        let mut labels: Vec<u32> = self.histograms.iter().map(|h| h.label).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    /// Number of stored sample histograms.
    pub fn sample_count(&self) -> usize {
        self.histograms.len()
    }
}

/// Resize to canonical size, compute LBP codes, build the spatial histogram.
fn extract_features(crop: &GrayImage) -> Vec<f32> {
    let resized = if crop.dimensions() == (CANONICAL_SIZE, CANONICAL_SIZE) {
        crop.clone()
    } else {
        image::imageops::resize(
            crop,
            CANONICAL_SIZE,
            CANONICAL_SIZE,
            image::imageops::FilterType::Triangle,
        )
    };
    let codes = lbp_codes(&resized);
    spatial_histogram(&codes, CANONICAL_SIZE as usize, CANONICAL_SIZE as usize)
}

/// Compute the 8-neighbor LBP code image.
///
/// Border pixels have no full neighborhood and are coded 0, matching the
/// classical radius-1 operator.
fn lbp_codes(img: &GrayImage) -> Vec<u8> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut codes = vec![0u8; w * h];
    if w < 3 || h < 3 {
        return codes;
    }

    // Neighbor offsets, clockwise from top-left. Bit i is set when the
    // neighbor is >= the center pixel.
    const OFFSETS: [(i32, i32); 8] = [
        (-1, -1), (0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0),
    ];

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = img.get_pixel(x as u32, y as u32)[0];
            let mut code = 0u8;
            for (bit, (dx, dy)) in OFFSETS.iter().enumerate() {
                let neighbor =
                    img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0];
                if neighbor >= center {
                    code |= 1 << bit;
                }
            }
            codes[y * w + x] = code;
        }
    }

    codes
}

/// Concatenated per-cell histograms over a GRID x GRID partition, each cell
/// normalized by its pixel count.
fn spatial_histogram(codes: &[u8], width: usize, height: usize) -> Vec<f32> {
    let cell_w = width / GRID;
    let cell_h = height / GRID;
    let mut features = Vec::with_capacity(GRID * GRID * LBP_BINS);

    for gy in 0..GRID {
        for gx in 0..GRID {
            let mut hist = [0.0f32; LBP_BINS];
            for y in gy * cell_h..(gy + 1) * cell_h {
                for x in gx * cell_w..(gx + 1) * cell_w {
                    hist[codes[y * width + x] as usize] += 1.0;
                }
            }
            let total = (cell_w * cell_h) as f32;
            for bin in &mut hist {
                *bin /= total;
            }
            features.extend_from_slice(&hist);
        }
    }

    features
}

/// Chi-square distance between two histograms of equal length.
fn chi_square(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let sum = x + y;
            if sum > 0.0 {
                (x - y) * (x - y) / sum
            } else {
                0.0
            }
        })
        .sum()
}
