use std::path::PathBuf;

/// Engine configuration, loaded from environment variables.
pub struct Config {
    /// Root of the sample store tree (one directory per roll number).
    pub samples_dir: PathBuf,
    /// Path of the current model artifact.
    pub model_path: PathBuf,
    /// SQLite database file for registries and the attendance ledger.
    pub db_path: PathBuf,
    /// Pretrained SCRFD detector asset (ONNX), supplied externally.
    pub detector_asset: PathBuf,
    /// Chi-square distance threshold: a prediction is accepted as a known
    /// identity only when its distance is strictly below this.
    pub distance_threshold: f32,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with
    /// defaults rooted under `ROLLCALL_DATA_DIR` (default `./data`).
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        Self {
            samples_dir: env_path("ROLLCALL_SAMPLES_DIR", data_dir.join("samples")),
            model_path: env_path("ROLLCALL_MODEL_PATH", data_dir.join("model/lbph.json")),
            db_path: env_path("ROLLCALL_DB_PATH", data_dir.join("rollcall.db")),
            detector_asset: env_path("ROLLCALL_DETECTOR_MODEL", data_dir.join("det_10g.onnx")),
            distance_threshold: env_f32("ROLLCALL_DISTANCE_THRESHOLD", 70.0),
        }
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
