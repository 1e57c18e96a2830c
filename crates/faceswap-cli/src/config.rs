use faceswap_core::detector::SCRFD_DEFAULT_INPUT_SIZE;
use faceswap_core::SessionOptions;
use std::path::PathBuf;

/// Run configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory probed before the default model locations.
    pub model_dir: Option<PathBuf>,
    /// Square SCRFD input resolution.
    pub det_size: usize,
    /// Execution context: CUDA device id, or negative for CPU only.
    pub ctx_id: i32,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `FACESWAP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = SessionOptions::default();
        Self {
            model_dir: lookup("FACESWAP_MODEL_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            det_size: parsed(&lookup, "FACESWAP_DET_SIZE", SCRFD_DEFAULT_INPUT_SIZE),
            ctx_id: parsed(&lookup, "FACESWAP_CTX_ID", defaults.ctx_id),
            intra_threads: parsed(&lookup, "FACESWAP_THREADS", defaults.intra_threads),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            ctx_id: self.ctx_id,
            intra_threads: self.intra_threads,
        }
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
