//! Local model discovery.
//!
//! Models are never downloaded: each file is looked up in a fixed, ordered
//! list of directories and the first hit wins.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Subfolder of the working directory that holds the swap model.
const MODEL_SUBDIR: &str = "bot";
/// Subfolder that holds analysis bundles.
const BUNDLES_SUBDIR: &str = "models";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("{name} not found; probed:\n{}", display_paths(.probed))]
    NotFound { name: String, probed: Vec<PathBuf> },
    #[error("cannot determine working directory: {0}")]
    Io(#[from] std::io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ordered set of directories probed for model files.
#[derive(Debug, Clone)]
pub struct ModelLocator {
    override_dir: Option<PathBuf>,
    cwd: PathBuf,
    exe_dir: Option<PathBuf>,
    home: Option<PathBuf>,
}

impl ModelLocator {
    pub fn new(cwd: PathBuf, exe_dir: Option<PathBuf>, home: Option<PathBuf>) -> Self {
        Self {
            override_dir: None,
            cwd,
            exe_dir,
            home,
        }
    }

    /// Locator for the running process: working directory, executable
    /// directory and `$HOME`.
    pub fn from_process() -> Result<Self, ModelError> {
        let cwd = std::env::current_dir()?;
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Ok(Self::new(cwd, exe_dir, home))
    }

    /// Probe `dir` before every default location.
    pub fn with_override(mut self, dir: Option<PathBuf>) -> Self {
        self.override_dir = dir;
        self
    }

    /// Candidate paths for a single model file, in probe order.
    pub fn model_candidates(&self, file: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(4);
        if let Some(dir) = &self.override_dir {
            candidates.push(dir.join(file));
        }
        candidates.push(self.cwd.join(MODEL_SUBDIR).join(file));
        if let Some(dir) = &self.exe_dir {
            candidates.push(dir.join(file));
        }
        candidates.push(self.cwd.join(file));
        candidates
    }

    /// First existing candidate for `file`.
    pub fn resolve_model(&self, file: &str) -> Result<PathBuf, ModelError> {
        let probed = self.model_candidates(file);
        match probed.iter().find(|p| p.is_file()) {
            Some(found) => {
                tracing::info!(file, path = %found.display(), "model resolved");
                Ok(found.clone())
            }
            None => Err(ModelError::NotFound {
                name: file.to_string(),
                probed,
            }),
        }
    }

    /// Candidate directories for a model bundle, in probe order.
    pub fn bundle_candidates(&self, bundle: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(4);
        if let Some(dir) = &self.override_dir {
            candidates.push(dir.join(bundle));
        }
        candidates.push(self.cwd.join(BUNDLES_SUBDIR).join(bundle));
        if let Some(dir) = &self.exe_dir {
            candidates.push(dir.join(bundle));
        }
        if let Some(home) = &self.home {
            candidates.push(home.join(".insightface").join(BUNDLES_SUBDIR).join(bundle));
        }
        candidates
    }

    /// First candidate directory containing every file in `required`.
    pub fn resolve_bundle(&self, bundle: &str, required: &[&str]) -> Result<PathBuf, ModelError> {
        let probed = self.bundle_candidates(bundle);
        let found = probed
            .iter()
            .find(|dir| required.iter().all(|f| dir.join(f).is_file()));

        match found {
            Some(dir) => {
                tracing::info!(bundle, path = %dir.display(), "model bundle resolved");
                Ok(dir.clone())
            }
            None => Err(ModelError::NotFound {
                name: format!("{bundle} ({})", required.join(", ")),
                probed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"onnx").unwrap();
    }

    #[test]
    fn test_candidate_order() {
        let locator = ModelLocator::new("/work".into(), Some("/opt/bin".into()), None)
            .with_override(Some("/models".into()));
        assert_eq!(
            locator.model_candidates("m.onnx"),
            vec![
                PathBuf::from("/models/m.onnx"),
                PathBuf::from("/work/bot/m.onnx"),
                PathBuf::from("/opt/bin/m.onnx"),
                PathBuf::from("/work/m.onnx"),
            ]
        );
    }

    #[test]
    fn test_resolve_prefers_bot_subdir() {
        let dir = tempdir().unwrap();
        let cwd = dir.path().to_path_buf();
        touch(&cwd.join("bot/m.onnx"));
        touch(&cwd.join("models/m.onnx"));
        touch(&cwd.join("m.onnx"));

        let locator = ModelLocator::new(cwd.clone(), None, None);
        assert_eq!(locator.resolve_model("m.onnx").unwrap(), cwd.join("bot/m.onnx"));
    }

    #[test]
    fn test_resolve_falls_back_to_exe_dir_then_cwd() {
        let dir = tempdir().unwrap();
        let cwd = dir.path().join("cwd");
        let exe = dir.path().join("bin");
        touch(&cwd.join("m.onnx"));

        let locator = ModelLocator::new(cwd.clone(), Some(exe.clone()), None);
        assert_eq!(locator.resolve_model("m.onnx").unwrap(), cwd.join("m.onnx"));

        touch(&exe.join("m.onnx"));
        assert_eq!(locator.resolve_model("m.onnx").unwrap(), exe.join("m.onnx"));
    }

    #[test]
    fn test_resolve_not_found_lists_every_probed_path() {
        let dir = tempdir().unwrap();
        let locator = ModelLocator::new(dir.path().into(), Some(dir.path().join("bin")), None);

        let err = locator.resolve_model("missing.onnx").unwrap_err();
        let ModelError::NotFound { name, probed } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(name, "missing.onnx");
        assert_eq!(probed, &locator.model_candidates("missing.onnx"));
        assert_eq!(probed.len(), 3);

        let message = err.to_string();
        for p in probed {
            assert!(message.contains(&p.display().to_string()), "{message}");
        }
    }

    #[test]
    fn test_directory_with_model_name_is_not_a_model() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bot/m.onnx")).unwrap();
        let locator = ModelLocator::new(dir.path().into(), None, None);
        assert!(locator.resolve_model("m.onnx").is_err());
    }

    #[test]
    fn test_resolve_bundle_requires_all_files() {
        let dir = tempdir().unwrap();
        let home = dir.path().join("home");
        let cwd = dir.path().join("cwd");
        // Incomplete bundle in cwd, complete one under ~/.insightface.
        touch(&cwd.join("models/buffalo_l/det_10g.onnx"));
        let complete = home.join(".insightface/models/buffalo_l");
        touch(&complete.join("det_10g.onnx"));
        touch(&complete.join("w600k_r50.onnx"));

        let locator = ModelLocator::new(cwd, None, Some(home));
        let found = locator
            .resolve_bundle("buffalo_l", &["det_10g.onnx", "w600k_r50.onnx"])
            .unwrap();
        assert_eq!(found, complete);
    }

    #[test]
    fn test_resolve_bundle_not_found() {
        let dir = tempdir().unwrap();
        let locator = ModelLocator::new(dir.path().into(), None, None);
        let err = locator.resolve_bundle("buffalo_l", &["det_10g.onnx"]).unwrap_err();
        assert!(matches!(err, ModelError::NotFound { ref probed, .. } if probed.len() == 1));
    }
}
