//! Face analysis: SCRFD detection followed by ArcFace embedding per face.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::session::SessionOptions;
use crate::types::Face;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// Name of the analysis model bundle directory.
pub const BUNDLE_NAME: &str = "buffalo_l";
/// Detector model inside the bundle.
pub const DETECTOR_FILE: &str = "det_10g.onnx";
/// Recognizer model inside the bundle.
pub const RECOGNIZER_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in an image.
pub trait FaceAnalysis {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Face>, AnalyzerError>;
}

/// The `buffalo_l` analysis bundle: detector plus recognizer.
pub struct FaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceAnalyzer {
    /// Load both models from a bundle directory.
    pub fn load(
        bundle_dir: &Path,
        det_size: usize,
        options: &SessionOptions,
    ) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&bundle_dir.join(DETECTOR_FILE), det_size, options)?;
        let recognizer = FaceRecognizer::load(&bundle_dir.join(RECOGNIZER_FILE), options)?;

        tracing::info!(
            bundle = %bundle_dir.display(),
            det_size,
            ctx_id = options.ctx_id,
            "face analyzer ready"
        );

        Ok(Self { detector, recognizer })
    }
}

impl FaceAnalysis for FaceAnalyzer {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Face>, AnalyzerError> {
        let boxes = self.detector.detect(image)?;

        boxes
            .into_iter()
            .map(|bbox| {
                let embedding = self.recognizer.extract(image, &bbox)?;
                Ok(Face {
                    bbox,
                    embedding: Some(embedding),
                })
            })
            .collect()
    }
}
