//! End-to-end swap: resolve models, load them, detect, swap, write.

use crate::analyzer::{AnalyzerError, FaceAnalysis, FaceAnalyzer, BUNDLE_NAME, DETECTOR_FILE, RECOGNIZER_FILE};
use crate::detector::SCRFD_DEFAULT_INPUT_SIZE;
use crate::models::{ModelError, ModelLocator};
use crate::session::SessionOptions;
use crate::swapper::{FaceSwap, InSwapper, SwapperError, SWAP_MODEL_FILE};
use crate::types::{select_largest, BoundingBox};
use image::{ImageFormat, ImageReader, RgbImage};
use serde::Serialize;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Which of the two input images an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Source,
    Target,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Source => f.write_str("source"),
            ImageRole::Target => f.write_str("target"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    ModelNotFound(#[from] ModelError),
    #[error("cannot read {role} image {}: {source}", .path.display())]
    ImageDecode {
        role: ImageRole,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no face detected in {role} image {}", .path.display())]
    NoFaceDetected { role: ImageRole, path: PathBuf },
    #[error("face analysis failed: {0}")]
    Analysis(#[from] AnalyzerError),
    #[error("face swap failed: {0}")]
    Swap(#[from] SwapperError),
    #[error("cannot encode output image {}: {source}", .path.display())]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Input and output paths of one run.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub source: PathBuf,
    pub target: PathBuf,
    pub output: PathBuf,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct SwapReport {
    pub source: PathBuf,
    pub target: PathBuf,
    pub output: PathBuf,
    pub source_faces: usize,
    pub target_faces: usize,
    /// The largest source face, whose identity was applied.
    pub source_face: BoundingBox,
    pub elapsed_ms: u64,
}

/// Resolves and loads the models, then runs [`swap_faces`].
pub struct FaceSwapRunner {
    locator: ModelLocator,
    det_size: usize,
    session: SessionOptions,
}

impl FaceSwapRunner {
    pub fn new(locator: ModelLocator) -> Self {
        Self {
            locator,
            det_size: SCRFD_DEFAULT_INPUT_SIZE,
            session: SessionOptions::default(),
        }
    }

    pub fn with_det_size(mut self, det_size: usize) -> Self {
        self.det_size = det_size;
        self
    }

    pub fn with_session_options(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    pub fn run(&self, request: &SwapRequest) -> Result<SwapReport, PipelineError> {
        let swap_model = self.locator.resolve_model(SWAP_MODEL_FILE)?;

        let bundle = self
            .locator
            .resolve_bundle(BUNDLE_NAME, &[DETECTOR_FILE, RECOGNIZER_FILE])?;
        let mut analyzer = FaceAnalyzer::load(&bundle, self.det_size, &self.session)?;
        let mut swapper = InSwapper::load(&swap_model, &self.session)?;

        swap_faces(&mut analyzer, &mut swapper, request)
    }
}

/// Swap the largest source face onto every target face and write the result.
///
/// The output file is only touched once every face has been swapped and the
/// image has been encoded.
pub fn swap_faces<A, S>(
    analyzer: &mut A,
    swapper: &mut S,
    request: &SwapRequest,
) -> Result<SwapReport, PipelineError>
where
    A: FaceAnalysis + ?Sized,
    S: FaceSwap + ?Sized,
{
    let started = Instant::now();

    let source = decode_image(&request.source, ImageRole::Source)?;
    let target = decode_image(&request.target, ImageRole::Target)?;

    let source_faces = analyzer.detect(&source)?;
    let source_face = select_largest(&source_faces).ok_or_else(|| PipelineError::NoFaceDetected {
        role: ImageRole::Source,
        path: request.source.clone(),
    })?;
    tracing::info!(
        count = source_faces.len(),
        x = source_face.bbox.x,
        y = source_face.bbox.y,
        width = source_face.bbox.width,
        height = source_face.bbox.height,
        "selected largest source face"
    );

    let target_faces = analyzer.detect(&target)?;
    if target_faces.is_empty() {
        return Err(PipelineError::NoFaceDetected {
            role: ImageRole::Target,
            path: request.target.clone(),
        });
    }
    tracing::info!(count = target_faces.len(), "target faces detected");

    let mut result = target;
    for (i, face) in target_faces.iter().enumerate() {
        result = swapper.swap(&result, face, source_face)?;
        tracing::debug!(face = i, confidence = face.bbox.confidence, "face swapped");
    }

    write_image(&result, &request.output)?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(output = %request.output.display(), elapsed_ms, "result written");

    Ok(SwapReport {
        source: request.source.clone(),
        target: request.target.clone(),
        output: request.output.clone(),
        source_faces: source_faces.len(),
        target_faces: target_faces.len(),
        source_face: source_face.bbox.clone(),
        elapsed_ms,
    })
}

/// Format comes from the file content, falling back to the extension.
fn decode_image(path: &Path, role: ImageRole) -> Result<RgbImage, PipelineError> {
    let decode_err = |source: image::ImageError| PipelineError::ImageDecode {
        role,
        path: path.to_path_buf(),
        source,
    };
    let image = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?
        .decode()
        .map_err(decode_err)?;
    tracing::debug!(%role, path = %path.display(), width = image.width(), height = image.height(), "image decoded");
    Ok(image.to_rgb8())
}

/// Encode in memory first so a failed encode never leaves a partial file.
fn write_image(image: &RgbImage, path: &Path) -> Result<(), PipelineError> {
    let encode_err = |source| PipelineError::ImageEncode {
        path: path.to_path_buf(),
        source,
    };
    let format = ImageFormat::from_path(path).map_err(encode_err)?;

    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).map_err(encode_err)?;

    std::fs::write(path, buf.into_inner()).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })
}
