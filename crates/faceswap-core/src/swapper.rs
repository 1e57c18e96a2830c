//! InSwapper face swapping via ONNX Runtime.
//!
//! The model takes a 128×128 aligned target crop and a source identity
//! latent, and generates the crop with the source identity. The latent is the
//! source ArcFace embedding projected through `emap`, a 512×512 matrix stored
//! as the last initializer of the model graph.

use crate::alignment;
use crate::paste;
use crate::recognizer::l2_normalize;
use crate::session::{self, SessionOptions};
use crate::types::Face;
use candle_onnx::onnx;
use image::RgbImage;
use ndarray::{Array2, Array4, ArrayView1, Axis};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Swap model file name.
pub const SWAP_MODEL_FILE: &str = "inswapper_128.onnx";
const INSWAPPER_INPUT_SIZE: usize = 128;

#[derive(Error, Debug)]
pub enum SwapperError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("embedding projection: {0}")]
    Emap(String),
    #[error("target face has no landmarks — detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("source face has no embedding")]
    NoEmbedding,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Replaces the identity of one face in an image.
pub trait FaceSwap {
    /// Return a copy of `target` where `target_face` carries the identity of
    /// `source_face`, pasted back into the full frame.
    fn swap(
        &mut self,
        target: &RgbImage,
        target_face: &Face,
        source_face: &Face,
    ) -> Result<RgbImage, SwapperError>;
}

/// `inswapper_128` model handle.
pub struct InSwapper {
    session: Session,
    emap: Array2<f32>,
}

impl InSwapper {
    /// Load the swap model and its embedding projection matrix.
    pub fn load(model_path: &Path, options: &SessionOptions) -> Result<Self, SwapperError> {
        if !model_path.exists() {
            return Err(SwapperError::ModelNotFound(model_path.display().to_string()));
        }

        let model = candle_onnx::read_file(model_path)
            .map_err(|e| SwapperError::Emap(format!("reading model graph: {e}")))?;
        let emap = emap_from_model(&model)?;

        let session = session::open(model_path, options)?;

        tracing::info!(
            path = %model_path.display(),
            emap = ?emap.dim(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded InSwapper model"
        );

        Ok(Self { session, emap })
    }
}

impl FaceSwap for InSwapper {
    fn swap(
        &mut self,
        target: &RgbImage,
        target_face: &Face,
        source_face: &Face,
    ) -> Result<RgbImage, SwapperError> {
        let landmarks = target_face.landmarks().ok_or(SwapperError::NoLandmarks)?;
        let embedding = source_face.embedding.as_ref().ok_or(SwapperError::NoEmbedding)?;

        let (crop, matrix) = alignment::align_face(target, landmarks, INSWAPPER_INPUT_SIZE);
        let blob = to_blob(&crop);
        let latent = project_latent(&embedding.values, &self.emap)?;

        let outputs = self.session.run(ort::inputs![
            "target" => TensorRef::from_array_view(blob.view())?,
            "source" => TensorRef::from_array_view(latent.view())?,
        ])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SwapperError::InferenceFailed(format!("swap output: {e}")))?;
        let fake = decode_output(data, INSWAPPER_INPUT_SIZE)?;

        Ok(paste::paste_back(target, &fake, INSWAPPER_INPUT_SIZE, &matrix))
    }
}

/// Read `emap` from the last graph initializer.
fn emap_from_model(model: &onnx::ModelProto) -> Result<Array2<f32>, SwapperError> {
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| SwapperError::Emap("model has no graph".into()))?;
    let tensor = graph
        .initializer
        .last()
        .ok_or_else(|| SwapperError::Emap("graph has no initializers".into()))?;
    tensor_to_matrix(tensor)
}

fn tensor_to_matrix(tensor: &onnx::TensorProto) -> Result<Array2<f32>, SwapperError> {
    let &[rows, cols] = tensor.dims.as_slice() else {
        return Err(SwapperError::Emap(format!(
            "initializer '{}' has dims {:?}, expected a matrix",
            tensor.name, tensor.dims
        )));
    };
    if tensor.data_type != onnx::tensor_proto::DataType::Float as i32 {
        return Err(SwapperError::Emap(format!(
            "initializer '{}' has data type {}, expected float",
            tensor.name, tensor.data_type
        )));
    }

    let values: Vec<f32> = if tensor.raw_data.is_empty() {
        tensor.float_data.clone()
    } else {
        tensor
            .raw_data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    };

    Array2::from_shape_vec((rows as usize, cols as usize), values)
        .map_err(|e| SwapperError::Emap(format!("initializer '{}': {e}", tensor.name)))
}

/// `normalize(embedding · emap)` as a 1×N batch.
fn project_latent(embedding: &[f32], emap: &Array2<f32>) -> Result<Array2<f32>, SwapperError> {
    if embedding.len() != emap.nrows() {
        return Err(SwapperError::Emap(format!(
            "embedding has {} values, emap expects {}",
            embedding.len(),
            emap.nrows()
        )));
    }
    let projected = ArrayView1::from(embedding).dot(emap);
    let normalized = l2_normalize(projected.to_vec());
    Ok(ArrayView1::from(&normalized[..]).insert_axis(Axis(0)).to_owned())
}

/// RGB crop → NCHW tensor scaled to [0, 1].
fn to_blob(crop: &RgbImage) -> Array4<f32> {
    let (w, h) = (crop.width() as usize, crop.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, px) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = px[c] as f32 / 255.0;
        }
    }
    tensor
}

/// NCHW model output in [0, 1] → interleaved RGB in [0, 255].
fn decode_output(data: &[f32], size: usize) -> Result<Vec<f32>, SwapperError> {
    let plane = size * size;
    if data.len() != 3 * plane {
        return Err(SwapperError::InferenceFailed(format!(
            "expected {} output values (1×3×{size}×{size}), got {}",
            3 * plane,
            data.len()
        )));
    }

    let mut rgb = vec![0.0f32; 3 * plane];
    for i in 0..plane {
        for c in 0..3 {
            rgb[i * 3 + c] = (data[c * plane + i] * 255.0).clamp(0.0, 255.0);
        }
    }
    Ok(rgb)
}
