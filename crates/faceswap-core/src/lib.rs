//! faceswap-core — Face detection, identity embedding and face swapping.
//!
//! Uses SCRFD for face detection, ArcFace for identity embeddings and
//! InSwapper for swapping, all running via ONNX Runtime.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod models;
pub mod paste;
pub mod pipeline;
pub mod recognizer;
pub mod session;
pub mod swapper;
pub mod types;

pub use analyzer::{FaceAnalysis, FaceAnalyzer};
pub use models::ModelLocator;
pub use pipeline::{swap_faces, FaceSwapRunner, PipelineError, SwapReport, SwapRequest};
pub use session::SessionOptions;
pub use swapper::{FaceSwap, InSwapper};
pub use types::{select_largest, BoundingBox, Embedding, Face};
