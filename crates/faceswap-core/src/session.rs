//! Shared ONNX Runtime session construction.

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;

/// Execution settings shared by every model in a run.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Backend selector: `>= 0` requests that CUDA device, negative means CPU only.
    pub ctx_id: i32,
    /// ONNX Runtime intra-op thread count.
    pub intra_threads: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ctx_id: 0,
            intra_threads: 2,
        }
    }
}

/// Open an ONNX model with the configured execution provider.
///
/// ONNX Runtime keeps CPU as the final provider, so a missing CUDA runtime
/// degrades to CPU inference rather than failing.
pub fn open(model_path: &Path, options: &SessionOptions) -> ort::Result<Session> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(options.intra_threads)?;

    let builder = if options.ctx_id >= 0 {
        builder.with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(options.ctx_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])?
    } else {
        builder.with_execution_providers([CPUExecutionProvider::default().build()])?
    };

    builder.commit_from_file(model_path)
}
