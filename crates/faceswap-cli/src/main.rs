use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use faceswap_core::{FaceSwapRunner, ModelLocator, SwapRequest};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "faceswap",
    version,
    about = "Swap the largest face of SOURCE onto every face in TARGET"
)]
struct Cli {
    /// Image providing the identity (its largest face is used)
    source: PathBuf,
    /// Image whose faces are replaced
    target: PathBuf,
    /// Where to write the result; format follows the extension
    output: PathBuf,
    /// Directory probed first for model files (overrides FACESWAP_MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Detection input size, a multiple of 32 (overrides FACESWAP_DET_SIZE)
    #[arg(long)]
    det_size: Option<usize>,
    /// CUDA device id, negative for CPU only (overrides FACESWAP_CTX_ID)
    #[arg(long, allow_negative_numbers = true)]
    ctx_id: Option<i32>,
    /// ONNX Runtime threads per model (overrides FACESWAP_THREADS)
    #[arg(long)]
    threads: Option<usize>,
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn config(&self, mut base: Config) -> Config {
        if let Some(dir) = &self.model_dir {
            base.model_dir = Some(dir.clone());
        }
        if let Some(size) = self.det_size {
            base.det_size = size;
        }
        if let Some(id) = self.ctx_id {
            base.ctx_id = id;
        }
        if let Some(threads) = self.threads {
            base.intra_threads = threads;
        }
        base
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            print!("{e}");
            return ExitCode::from(2);
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("face swap failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config(Config::from_env());
    tracing::debug!(?config, "configuration loaded");

    let locator = ModelLocator::from_process()?.with_override(config.model_dir.clone());
    let runner = FaceSwapRunner::new(locator)
        .with_det_size(config.det_size)
        .with_session_options(config.session_options());

    let request = SwapRequest {
        source: cli.source.clone(),
        target: cli.target.clone(),
        output: cli.output.clone(),
    };

    let report = runner.run(&request)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Swapped {} face(s) in {}; result saved to {}",
            report.target_faces,
            report.target.display(),
            report.output.display()
        );
    }

    Ok(())
}
