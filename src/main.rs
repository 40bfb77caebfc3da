// Command-line runner for the `ppm_blur` library:
//
//     ppm_blur <input.ppm> <output.ppm>
//
// Tuning comes from the environment (BLUR_AMOUNT, BLUR_WORKERS,
// BLUR_PIXELS_PER_LINE) and log verbosity from RUST_LOG.

use anyhow::Context;
use log::{error, info};
use ppm_blur::{ParallelPipeline, PipelineConfig, PipelineError};
use std::env;
use std::process::ExitCode;

const USAGE_EXIT_CODE: u8 = 64;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        let program = args.first().map(String::as_str).unwrap_or("ppm_blur");
        eprintln!("Usage: {} <input_file.ppm> <output_file.ppm>", program);
        return Ok(ExitCode::from(USAGE_EXIT_CODE));
    }
    let (input_path, output_path) = (&args[1], &args[2]);

    let config = PipelineConfig::from_env();
    info!("configuration: {:?}", config);

    // --- 2. Blur ---
    let pipeline = ParallelPipeline::new(config);
    let outcome = pipeline
        .run(input_path, output_path)
        .await
        .with_context(|| format!("could not blur {}", input_path));
    pipeline.shutdown().await;

    match outcome {
        Ok(report) => {
            info!(
                "blurred {}x{} (amount {}) on {} workers: decode {:?}, blur {:?}, encode {:?}, total {:?}",
                report.width,
                report.height,
                report.blur_amount,
                report.workers,
                report.decode_time,
                report.blur_time,
                report.encode_time,
                report.total_time()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("{:#}", err);
            let code = err.downcast_ref::<PipelineError>().map_or(1, PipelineError::exit_code);
            Ok(ExitCode::from(code))
        }
    }
}
