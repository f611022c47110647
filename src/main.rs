use clap::Parser;
use env_logger::Env;
use log::info;

use geotiff_reclassify::cli::Args;
use geotiff_reclassify::creation::CreationOptions;
use geotiff_reclassify::io::geotiff::GdalBackend;
use geotiff_reclassify::{reclassify, JobResult, Result};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== GeoTIFF Reclassify ===");

    let options = CreationOptions::new(&args.compression, args.tile_size)?;
    let backend = GdalBackend::new(options);
    let spec = args.job_spec();

    match spec.workers {
        Some(n) => info!("Using {} worker threads", n),
        None => info!("Using {} worker threads (default)", spec.engine_config().workers),
    }
    if let Some(fill) = spec.unmatched_fill {
        info!("Unmatched cells will be set to {}", fill);
    }

    match reclassify(&backend, &spec)? {
        JobResult::Written { outputs, windows } => {
            for output in &outputs {
                info!("Wrote {}", output.display());
            }
            info!("{} windows written", windows);
        }
        JobResult::InMemory(fields) => {
            for field in &fields {
                let (min, max) = field
                    .windows
                    .iter()
                    .flat_map(|(_, buffer)| buffer.iter().copied())
                    .filter(|v| !v.is_nan())
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(v), hi.max(v))
                    });
                info!(
                    "Field {}: {} windows, {} output, values {} to {}",
                    field.field,
                    field.windows.len(),
                    field.dtype,
                    min,
                    max
                );
            }
            info!("No output given; results were not written");
        }
    }

    info!("=== Done! ===");
    Ok(())
}
