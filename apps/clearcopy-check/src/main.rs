//! Clearcopy Check
//!
//! Clears an off-screen image to yellow, copies it into host-visible memory
//! and verifies the pixel read back on the CPU.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p clearcopy-check -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--validation` / `--no-validation`: Toggle the Khronos validation layer
//! - `--full-check`: Verify every pixel instead of only the first
//! - `-o, --output <PATH>`: Save the readback surface as an image
//! - `--timeout-ms <N>`: Fence wait timeout (default: wait forever)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)
//!
//! Build with `--features profiling-tracy` to stream spans to Tracy.

use clearcopy_pipeline::{run, PipelineConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    init_tracing();

    let config = PipelineConfig::from_args();
    info!(
        "Starting clearcopy check (validation: {}, full check: {})",
        config.validation, config.verify_full_surface
    );

    match run(config) {
        Ok(report) => {
            info!("Readback OK: {:#010x}", report.pixel.packed());
            if let Some(path) = &report.saved_to {
                info!("Surface written to {}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            error!("Check failed: {e}");
            Err(e.into())
        }
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(feature = "profiling-tracy")]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

fn print_help() {
    eprintln!(
        "Clearcopy Check

Clears a 400x400 R8G8B8A8 image to yellow inside a render pass, copies it into
host-visible memory and verifies the first pixel reads back as 0xff00ffff.

USAGE:
    cargo run -p clearcopy-check -- [OPTIONS]

OPTIONS:
    --validation            Enable the Khronos validation layer
                            Default: on in debug builds
    --no-validation         Disable the Khronos validation layer
    --full-check            Verify every pixel of the readback surface
    -o, --output <PATH>     Save the readback surface (format from extension)
    --timeout-ms <N>        Fence wait timeout in milliseconds
                            Default: wait forever
    -h, --help              Print this help message

EXAMPLES:
    # Basic check
    cargo run -p clearcopy-check

    # Verify the whole surface and keep a copy of it
    cargo run -p clearcopy-check -- --full-check -o readback.png

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
