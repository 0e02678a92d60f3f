use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

/// Summarize telemetry captured during load tests.
///
/// Every data file may have the Deployment manifest of its run stored next to it, with the same
/// name and a `.yaml` extension.
#[derive(Debug, FromArgs)]
struct Args {
    /// telemetry data files, one record per line
    #[argh(positional)]
    data_files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("WARN")),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.data_files.is_empty() {
        anyhow::bail!("usage: bucketload-analyze DATA_FILE [DATA_FILE ...]");
    }

    print!("{}", bucketload_analyze::analyze(&args.data_files)?);
    Ok(())
}
