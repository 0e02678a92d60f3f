use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Logging};
use crate::telemetry::{self, UdpCollector};
use crate::{observability, pool};

/// Parallel object-storage load generator.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Version(VersionCommand),
}

/// upload objects until interrupted (default)
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// print the load generator version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Some(Command::Version(_)) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            observability::initialize_tracing(&Logging::default());
            for error in &errors {
                tracing::error!("{error}");
            }
            tracing::error!("Exiting early");
            return Err(errors.into());
        }
    };

    observability::initialize_tracing(&config.logging);
    tracing::debug!(?config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("worker-rt")
        .enable_all()
        .worker_threads(config.num_workers)
        .build()?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        tokio::spawn(shutdown_on_signal(cancel.clone()));

        let storage = bucketload_storage::connect(config.storage_config());
        let result = pool::run(
            config.pool_settings(),
            storage,
            Arc::new(UdpCollector::default()),
            telemetry::node_name(),
            cancel,
        )
        .await;

        if let Err(ref error) = result {
            tracing::error!(error = error as &dyn std::error::Error, "failed to start workers");
        }
        result.context("failed to start workers")
    })
}

/// Cancels `token` on the first SIGINT or SIGTERM.
pub async fn shutdown_on_signal(token: CancellationToken) {
    let guard = elegant_departure::get_shutdown_guard();
    tokio::spawn(async {
        elegant_departure::tokio::depart()
            .on_termination()
            .on_sigint()
            .await
    });

    guard.wait().await;
    tracing::info!("shutting down");
    token.cancel();
}
