//! Log capture for tests.

use tracing_subscriber::EnvFilter;

const CRATE_NAMES: &[&str] = &[
    "bucketload_generator",
    "bucketload_storage",
    "bucketload_types",
];

/// Initialize the logger for testing.
///
/// Logs go to the output captured by the Rust test runner. Unless `RUST_LOG` says otherwise,
/// only the bucketload crates log, at `DEBUG`, since per-upload `INFO` lines of long running
/// tests are rarely useful on their own.
///
/// # Example
///
/// ```
/// bucketload_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        CRATE_NAMES
            .iter()
            .fold(EnvFilter::new("WARN"), |filter, name| {
                filter.add_directive(format!("{name}=DEBUG").parse().unwrap())
            })
    });

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
