use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio_util::sync::CancellationToken;

use bucketload_generator::cli::shutdown_on_signal;

#[tokio::test]
async fn sigint_cancels_the_run() {
    let token = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(token.clone()));

    // Give the handlers time to register, or else the signal kills the test.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!token.is_cancelled());

    let pid = Pid::from_raw(std::process::id() as i32);
    signal::kill(pid, Signal::SIGINT).expect("Failed to send SIGINT");

    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
        .await
        .expect("run was not cancelled");
}
