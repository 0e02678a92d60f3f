use std::process::{Command, Output};

const BUCKETLOAD_EXE: &str = env!("CARGO_BIN_EXE_bucketload");

fn run_with_env(vars: &[(&str, &str)]) -> Output {
    Command::new(BUCKETLOAD_EXE)
        .env_clear()
        .envs(vars.iter().copied())
        .env("BUCKETLOAD__LOGGING__FORMAT", "simplified")
        .output()
        .expect("Failed to run load generator")
}

const VALID: &[(&str, &str)] = &[
    ("ENDPOINT_HOSTNAME", "127.0.0.1"),
    ("ENDPOINT_PORT", "9"),
    ("BUCKET_NAME", "bench"),
    ("NUM_THREADS", "2"),
    ("OBJ_MEAN_KB", "1"),
    ("OBJ_STDDEV_KB", "0"),
];

fn without(key: &str) -> Vec<(&'static str, &'static str)> {
    VALID.iter().copied().filter(|(k, _)| *k != key).collect()
}

#[test]
fn missing_bucket_name_exits_early() {
    let output = run_with_env(&without("BUCKET_NAME"));

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Missing environment variable BUCKET_NAME"), "{stderr}");
    assert!(stderr.contains("Exiting early"), "{stderr}");
}

#[test]
fn non_numeric_thread_count_exits_early() {
    let mut vars = without("NUM_THREADS");
    vars.push(("NUM_THREADS", "abc"));
    let output = run_with_env(&vars);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("NUM_THREADS is not an integer value"), "{stderr}");
}

#[test]
fn all_problems_are_reported() {
    let output = run_with_env(&[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    for (key, _) in VALID {
        assert!(stderr.contains(key), "{key} not reported in {stderr}");
    }
}

#[test]
fn unreachable_storage_fails_before_workers_start() {
    // Nothing listens on the discard port, so creating the bucket fails.
    let mut vars = VALID.to_vec();
    vars.push(("IS_SECURE", "0"));
    vars.push(("BUCKETLOAD__STORAGE__REQUEST_TIMEOUT", "2s"));
    let output = run_with_env(&vars);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to start workers"), "{stderr}");
}

#[test]
fn startup_failure_is_logged() {
    let mut vars = VALID.to_vec();
    vars.push(("IS_SECURE", "0"));
    vars.push(("BUCKETLOAD__STORAGE__REQUEST_TIMEOUT", "2s"));
    let output = Command::new(BUCKETLOAD_EXE)
        .env_clear()
        .envs(vars)
        .env("BUCKETLOAD__LOGGING__FORMAT", "json")
        .output()
        .expect("Failed to run load generator");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let logged = stderr.lines().any(|line| {
        line.starts_with('{')
            && line.contains("failed to start workers")
            && line.contains("failed to create or open bucket bench")
    });
    assert!(logged, "{stderr}");
}

#[test]
fn prints_version() {
    let output = Command::new(BUCKETLOAD_EXE)
        .arg("version")
        .output()
        .expect("Failed to run load generator");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        env!("CARGO_PKG_VERSION")
    );
}
