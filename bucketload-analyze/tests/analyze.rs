use std::path::PathBuf;

use tempfile::TempDir;

const RUN_A: &str = "\
pod-1,1536593412.5,s3.example.com,bench,1048576,0.25,
pod-2,1536593413.0,s3.example.com,bench,-1,1.5,connection refused
pod-1,1536593425.0,s3.example.com,bench,1048576,0.5,
";

const RUN_B: &str = "\
hostname,timestamp,endpoint,bucket,size,duration,error
pod-9,1536600000.0,ceph.example.com,bench,2048,0.125,
";

const MANIFEST_A: &str = "
spec:
  replicas: 2
  template:
    spec:
      containers:
        - env:
            - name: ENDPOINT_HOSTNAME
              value: s3.example.com
            - name: NUM_THREADS
              value: \"16\"
";

fn write_fixtures() -> (TempDir, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("data_a.csv");
    let b = dir.path().join("data_b.csv");
    std::fs::write(&a, RUN_A).unwrap();
    std::fs::write(dir.path().join("data_a.yaml"), MANIFEST_A).unwrap();
    std::fs::write(&b, RUN_B).unwrap();
    (dir, vec![a, b])
}

#[test]
fn reports_every_dataset() {
    yansi::disable();
    let (_dir, paths) = write_fixtures();

    let report = bucketload_analyze::analyze(&paths).unwrap();

    assert!(report.contains("## s3.example.com 2p*16t"), "{report}");
    assert!(report.contains("(3 requests, 1 ERRORS, 33.33%)"), "{report}");
    assert!(report.contains("connection refused: 0.1 0.0"), "{report}");
    assert!(report.contains("## ceph.example.com ?p*?t"), "{report}");
    assert!(report.contains("(1 requests)"), "{report}");
}

#[test]
fn missing_data_file_is_an_error() {
    let (dir, mut paths) = write_fixtures();
    paths.push(dir.path().join("missing.csv"));

    let error = bucketload_analyze::analyze(&paths).unwrap_err();
    assert!(error.to_string().contains("missing.csv"));
}
