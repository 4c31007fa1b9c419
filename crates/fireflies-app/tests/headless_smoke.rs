use std::process::Command;

#[test]
fn headless_run_writes_a_report() {
    let dir = tempfile::tempdir().expect("temp dir");
    let report_path = dir.path().join("reports").join("run.json");

    let status = Command::new(env!("CARGO_BIN_EXE_fireflies-app"))
        .args(["--seconds", "1.5", "--poll-ms", "50", "--lanterns", "2"])
        .args(["--seed", "11", "--max", "40", "--target", "20", "--initial", "10"])
        .arg("--report")
        .arg(&report_path)
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run fireflies-app binary");
    assert!(status.success(), "headless run failed");

    let raw = std::fs::read_to_string(&report_path).expect("report written");
    let report: serde_json::Value = serde_json::from_str(&raw).expect("report is json");
    let summary = &report["summary"];
    assert!(summary["sample_count"].as_u64().unwrap_or(0) > 0);
    assert!(summary["peak_count"].as_u64().unwrap_or(u64::MAX) <= 40);
    assert!(summary["spawned_total"].as_u64().unwrap_or(0) >= 10);
    assert_eq!(summary["lanterns"].as_u64(), Some(2));
    assert!(report["analyses"].as_array().is_some_and(|a| !a.is_empty()));
}

#[test]
fn rejects_an_invalid_population() {
    let status = Command::new(env!("CARGO_BIN_EXE_fireflies-app"))
        .args(["--seconds", "0.1", "--max", "5", "--target", "10"])
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run fireflies-app binary");
    assert!(!status.success());
}
