use std::time::Duration;

use assert_matches::assert_matches;

use phendb::config::ConfigLoader;
use phendb::error::PhenError;

#[test]
fn loads_json_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("phendb.json");
    std::fs::write(
        &path,
        r#"{
            "base_dir": "/apps/phenDB",
            "days_back": 14,
            "pica_cutoff": 0.75,
            "node_offs": "node03,node07",
            "workers": 2,
            "wait_limit_secs": 600
        }"#,
    )
    .unwrap();

    let settings = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(settings.base_dir, "/apps/phenDB");
    assert_eq!(settings.days_back, 14);
    assert_eq!(settings.pica_cutoff, 0.75);
    assert_eq!(settings.node_offs, "node03,node07");
    assert_eq!(settings.workers, 2);
    assert_eq!(settings.wait_limit, Duration::from_secs(600));
    assert_eq!(settings.pipeline_program, "nextflow");
    assert_eq!(settings.poll_interval, Duration::from_secs(10));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, PhenError::ConfigRead(_));
}

#[test]
fn malformed_json_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("phendb.json");
    std::fs::write(&path, "{ days_back: 3 }").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, PhenError::ConfigParse(_));
}

#[test]
fn zero_workers_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("phendb.json");
    std::fs::write(&path, r#"{"base_dir": "/srv", "workers": 0}"#).unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, PhenError::InvalidConfig(_));
}
