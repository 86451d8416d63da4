//! Live test against a real bucket.
//!
//! Loads `.env` via dotenvy, then reads:
//!   - VAN_STATIC_TEST_TARGET   (e.g. s3://my-test-bucket/van-static-ci)
//!   - AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY / AWS_REGION, or any other
//!     source the AWS SDK understands
//!   - AWS_ENDPOINT_URL         (optional, for S3-compatible services)
//!
//! If VAN_STATIC_TEST_TARGET is not set, the test is skipped.

use std::fs;

use tempfile::tempdir;
use van_static_core::{extract, Credentials, ExtractRequest, PackageIndex};

fn required_env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[test]
fn publishes_to_a_real_bucket_once() {
    let _ = dotenvy::dotenv();
    let Some(target) = required_env_var("VAN_STATIC_TEST_TARGET") else {
        eprintln!("VAN_STATIC_TEST_TARGET not set, skipping live bucket test");
        return;
    };

    let source = tempdir().unwrap();
    fs::create_dir_all(source.path().join("static")).unwrap();
    fs::write(source.path().join("static/live.css"), "a { color: blue; }\n").unwrap();
    let mut index = PackageIndex::new();
    // A fresh version per run so that the stamp never exists yet.
    let version = format!(
        "0.0.{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    );
    index.insert("van.static.live", version, source.path());

    let request = ExtractRequest {
        resources: vec!["van.static.live:static".into()],
        target,
        encodings: vec!["gzip".into()],
        credentials: Credentials {
            endpoint_url: required_env_var("AWS_ENDPOINT_URL"),
            ..Default::default()
        },
        ..Default::default()
    };

    let first = extract(&request, &index).expect("first run should upload");
    assert_eq!(first.files, 1);
    assert_eq!(first.uploads, 3);

    let second = extract(&request, &index).expect("second run should succeed");
    assert_eq!(second.skipped, 1);
    assert_eq!(second.uploads, 0);
}
