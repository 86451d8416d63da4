use std::fs::write;
use std::path::PathBuf;
use tempfile::{tempdir, NamedTempFile};
use van_static::load_config::load_config;
use van_static_core::ResourceProvider;

/// A full config file loads, and relative package roots are resolved against its directory.
#[test]
fn test_load_config_full() {
    let dir = tempdir().unwrap();
    let config_yaml = r#"
target: s3://bucket/static
resources:
  - "pkg:assets/app"
  - "other:static"
minify: true
ignore_stamps: false
encodings: [gzip]
minifier: java -jar yuicompressor.jar
packages:
  pkg: { version: "2.0", root: ./pkg }
  other:
    version: "0.1"
    root: /srv/other
"#;
    let path = dir.path().join("van-static.yaml");
    write(&path, config_yaml).unwrap();

    let config = load_config(&path).expect("Config should load");

    assert_eq!(config.target.as_deref(), Some("s3://bucket/static"));
    assert_eq!(config.resources, vec!["pkg:assets/app", "other:static"]);
    assert_eq!(config.minify, Some(true));
    assert_eq!(config.ignore_stamps, Some(false));
    assert_eq!(config.encodings, vec!["gzip"]);
    assert_eq!(config.minifier.as_deref(), Some("java -jar yuicompressor.jar"));
    assert_eq!(config.packages["pkg"].root, dir.path().join("./pkg"));
    assert_eq!(config.packages["other"].root, PathBuf::from("/srv/other"));

    let index = config.package_index();
    assert_eq!(index.len(), 2);
    assert_eq!(index.distribution("pkg").unwrap().version, "2.0");
}

/// Every key is optional; flags can supply everything.
#[test]
fn test_load_config_empty_mapping() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "{}\n").unwrap();
    let config = load_config(config_file.path()).expect("Config should load");
    assert!(config.target.is_none());
    assert!(config.resources.is_empty());
    assert!(config.packages.is_empty());
}

#[test]
fn test_load_config_rejects_unknown_keys() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "target: file:///srv\naws_secret_key: nope\n").unwrap();
    let err = load_config(config_file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"), "{err}");
}

#[test]
fn test_load_config_missing_file() {
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"), "{err}");
}
