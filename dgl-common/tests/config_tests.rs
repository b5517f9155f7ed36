//! Configuration resolution: environment over TOML over defaults
//!
//! Tests touching `DGL_*` variables are marked #[serial] so they do not race.

use dgl_common::config::{locate_config_file, service_credential, DglConfig};
use dgl_common::Error;
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::time::Duration;

const VARS: &[&str] = &[
    "DGL_CONFIG",
    "DGL_STORE_PATH",
    "DGL_MANIFEST_PATH",
    "DGL_ASSETS_DIR",
    "DGL_EXPORT_DIR",
    "DGL_ADMIN_EMAILS",
    "DGL_DEBOUNCE_MS",
    "DGL_POLL_INTERVAL_MS",
    "DGL_LOG_LEVEL",
    "DGL_SERVICE_CREDENTIAL",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("dgl.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_toml_overrides_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        store_path = "/srv/dgl/labels.db"
        debounce_ms = 350
        "#,
    );

    let config = DglConfig::load(Some(&path)).unwrap();
    assert_eq!(config.store_path, PathBuf::from("/srv/dgl/labels.db"));
    assert_eq!(config.debounce(), Duration::from_millis(350));
    assert_eq!(config.poll_interval(), Duration::from_millis(500));
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        store_path = "from-toml.db"
        admin_emails = ["toml@example.org"]
        "#,
    );
    std::env::set_var("DGL_STORE_PATH", "from-env.db");
    std::env::set_var("DGL_ADMIN_EMAILS", " a@example.org, ,B@example.org ");
    std::env::set_var("DGL_LOG_LEVEL", "debug");

    let config = DglConfig::load(Some(&path)).unwrap();
    assert_eq!(config.store_path, PathBuf::from("from-env.db"));
    assert_eq!(
        config.admin_emails,
        vec!["a@example.org".to_string(), "B@example.org".to_string()]
    );
    assert_eq!(config.logging.level, "debug");

    clear_env();
}

#[test]
#[serial]
fn test_config_env_var_names_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "export_dir = \"out\"\n");
    std::env::set_var("DGL_CONFIG", &path);

    assert_eq!(locate_config_file(None).unwrap(), Some(path.clone()));
    let config = DglConfig::load(None).unwrap();
    assert_eq!(config.export_dir, PathBuf::from("out"));

    clear_env();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let err = DglConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_unparsable_file_is_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "debounce_ms = [1, 2");
    assert!(matches!(DglConfig::load(Some(&path)).unwrap_err(), Error::Config(_)));
}

#[test]
#[serial]
fn test_invalid_env_number_is_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "");
    std::env::set_var("DGL_DEBOUNCE_MS", "soon");

    let err = DglConfig::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("DGL_DEBOUNCE_MS"));

    clear_env();
}

#[test]
#[serial]
fn test_service_credential_required() {
    clear_env();
    assert!(matches!(service_credential().unwrap_err(), Error::Config(_)));

    std::env::set_var("DGL_SERVICE_CREDENTIAL", "s3cret");
    assert_eq!(service_credential().unwrap(), "s3cret");

    clear_env();
}
