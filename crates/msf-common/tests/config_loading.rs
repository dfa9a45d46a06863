//! ---
//! msf_section: "01-core-functionality"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Shared configuration, logging and time primitives."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use msf_common::config::AppConfig;
use msf_common::LogFormat;
use tempfile::tempdir;

fn example_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../configs/msf.example.toml")
}

#[test]
fn shipped_example_config_is_valid() {
    let raw = std::fs::read_to_string(example_path()).expect("example config present");
    let config: AppConfig = raw.parse().expect("example config parses");
    assert_eq!(config.instances.primary, "plex");
    assert_eq!(config.engine.settle_delay, Duration::from_secs(10));
    assert_eq!(config.engine.heartbeat_interval, Duration::from_secs(300));
    assert_eq!(config.logging.format, LogFormat::StructuredJson);
    assert_eq!(config.health.log_paths.len(), 2);
}

#[test]
fn first_existing_candidate_wins() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("msf.toml");
    std::fs::write(&present, "[instances]\nprimary = \"jellyfin\"\nsecondary = \"jellyfin-b\"\n")
        .unwrap();

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).unwrap();
    assert_eq!(loaded.source, present);
    assert_eq!(loaded.config.instances.primary, "jellyfin");
}

#[test]
fn no_candidates_lists_inspected_paths() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nowhere.toml");
    let err = AppConfig::load(&[missing.clone()]).unwrap_err();
    assert!(err.to_string().contains(&missing.display().to_string()));
}

#[test]
fn invalid_file_reports_its_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[instances]\nprimary = \"plex\"\nsecondary = \"plex\"\n").unwrap();
    let err = AppConfig::load(&[path.clone()]).unwrap_err();
    assert!(format!("{err:#}").contains("must differ"));
}
