use std::fs;

use symscore::config::{load_files, ConfigSources};
use symscore::{ConfigError, ShiftPolicy, SymscoreConfig};

#[test]
fn later_files_override_earlier_ones() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.toml");
    let local = dir.path().join("local.toml");
    fs::write(
        &base,
        "[parse]\nderive_pedals = false\n\n[encode]\nrunning_status = false\n",
    )
    .unwrap();
    fs::write(&local, "[encode]\nrunning_status = true\n\n[edit]\nclamp_negative_times = true\n")
        .unwrap();

    let (config, sources) = load_files(&[base.clone(), local.clone()]).unwrap();
    assert!(!config.parse.derive_pedals);
    assert!(config.encode.running_status);
    assert!(config.encode.note_off_as_zero_velocity);
    assert_eq!(config.edit.shift_policy(), ShiftPolicy::ClampToZero);
    assert_eq!(sources.files, vec![base, local]);
}

#[test]
fn no_files_gives_defaults() {
    let (config, sources) = load_files(&[]).unwrap();
    assert_eq!(config, SymscoreConfig::default());
    assert!(sources.files.is_empty());
}

#[test]
fn bad_toml_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[encode\nrunning_status = ").unwrap();

    match load_files(&[path.clone()]) {
        Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn wrong_value_type_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typed.toml");
    fs::write(&path, "[parse]\nderive_pedals = \"sometimes\"\n").unwrap();
    assert!(matches!(
        load_files(&[path]),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(matches!(
        load_files(&[path]),
        Err(ConfigError::FileRead { .. })
    ));
}

#[test]
fn explicit_path_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("symscore.toml");
    fs::write(&path, "[encode]\nnote_off_as_zero_velocity = false\n").unwrap();

    let (config, sources): (SymscoreConfig, ConfigSources) =
        SymscoreConfig::load_with_sources_from(Some(&path)).unwrap();
    assert!(sources.files.contains(&path));
    if !sources
        .env_overrides
        .iter()
        .any(|k| k == "SYMSCORE_NOTE_OFF_AS_ZERO_VELOCITY")
    {
        assert!(!config.encode.note_off_as_zero_velocity);
    }
}
