//! Tests for run configuration.

use flowtag::settings::{DEBUG_FILE, data_path};
use flowtag::testing::{TempFilePath, write_lines};
use flowtag::{ExecMode, Settings};
use std::collections::HashMap;
use std::path::PathBuf;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults() {
    let settings = Settings::default();
    assert!(!settings.debug);
    assert_eq!(settings.mode, ExecMode::Parallel { threads: None });
    assert_eq!(settings.debug_path, data_path(DEBUG_FILE));
    assert_eq!(settings.header_ratio, 5);
    assert!(settings.intern);
}

#[test]
fn environment_overrides() -> anyhow::Result<()> {
    let settings = Settings::default().apply_env(env(&[
        ("FLOWTAG_DEBUG", "true"),
        ("FLOWTAG_DEBUG_PATH", "/tmp/rows.log"),
        ("FLOWTAG_THREADS", "3"),
    ]))?;
    assert!(settings.debug);
    assert_eq!(settings.debug_path, PathBuf::from("/tmp/rows.log"));
    assert_eq!(settings.mode, ExecMode::with_threads(3));
    assert_eq!(settings.mode.workers(), 3);
    Ok(())
}

#[test]
fn sequential_wins_over_threads() -> anyhow::Result<()> {
    let settings = Settings::default()
        .apply_env(env(&[("FLOWTAG_THREADS", "8"), ("FLOWTAG_SEQUENTIAL", "1")]))?;
    assert_eq!(settings.mode, ExecMode::Sequential);
    assert_eq!(settings.mode.workers(), 1);
    Ok(())
}

#[test]
fn falsy_values_disable() -> anyhow::Result<()> {
    let settings = Settings {
        debug: true,
        ..Settings::default()
    }
    .apply_env(env(&[("FLOWTAG_DEBUG", "off"), ("FLOWTAG_SEQUENTIAL", "0")]))?;
    assert!(!settings.debug);
    assert!(settings.mode.is_parallel());
    Ok(())
}

#[test]
fn bad_thread_count_is_rejected() {
    assert!(Settings::default().apply_env(env(&[("FLOWTAG_THREADS", "many")])).is_err());
    assert!(Settings::default().apply_env(env(&[("FLOWTAG_THREADS", "0")])).is_err());
}

#[test]
fn json_file_with_partial_fields() -> anyhow::Result<()> {
    let file = TempFilePath::with_extension("json")?;
    write_lines(
        file.path(),
        &[r#"{ "debug": true, "mode": { "parallel": { "threads": 2 } }, "header_ratio": 3 }"#],
    )?;
    let settings = Settings::from_json_file(file.path())?;
    assert!(settings.debug);
    assert_eq!(settings.mode, ExecMode::with_threads(2));
    assert_eq!(settings.header_ratio, 3);
    assert_eq!(settings.debug_path, data_path(DEBUG_FILE));
    Ok(())
}

#[test]
fn json_sequential_mode() -> anyhow::Result<()> {
    let file = TempFilePath::with_extension("json")?;
    write_lines(file.path(), &[r#"{ "mode": "sequential" }"#])?;
    assert_eq!(Settings::from_json_file(file.path())?.mode, ExecMode::Sequential);
    Ok(())
}

#[test]
fn json_mode_shorthands() -> anyhow::Result<()> {
    let cases = [
        (r#"{ "mode": "parallel" }"#, ExecMode::parallel()),
        (r#"{ "mode": { "parallel": {} } }"#, ExecMode::parallel()),
        (r#"{ "mode": { "parallel": { "threads": null } } }"#, ExecMode::parallel()),
        (r#"{ "mode": { "parallel": { "threads": 0 } } }"#, ExecMode::with_threads(1)),
        (r#"{ "mode": { "sequential": {} } }"#, ExecMode::Sequential),
    ];
    for (json, expected) in cases {
        let file = TempFilePath::with_extension("json")?;
        write_lines(file.path(), &[json])?;
        assert_eq!(Settings::from_json_file(file.path())?.mode, expected, "{json}");
    }
    Ok(())
}

#[test]
fn serialized_mode_reads_back() -> anyhow::Result<()> {
    for mode in [ExecMode::Sequential, ExecMode::parallel(), ExecMode::with_threads(6)] {
        let json = serde_json::to_string(&mode)?;
        assert_eq!(serde_json::from_str::<ExecMode>(&json)?, mode, "{json}");
    }
    Ok(())
}

#[test]
fn unknown_mode_is_an_error() -> anyhow::Result<()> {
    let file = TempFilePath::with_extension("json")?;
    write_lines(file.path(), &[r#"{ "mode": "turbo" }"#])?;
    assert!(Settings::from_json_file(file.path()).is_err());
    Ok(())
}

#[test]
fn malformed_json_is_an_error() -> anyhow::Result<()> {
    let file = TempFilePath::with_extension("json")?;
    write_lines(file.path(), &["{ debug: yes"])?;
    assert!(Settings::from_json_file(file.path()).is_err());
    Ok(())
}
