//! Loading a config file and wiring the pieces it describes.

mod common;

use std::sync::Arc;

use common::TestHarness;
use ledgerscan::{
    load_config, provider_from_config, ConfigError, ExtractionPipeline, Jurisdiction, LedgerError,
    ProviderKind, RecordStore,
};

fn write_config(harness: &TestHarness, body: &str) -> std::path::PathBuf {
    let path = harness.root().join("ledgerscan.json");
    std::fs::write(&path, body).unwrap();
    path
}

/// Builds everything a config describes, the way an application would.
fn wire(config_path: &std::path::Path) -> ledgerscan::Result<(ExtractionPipeline, RecordStore)> {
    let config = load_config(config_path)?;
    let provider = provider_from_config(&config.provider)?;
    let store = RecordStore::open(&config.database_path())?;
    Ok((ExtractionPipeline::new(provider, config.jurisdiction), store))
}

#[test]
fn test_local_server_config_wires_up() {
    let harness = TestHarness::new();
    let db_path = harness.root().join("db").join("ledger.db");
    let path = write_config(
        &harness,
        &format!(
            r#"{{
                "version": "1.0",
                "jurisdiction": "irs",
                "database_path": "{}",
                "provider": {{
                    "kind": "openai",
                    "model": "llava",
                    "base_url": "http://127.0.0.1:9/v1",
                    "timeout_secs": 2
                }},
                "import": {{"duplicate_window_days": 7, "skip_duplicates": true}},
                "logging": {{"level": "debug", "json": true}}
            }}"#,
            db_path.display()
        ),
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.jurisdiction, Jurisdiction::Irs);
    assert_eq!(config.provider.kind, ProviderKind::Openai);
    assert_eq!(config.import.duplicate_window_days, 7);
    assert!(config.import.skip_duplicates);
    assert!(config.import.validate);
    assert!(config.logging.json);

    let (pipeline, store) = wire(&path).unwrap();
    assert_eq!(pipeline.jurisdiction(), Jurisdiction::Irs);
    assert_eq!(pipeline.provider().name(), "openai");
    assert!(db_path.exists());
    assert_eq!(store.schema_version().unwrap(), 3);
}

#[test]
fn test_unreachable_backend_is_a_rejection_not_an_error() {
    let harness = TestHarness::new();
    let path = write_config(
        &harness,
        &format!(
            r#"{{
                "version": "1.0",
                "database_path": "{}",
                "provider": {{"kind": "anthropic", "model": "m", "base_url": "http://127.0.0.1:9", "timeout_secs": 2}}
            }}"#,
            harness.root().join("ledger.db").display()
        ),
    );
    let (pipeline, _store) = wire(&path).unwrap();
    let doc = harness.write_png("receipt.png");

    assert!(pipeline.process(&doc, true).is_none());
    let stats = pipeline.provider().get_stats();
    assert_eq!(stats.provider, "anthropic");
    assert_eq!(stats.request_count, 1);
    assert_eq!(stats.error_count, 1);
}

#[test]
fn test_api_key_file_is_resolved() {
    let harness = TestHarness::new();
    let key_file = harness.root().join("openai.key");
    std::fs::write(&key_file, "sk-test-123\n").unwrap();
    let path = write_config(
        &harness,
        &format!(
            r#"{{
                "version": "1.0",
                "database_path": "{}",
                "provider": {{"kind": "openai", "model": "gpt-4o", "api_key_file": "{}"}}
            }}"#,
            harness.root().join("ledger.db").display(),
            key_file.display()
        ),
    );

    let (pipeline, _store) = wire(&path).unwrap();
    assert_eq!(pipeline.jurisdiction(), Jurisdiction::Cra);
    let provider: Arc<dyn ledgerscan::ExtractionProvider> = pipeline.provider();
    assert_eq!(provider.get_stats().request_count, 0);
}

#[test]
fn test_missing_key_file_surfaces_as_setup_error() {
    let harness = TestHarness::new();
    let path = write_config(
        &harness,
        r#"{
            "version": "1.0",
            "provider": {"kind": "openai", "model": "gpt-4o", "api_key_file": "/nonexistent/openai.key"}
        }"#,
    );
    assert!(matches!(wire(&path), Err(LedgerError::ProviderSetup(_))));
}

#[test]
fn test_invalid_config_surfaces_as_config_error() {
    let harness = TestHarness::new();
    let path = write_config(&harness, r#"{"version": "2.0", "provider": {"kind": "openai", "model": "x", "api_key": "k"}}"#);
    assert!(matches!(
        wire(&path),
        Err(LedgerError::Config(ConfigError::Validation { .. }))
    ));

    let missing = harness.root().join("absent.json");
    assert!(matches!(
        load_config(&missing),
        Err(ConfigError::ReadFile { .. })
    ));
}
