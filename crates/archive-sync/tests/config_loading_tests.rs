//! Table-driven tests for configuration loading and validation.

use archive_sync::config::load_config_from_str;
use archive_sync::load_config;

/// A single config loading case.
struct ConfigTestCase {
    name: &'static str,
    config_json: &'static str,
    should_succeed: bool,
    /// Substring expected in the error message when loading fails.
    expected_error: Option<&'static str>,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{"version": "1.0", "storageDirectory": "/srv/archive"}"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "storageDirectory": "/srv/archive",
            "databasePath": "/var/lib/archive/archive.db",
            "import": { "concurrency": 4, "operator": "night-shift" },
            "copy": {
                "smallFileThresholdMb": 5,
                "largeFileThresholdMb": 100,
                "resumableTool": "rsync",
                "streamBufferKb": 512
            },
            "search": {
                "url": "http://localhost:7700",
                "apiKey": "masterKey",
                "indexUid": "archives",
                "batchSize": 250,
                "maxAttempts": 5,
                "baseDelayMs": 200,
                "requestTimeoutMs": 5000
            },
            "enrichment": { "keyColumn": "archive_no", "stagingTtlSecs": 900 },
            "cache": { "ttlSecs": 30, "maxEntries": 64 }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "missing_storage_directory",
        config_json: r#"{"version": "1.0"}"#,
        should_succeed: false,
        expected_error: Some("storageDirectory"),
    },
    ConfigTestCase {
        name: "unknown_top_level_field",
        config_json: r#"{"version": "1.0", "storageDirectory": "/s", "workers": 3}"#,
        should_succeed: false,
        expected_error: Some("workers"),
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{"version": "2.0", "storageDirectory": "/s"}"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "zero_concurrency",
        config_json: r#"{"version": "1.0", "storageDirectory": "/s", "import": {"concurrency": 0}}"#,
        should_succeed: false,
        expected_error: Some("concurrency"),
    },
    ConfigTestCase {
        name: "inverted_copy_thresholds",
        config_json: r#"{
            "version": "1.0",
            "storageDirectory": "/s",
            "copy": { "smallFileThresholdMb": 80, "largeFileThresholdMb": 20 }
        }"#,
        should_succeed: false,
        expected_error: Some("smallFileThresholdMb"),
    },
    ConfigTestCase {
        name: "oversized_index_batch",
        config_json: r#"{"version": "1.0", "storageDirectory": "/s", "search": {"batchSize": 5000}}"#,
        should_succeed: false,
        expected_error: Some("5000"),
    },
    ConfigTestCase {
        name: "key_column_shadows_metadata",
        config_json: r#"{"version": "1.0", "storageDirectory": "/s", "enrichment": {"keyColumn": "title"}}"#,
        should_succeed: false,
        expected_error: Some("collides"),
    },
    ConfigTestCase {
        name: "not_json",
        config_json: "storageDirectory = /s",
        should_succeed: false,
        expected_error: None,
    },
];

#[test]
fn test_json_config_loading() {
    for case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);

        if case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}' failed: expected success, got {:?}",
                case.name,
                result.err()
            );
        } else {
            let err = match result {
                Ok(_) => panic!("Test '{}' failed: expected an error", case.name),
                Err(e) => e.to_string(),
            };
            if let Some(expected) = case.expected_error {
                assert!(
                    err.contains(expected),
                    "Test '{}' failed: error '{}' does not mention '{}'",
                    case.name,
                    err,
                    expected
                );
            }
        }
    }
}

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("archive-sync.json");
    std::fs::write(
        &path,
        r#"{"version": "1.0", "storageDirectory": "/srv/archive", "import": {"concurrency": 3}}"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.import.concurrency, 3);
    assert_eq!(config.search.index_uid, "archives");
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = load_config(dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("absent.json"));
}
