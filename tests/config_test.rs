//! Config and registry loading from disk

mod common;

use std::io::Write;

use serde_json::json;
use tempfile::{NamedTempFile, TempDir};

use shardview::{Config, NodeRegistry, ShardError};

#[test]
fn test_config_file_overrides() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[services.schedules]
service_type = "acme.service.timer"
param_type = "acme.param.timers"
service_name = "Timer"
param_name = "Timers"

[logging]
filter = "shardview=debug"
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.services.schedules.service_name, "Timer");
    assert_eq!(config.services.scenes.service_type, "esp.service.scenes");
    assert_eq!(config.store.event_capacity, 256);
    assert_eq!(config.logging.filter.as_deref(), Some("shardview=debug"));
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ShardError::Io(_)));
}

#[test]
fn test_custom_identifiers_drive_merge() {
    let config = Config::from_toml_str(
        r#"
[services.scenes]
service_type = "acme.service.moods"
param_type = "acme.param.moods"
service_name = "Moods"
param_name = "List"
"#,
    )
    .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodes.json");
    let nodes = json!([{
        "id": "n1",
        "services": [{
            "name": "Moods",
            "type": "acme.service.moods",
            "params": [{"name": "List", "type": "acme.param.moods", "value": [
                {"id": "m1", "name": "Calm", "action": {"light": {"brightness": 30}}}
            ]}]
        }]
    }]);
    std::fs::write(&path, nodes.to_string()).unwrap();

    let registry = NodeRegistry::load(&path).unwrap();
    let client = shardview::Client::init(
        config,
        common::ScriptedTransport::new(),
        std::sync::Arc::new(shardview::DryRunAutomationApi),
    );
    client.load_registry(registry);

    assert_eq!(client.scenes().ids(), vec!["m1"]);
    assert!(client.schedules().is_empty());
}

#[test]
fn test_malformed_registry_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodes.json");
    std::fs::write(&path, "{not json").unwrap();

    let err = NodeRegistry::load(&path).unwrap_err();
    assert!(matches!(err, ShardError::Serialization(_)));
}
