use devprobe::config::{Config, ConfigError, ConnectorConfig};
use devprobe::discovery::{SessionTimings, TimingError};
use figment::providers::Serialized;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = figment::Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config.discovery, SessionTimings::default());
    assert_eq!(config.discovery.max_duration, Duration::from_secs(60));
    assert_eq!(config.discovery.recheck_interval, Duration::from_secs(5));
    assert!(config.connectors.is_empty());
    assert!(!config.fail_on_timeout);
}

#[test]
fn test_config_load_from_env() {
    // A private prefix keeps Config::load in parallel tests unaffected
    std::env::set_var("DEVPROBE_ENVTEST_DISCOVERY__MAX_DURATION", "90");
    std::env::set_var("DEVPROBE_ENVTEST_ACCESSIBLE", "true");

    // Use figment directly to test loading from environment
    use figment::{providers::Env, Figment};
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("DEVPROBE_ENVTEST_").split("__"));

    let config: Config = figment.extract().unwrap();

    assert_eq!(config.discovery.max_duration, Duration::from_secs(90));
    assert_eq!(config.discovery.recheck_interval, Duration::from_secs(5));
    assert!(config.accessible);

    // Clean up
    std::env::remove_var("DEVPROBE_ENVTEST_DISCOVERY__MAX_DURATION");
    std::env::remove_var("DEVPROBE_ENVTEST_ACCESSIBLE");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
fail_on_timeout = true

[discovery]
max_duration = 30
recheck_interval = 2.5
drain_interval = 20

[[connectors]]
id = "lan"
name = "Living room gateway"
broadcast = "192.168.1.255:5683"
listen_window_secs = 4

[[connectors]]
id = "garage"
probe = "M-SEARCH"
probe_attempts = 5
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load(Some(&config_path)).unwrap();

    assert!(config.fail_on_timeout);
    assert_eq!(config.discovery.max_duration, Duration::from_secs(30));
    assert_eq!(config.discovery.recheck_interval, Duration::from_millis(2500));
    assert_eq!(config.discovery.drain_interval, Duration::from_millis(20));
    // Unset keys keep their defaults
    assert_eq!(config.discovery.progress_interval, Duration::from_millis(100));

    assert_eq!(config.connectors.len(), 2);
    let lan = config.connector("lan").unwrap();
    assert_eq!(lan.display_name(), "Living room gateway");
    assert_eq!(lan.broadcast.to_string(), "192.168.1.255:5683");
    assert_eq!(lan.listen_window(), Duration::from_secs(4));
    assert_eq!(lan.probe_attempts, 3);

    let garage = config.connector("garage").unwrap();
    assert_eq!(garage.probe, "M-SEARCH");
    assert_eq!(garage.probe_attempts, 5);
    assert_eq!(garage.display_name(), "garage");
}

#[test]
fn test_connector_toml_roundtrip() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let connector = ConnectorConfig {
        id: "lan".to_string(),
        probe_interval_ms: 250,
        ..ConnectorConfig::default()
    };
    let content = format!("[[connectors]]\n{}", toml::to_string(&connector).unwrap());
    fs::write(&config_path, &content).unwrap();

    assert!(content.contains("probe_interval_ms = 250"));
    assert!(!content.contains("name ="));

    let config = Config::load(Some(&config_path)).unwrap();
    assert_eq!(config.connectors, vec![connector]);
}

#[test]
fn test_config_missing_explicit_file() {
    let temp_dir = tempdir().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let err = Config::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn test_config_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[discovery\nmax_duration = ").unwrap();

    assert!(Config::load(Some(&config_path)).is_err());
}

#[test]
fn test_config_rejects_inconsistent_timings() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[discovery]\nmax_duration = 10\nrecheck_interval = 20\n",
    )
    .unwrap();

    let err = Config::load(Some(&config_path)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Timings(_))
    ));
}

#[test]
fn test_config_rejects_oversized_budget() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[discovery]\nmax_duration = 1e19\n").unwrap();

    let err = Config::load(Some(&config_path)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Timings(TimingError::BudgetTooLong { .. }))
    ));
}

#[test]
fn test_config_rejects_duplicate_connectors() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[[connectors]]\nid = \"lan\"\n\n[[connectors]]\nid = \"lan\"\n",
    )
    .unwrap();

    let err = Config::load(Some(&config_path)).unwrap_err();
    assert_eq!(err.to_string(), "duplicate connector id 'lan'");
}
