//! Integration tests for configuration loading

use std::env;
use std::fs;
use std::time::Duration;

use alidns_sync::config::{write_sample, ConfigStore, IpFamily, LogFormat, SAMPLE_CONFIG};
use alidns_sync::constants::{
    CONFIG_FILE_NAME, DEFAULT_IP_API, DEFAULT_REGION, ENV_ACCESS_KEY_ID, ENV_ACCESS_KEY_SECRET,
    ENV_REGION,
};
use alidns_sync::Error;
use serial_test::serial;
use tempfile::TempDir;

/// Helper function to create a config directory holding `content`
fn create_config(content: &str) -> (TempDir, ConfigStore) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join(CONFIG_FILE_NAME), content).expect("Failed to write temp config");
    let store = ConfigStore::in_dir(dir.path());
    (dir, store)
}

/// Helper function to clear environment variables for testing
fn clear_env_vars() {
    env::remove_var(ENV_ACCESS_KEY_ID);
    env::remove_var(ENV_ACCESS_KEY_SECRET);
    env::remove_var(ENV_REGION);
}

#[test]
#[serial]
fn test_config_load_from_file() {
    clear_env_vars();

    let (_dir, store) = create_config(
        r#"
[schedule]
interval = "600"
enabled = "1"
timeout = 45
verbose = true

[auth]
access_key_id = "LTAI5tFileKeyId"
access_key_secret = "fileSecret"

[[host]]
rr = "home"
type = "A"
ttl = 600
priority = 1
line = "default"
domain = "example.com"

[[host]]
rr = "nas"
type = "AAAA"
ttl = 300
priority = 1
line = ""
domain = "example.net"
"#,
    );

    let config = store.load().expect("config should load");
    assert_eq!(config.schedule.interval, Duration::from_secs(600));
    assert!(config.schedule.enabled);
    assert_eq!(config.schedule.timeout, Duration::from_secs(45));
    assert!(config.schedule.verbose);
    assert_eq!(config.schedule.log_format, LogFormat::Text);
    assert_eq!(config.schedule.resolver.ip_api, DEFAULT_IP_API);
    assert_eq!(config.schedule.resolver.ip_family, IpFamily::V4);

    assert_eq!(config.credentials.access_key_id.as_str(), "LTAI5tFileKeyId");
    assert_eq!(config.credentials.region, DEFAULT_REGION);
    assert!(config.credentials.endpoint.is_none());

    let domains: Vec<&str> = config.records.keys().map(String::as_str).collect();
    assert_eq!(domains, vec!["example.com", "example.net"]);
    assert_eq!(config.records["example.net"][0].line, "");
}

#[test]
#[serial]
fn test_config_env_overrides_credentials() {
    clear_env_vars();
    env::set_var(ENV_ACCESS_KEY_ID, "LTAIenvKeyId");
    env::set_var(ENV_ACCESS_KEY_SECRET, "envSecret");
    env::set_var(ENV_REGION, "cn-shenzhen");

    let (_dir, store) = create_config(
        r#"
[auth]
access_key_id = "LTAI5tFileKeyId"
access_key_secret = "fileSecret"
region = "cn-hangzhou"
"#,
    );

    let creds = store.load_credentials().expect("credentials should load");
    assert_eq!(creds.access_key_id.as_str(), "LTAIenvKeyId");
    assert_eq!(creds.access_key_secret.as_str(), "envSecret");
    assert_eq!(creds.region, "cn-shenzhen");

    clear_env_vars();
}

#[test]
#[serial]
fn test_config_env_supplies_missing_auth_section() {
    clear_env_vars();
    env::set_var(ENV_ACCESS_KEY_ID, "LTAIenvKeyId");
    env::set_var(ENV_ACCESS_KEY_SECRET, "envSecret");

    let (_dir, store) = create_config("[schedule]\nenabled = true\n");
    let creds = store.load_credentials().expect("env credentials should load");
    assert_eq!(creds.access_key_id.as_str(), "LTAIenvKeyId");

    clear_env_vars();
}

#[test]
#[serial]
fn test_config_interval_below_floor() {
    clear_env_vars();
    let (_dir, store) = create_config("[schedule]\ninterval = 30\nenabled = true\n");

    let err = store.load_schedule().expect_err("30s interval should be rejected");
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_config_reread_picks_up_changes() {
    clear_env_vars();
    let (dir, store) = create_config(SAMPLE_CONFIG);
    assert_eq!(store.load_desired_records().unwrap()["example.com"].len(), 2);

    let edited = SAMPLE_CONFIG.replace("rr = \"efg\"", "rr = \"efg\"\n# edited");
    let edited = format!(
        "{edited}\n[[host]]\nrr = \"new\"\ntype = \"A\"\nttl = 600\npriority = 1\nline = \"default\"\ndomain = \"example.org\"\n"
    );
    fs::write(dir.path().join(CONFIG_FILE_NAME), edited).unwrap();

    let records = store.load_desired_records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records["example.org"][0].subdomain, "new");
}

#[test]
fn test_write_sample_creates_directory_once() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("etc").join("alidns-sync");

    let (path, written) = write_sample(&target).expect("sample should be written");
    assert!(written);
    assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE_CONFIG);

    fs::write(&path, "# customised\n").unwrap();
    let (_, written) = write_sample(&target).expect("second call should succeed");
    assert!(!written);
    assert_eq!(fs::read_to_string(&path).unwrap(), "# customised\n");
}

#[test]
fn test_write_sample_reports_failure() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "file").unwrap();

    let err = write_sample(&blocker.join("nested")).expect_err("cannot create under a file");
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_packaged_config_matches_sample() {
    assert_eq!(include_str!("../etc/config.toml"), SAMPLE_CONFIG);
}
