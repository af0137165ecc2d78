use super::settings::Settings;
use super::{DEFAULT_URL_ENV, load_config_from};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

const ENV_KEYS: [&str; 4] = [
    DEFAULT_URL_ENV,
    "LCMCHAN_CLIENT__PROVIDER_URL",
    "LCMCHAN_SUBSCRIPTION__DEFAULT_CAPACITY",
    "LCMCHAN_LOGGING__LEVEL",
];

fn without_env<F: FnOnce()>(f: F) {
    let unset: Vec<(&str, Option<&str>)> = ENV_KEYS.iter().map(|k| (*k, None)).collect();
    temp_env::with_vars(unset, f);
}

fn missing_file(tmp: &TempDir) -> String {
    tmp.path().join("absent").to_string_lossy().into_owned()
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.client.provider_url, "memq://");
    assert_eq!(settings.client.poll_interval_ms, 50);
    assert_eq!(settings.client.error_capacity, 64);
    assert_eq!(settings.subscription.default_capacity, 1024);
    assert_eq!(settings.publisher.input_capacity, 1024);
    assert_eq!(settings.publisher.error_capacity, 64);
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn test_load_without_sources_gives_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    without_env(|| {
        let cfg = load_config_from(&missing_file(&tmp)).expect("load_config failed");
        assert_eq!(cfg, Settings::default());
    });
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let toml = r#"
        [client]
        provider_url = "memq://?max_payload=1024"
        poll_interval_ms = 5

        [subscription]
        default_capacity = 10

        [publisher]
        error_capacity = 3
    "#;
    fs::write(tmp.path().join("default.toml"), toml).expect("write config file");
    let stem = tmp.path().join("default").to_string_lossy().into_owned();

    without_env(|| {
        let cfg = load_config_from(&stem).expect("load_config failed");
        assert_eq!(cfg.client.provider_url, "memq://?max_payload=1024");
        assert_eq!(cfg.client.poll_interval_ms, 5);
        assert_eq!(cfg.client.error_capacity, 64);
        assert_eq!(cfg.subscription.default_capacity, 10);
        assert_eq!(cfg.publisher.input_capacity, 1024);
        assert_eq!(cfg.publisher.error_capacity, 3);
        assert_eq!(cfg.logging.level, "info");
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    fs::write(
        tmp.path().join("default.toml"),
        "[subscription]\ndefault_capacity = 10\n",
    )
    .expect("write config file");
    let stem = tmp.path().join("default").to_string_lossy().into_owned();

    without_env(|| {
        temp_env::with_vars(
            [
                ("LCMCHAN_SUBSCRIPTION__DEFAULT_CAPACITY", Some("77")),
                ("LCMCHAN_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let cfg = load_config_from(&stem).expect("load_config failed");
                assert_eq!(cfg.subscription.default_capacity, 77);
                assert_eq!(cfg.logging.level, "debug");
            },
        );
    });
}

#[test]
#[serial]
fn test_lcm_default_url_is_the_provider_fallback() {
    let tmp = TempDir::new().expect("create tempdir");
    without_env(|| {
        temp_env::with_var(DEFAULT_URL_ENV, Some("memq://?max_payload=8"), || {
            let cfg = load_config_from(&missing_file(&tmp)).expect("load_config failed");
            assert_eq!(cfg.client.provider_url, "memq://?max_payload=8");
        });
    });
}

#[test]
#[serial]
fn test_configured_provider_beats_lcm_default_url() {
    let tmp = TempDir::new().expect("create tempdir");
    without_env(|| {
        temp_env::with_vars(
            [
                (DEFAULT_URL_ENV, Some("memq://?max_payload=8")),
                ("LCMCHAN_CLIENT__PROVIDER_URL", Some("memq://?max_payload=16")),
            ],
            || {
                let cfg = load_config_from(&missing_file(&tmp)).expect("load_config failed");
                assert_eq!(cfg.client.provider_url, "memq://?max_payload=16");
            },
        );
    });
}
