use secretwatch::{Provider, Settings};
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// Single test in this binary: it mutates the process environment.
#[test]
fn test_env_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("secretwatch.toml");
    fs::write(
        &config_path,
        r#"
[secrets]
path = "/from/file.json"
init_timeout_secs = 10

[watcher]
max_file_size = 2048
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("SECRETWATCH_SECRETS__PATH", "/from/env");
        env::set_var("SECRETWATCH_SECRETS__PROVIDER", "vault_csi");
        env::set_var("SECRETWATCH_WATCHER__POLL_INTERVAL_MS", "500");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    // Environment wins over the file
    assert_eq!(settings.secrets.path, PathBuf::from("/from/env"));
    assert_eq!(settings.secrets.provider, Provider::VaultCsi);
    assert_eq!(settings.watcher.poll_interval_ms, Some(500));
    // File values remain where the environment is silent
    assert_eq!(settings.secrets.init_timeout_secs, 10);
    assert_eq!(settings.watcher.max_file_size, 2048);

    unsafe {
        env::remove_var("SECRETWATCH_SECRETS__PATH");
        env::remove_var("SECRETWATCH_SECRETS__PROVIDER");
        env::remove_var("SECRETWATCH_WATCHER__POLL_INTERVAL_MS");
    }
}
