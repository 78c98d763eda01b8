use std::fs;
use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use tempfile::tempdir;
use transpile_cache::CacheConfig;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = Figment::from(Serialized::defaults(CacheConfig::new("/repo")));
    let config: CacheConfig = figment.extract().unwrap();

    assert_eq!(config.path_root, PathBuf::from("/repo"));
    assert_eq!(config.prefix, "");
    assert_eq!(config.prune_delay_ms, 1_800_000);
    assert_eq!(config.max_age_days, 30);
    assert_eq!(config.batch_size, 1000);
    assert!(config.log.is_none());
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("cache.toml");
    fs::write(
        &config_path,
        r#"
prefix = "node:"
dir = "/var/cache/transpile"
prune_delay_ms = 60000
max_age_days = 7
batch_size = 250
"#,
    )
    .unwrap();

    let figment = Figment::from(Serialized::defaults(CacheConfig::new("/repo")))
        .merge(Toml::file(&config_path));
    let config: CacheConfig = figment.extract().unwrap();

    assert_eq!(config.prefix, "node:");
    assert_eq!(config.dir, PathBuf::from("/var/cache/transpile"));
    assert_eq!(config.prune_delay_ms, 60_000);
    assert_eq!(config.max_age_days, 7);
    assert_eq!(config.batch_size, 250);
    assert_eq!(config.path_root, PathBuf::from("/repo"));
}

#[test]
fn test_config_load_from_env() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("TCTEST_PREFIX", "env:");
        jail.set_env("TCTEST_BATCH_SIZE", "42");

        let config: CacheConfig = Figment::from(Serialized::defaults(CacheConfig::new("/repo")))
            .merge(Env::prefixed("TCTEST_"))
            .extract()?;

        assert_eq!(config.prefix, "env:");
        assert_eq!(config.batch_size, 42);
        Ok(())
    });
}

#[test]
fn test_load_reads_file_layer() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("cache.toml");
    fs::write(&config_path, "max_age_days = 3\n").unwrap();

    let config = CacheConfig::load("/repo", Some(config_path.as_path())).unwrap();
    assert_eq!(config.max_age_days, 3);
    assert_eq!(config.path_root, PathBuf::from("/repo"));
}

#[test]
fn test_invalid_toml_type_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("cache.toml");
    fs::write(&config_path, "batch_size = \"lots\"\n").unwrap();

    assert!(CacheConfig::load("/repo", Some(config_path.as_path())).is_err());
}
