use clap::Parser;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use fsdedup::cli::Cli;
use fsdedup::config::Config;
use fsdedup::output::OutputFormat;
use fsdedup::scanner::HashAlgorithm;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.min_size, 1_048_576);
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("FSDEDUP_CHANNEL_CAPACITY", "128");
    std::env::set_var("FSDEDUP_ALGORITHM", "sha256");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("FSDEDUP_"))
        .extract()
        .unwrap();

    std::env::remove_var("FSDEDUP_CHANNEL_CAPACITY");
    std::env::remove_var("FSDEDUP_ALGORITHM");

    assert_eq!(config.channel_capacity, 128);
    assert_eq!(config.algorithm, HashAlgorithm::Sha256);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
min_size = 4096
recursive = true
verify_before_clone = false
output = "json"
"#,
    )
    .unwrap();

    let config = Config::load(Some(&config_path)).unwrap();

    assert_eq!(config.min_size, 4096);
    assert!(config.recursive);
    assert!(!config.verify_before_clone);
    assert_eq!(config.output, OutputFormat::Json);
    // Unset keys keep their defaults
    assert!(!config.dry_run);
}

#[test]
fn test_cli_flags_override_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "min_size = 4096\noutput = \"json\"\n").unwrap();

    let mut config = Config::load(Some(&config_path)).unwrap();
    let cli = Cli::try_parse_from(["fsdedup", "--min-size", "1KiB", "-n", "a.img"]).unwrap();
    config.apply_cli(&cli);

    assert_eq!(config.min_size, 1024);
    assert!(config.dry_run);
    // Not given on the command line, so the file wins
    assert_eq!(config.output, OutputFormat::Json);
}

#[test]
fn test_config_save_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let config = Config {
        io_threads: 2,
        algorithm: HashAlgorithm::Sha256,
        ..Config::default()
    };
    config.save_to(&config_path).unwrap();

    let saved_content = fs::read_to_string(&config_path).unwrap();
    assert!(saved_content.contains("io_threads = 2"));
    assert!(saved_content.contains("algorithm = \"sha256\""));
}

#[test]
fn test_config_invalid_value_is_error() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "algorithm = \"md5\"").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract();
    assert!(result.is_err());
}
