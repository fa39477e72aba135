use memgate::config::*;
use memgate::MemError;
use std::io::Write;

#[test]
fn test_config_defaults() {
    let config = MemConfig::default();

    assert_eq!(config.io.page_size, 0x1000);
    assert_eq!(config.io.max_batch_entries, 1 << 20);
    assert_eq!(config.io.parallel_threshold, 64);
    assert_eq!(config.io.max_dump_size, 64 * 1024 * 1024 * 1024);
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.pages, 256);
    assert_eq!(config.cache.validity_ms, 1000);
}

#[test]
fn test_partial_json_keeps_defaults() {
    let config = MemConfig::from_json_str(r#"{"cache": {"enabled": true}}"#).unwrap();
    assert!(config.cache.enabled);
    assert_eq!(config.cache.pages, 256);
    assert_eq!(config.io, IoConfig::default());
}

#[test]
fn test_invalid_configs() {
    assert!(matches!(
        MemConfig::from_json_str(r#"{"io": {"page_size": 3000}}"#),
        Err(MemError::Config(_))
    ));
    assert!(matches!(
        MemConfig::from_json_str(r#"{"io": {"max_batch_entries": 0}}"#),
        Err(MemError::Config(_))
    ));
    assert!(matches!(
        MemConfig::from_json_str("[]"),
        Err(MemError::Config(_))
    ));
}

#[test]
fn test_config_file_round_trip() {
    let mut config = MemConfig::default();
    config.io.parallel_threshold = 8;
    config.cache.validity_ms = 50;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config.to_json_string().unwrap().as_bytes())
        .unwrap();
    file.flush().unwrap();

    assert_eq!(MemConfig::from_path(file.path()).unwrap(), config);
    assert!(matches!(
        MemConfig::from_path("/no/such/memgate.json"),
        Err(MemError::Io(_))
    ));
}
