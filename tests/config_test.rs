use std::io::Write;

use linestream::{AppError, AppResult, LineServerConfig};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_load_full_config() -> AppResult<()> {
    let file = write_config(
        r#"
[network]
ip = "0.0.0.0"
port = 9000
max_connection = 128

[reader]
delimiter = "\r\n"
chunk_size = 8
max_line_length = 1024
read_timeout_ms = 1500
channel_capacity = 16

[log]
dir = "/tmp/linestream-logs"
file_prefix = "test.log"

[runtime]
worker_threads = 2
"#,
    );

    let config = LineServerConfig::set_up_config(file.path())?;
    assert_eq!(config.listen_address(), "0.0.0.0:9000");
    assert_eq!(config.network.max_connection, 128);
    assert_eq!(config.reader.delimiter()?.as_bytes(), b"\r\n");
    assert_eq!(config.reader.chunk_size, 8);
    assert_eq!(config.reader.max_line_length(), Some(1024));
    assert_eq!(config.reader.read_timeout().map(|d| d.as_millis()), Some(1500));
    assert_eq!(config.log.file_prefix, "test.log");
    assert_eq!(config.runtime.worker_threads(), 2);
    Ok(())
}

#[test]
fn test_missing_sections_use_defaults() -> AppResult<()> {
    let file = write_config(
        r#"
[network]
port = 7001
"#,
    );

    let config = LineServerConfig::set_up_config(file.path())?;
    assert_eq!(config.listen_address(), "127.0.0.1:7001");
    assert_eq!(config.network.max_connection, 0);
    assert_eq!(config.reader.delimiter()?.as_bytes(), b"\n");
    assert_eq!(config.reader.chunk_size, 4096);
    assert_eq!(config.reader.read_timeout(), None);
    Ok(())
}

#[test]
fn test_empty_delimiter_is_rejected() {
    let file = write_config(
        r#"
[reader]
delimiter = ""
"#,
    );

    let result = LineServerConfig::set_up_config(file.path());
    assert!(matches!(result, Err(AppError::InvalidValue(_))));
}

#[test]
fn test_missing_file_is_an_error() {
    let result = LineServerConfig::set_up_config("/definitely/not/here/conf.toml");
    assert!(matches!(result, Err(AppError::ConfigFileError(_))));
}

#[test]
fn test_repository_config_loads() -> AppResult<()> {
    let config = LineServerConfig::set_up_config(concat!(env!("CARGO_MANIFEST_DIR"), "/conf.toml"))?;
    assert_eq!(config.network.port, 42069);
    assert_eq!(config.reader.delimiter()?.as_bytes(), b"\n");
    Ok(())
}
