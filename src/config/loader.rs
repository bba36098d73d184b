//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::validate_config;
use crate::error::ConfigError;

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const GATEWAY_TOML: &str = r#"
[listener]
bind_address = "127.0.0.1:8080"

[metrics]
bind_address = "127.0.0.1:9090"

[shutdown]
delay_ms = 2000

[[routes]]
path = "/drivers/{id:[0-9]+}"
method = "GET"
http = { host = "zombie-driver:8080" }

[[routes]]
path = "/records"
http = { host = "time-tracker:8080" }
cors = true
query = [
  { key = "user_id", pattern = "numeric" },
  { key = "period", pattern = "period" },
]
"#;

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", GATEWAY_TOML).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:8080");
        assert_eq!(config.shutdown.delay_ms, 2000);
        assert_eq!(config.routes.len(), 2);
        assert!(config.routes[1].cors);
        assert_eq!(config.metrics.path, "/metrics");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let err = parse_config("[[routes]\npath = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn semantic_error_is_validation_error() {
        let err = parse_config(
            r#"
[timeouts]
request_ms = 0

[[routes]]
path = "/drivers"
http = { host = "zombie-driver:8080" }
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors[0].field, "timeouts.request_ms"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
