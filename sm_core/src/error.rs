/// Core error type for the exporter
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("External error: {0}")]
    External(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Metric already registered: {0}")]
    DuplicateMetric(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::DuplicateMetric("followers{screen_name=\"a\"}".to_string());
        assert_eq!(
            err.to_string(),
            "Metric already registered: followers{screen_name=\"a\"}"
        );

        let err = Error::Config("bad interval".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad interval");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = config::ConfigError::Message("boom".to_string()).into();
        assert!(matches!(err, Error::Config(ref msg) if msg == "boom"));
    }
}
