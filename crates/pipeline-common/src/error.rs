//! Error types shared by the pipeline crates

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Read an environment variable and parse it, falling back to `default`
/// when the variable is absent.
///
/// A variable that is present but unparsable is a configuration error
/// rather than a silent fallback.
pub fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PipelineError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

/// Read a string environment variable, falling back to `default`.
pub fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_or_uses_default_when_unset() {
        std::env::remove_var("PIPELINE_TEST_PORT");
        assert_eq!(env_or("PIPELINE_TEST_PORT", 8080u16).unwrap(), 8080);
    }

    #[test]
    #[serial]
    fn test_env_or_parses_value() {
        std::env::set_var("PIPELINE_TEST_PORT", " 9000 ");
        assert_eq!(env_or("PIPELINE_TEST_PORT", 8080u16).unwrap(), 9000);
        std::env::remove_var("PIPELINE_TEST_PORT");
    }

    #[test]
    #[serial]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("PIPELINE_TEST_PORT", "eighty");
        let err = env_or("PIPELINE_TEST_PORT", 8080u16).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("PIPELINE_TEST_PORT"));
        std::env::remove_var("PIPELINE_TEST_PORT");
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::config("missing bucket");
        assert_eq!(err.to_string(), "Configuration error: missing bucket");
    }
}
