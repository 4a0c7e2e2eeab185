use thiserror::Error;

/// Top-level error type for the Cadence client.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for CadenceError` so that the `?` operator works
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<toml::de::Error> for CadenceError {
    fn from(err: toml::de::Error) -> Self {
        CadenceError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CadenceError {
    fn from(err: toml::ser::Error) -> Self {
        CadenceError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(err: serde_json::Error) -> Self {
        CadenceError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CadenceError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CadenceError = io_err.into();
        assert!(matches!(err, CadenceError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(CadenceError, &str)> = vec![
            (
                CadenceError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                CadenceError::Serialization("eof".to_string()),
                "Serialization error: eof",
            ),
            (
                CadenceError::Delivery("busy".to_string()),
                "Delivery error: busy",
            ),
            (
                CadenceError::Transport("status 502".to_string()),
                "Transport error: status 502",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_toml_de_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: CadenceError = toml_err.into();
        assert!(matches!(err, CadenceError::Config(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CadenceError = json_err.into();
        assert!(matches!(err, CadenceError::Serialization(_)));
    }

    #[test]
    fn test_result_alias_propagates() {
        fn inner() -> Result<u32> {
            Err(CadenceError::Delivery("nope".into()))
        }
        fn outer() -> Result<u32> {
            let v = inner()?;
            Ok(v + 1)
        }
        assert!(outer().is_err());
    }
}
