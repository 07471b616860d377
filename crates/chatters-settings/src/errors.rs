//! Settings error types.

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON, or a key has the wrong type.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// Parsed fine but the server cannot run with it.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_name_the_file_problem() {
        let err: SettingsError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.to_string(), "cannot read settings file: denied");
    }

    #[test]
    fn wrong_type_is_malformed() {
        let json_err = serde_json::from_str::<u16>("\"eighty\"").unwrap_err();
        let err = SettingsError::from(json_err);
        assert!(matches!(err, SettingsError::Json(_)));
        assert!(err.to_string().starts_with("malformed settings:"));
    }

    #[test]
    fn invalid_value_carries_the_key() {
        let err = SettingsError::InvalidValue("auth.jwtSecret is empty".to_string());
        assert_eq!(err.to_string(), "invalid settings value: auth.jwtSecret is empty");
    }
}
