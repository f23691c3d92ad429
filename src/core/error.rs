use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Policy version error: {0}")]
    Version(String),

    #[error("Infrastructure error: {0}")]
    Infra(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PolicyError {
    /// Status code reported to callers of the HTTP binding.
    pub fn status_code(&self) -> u16 {
        match self {
            PolicyError::Validation(_) | PolicyError::Version(_) => 400,
            PolicyError::Lock(_) => 409,
            PolicyError::Infra(_) | PolicyError::Storage(_) | PolicyError::Config(_) => 500,
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyError::Validation(_) => "validation_error",
            PolicyError::Lock(_) => "lock_error",
            PolicyError::Version(_) => "policy_version_error",
            PolicyError::Infra(_) => "infra_error",
            PolicyError::Storage(_) => "storage_error",
            PolicyError::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;

impl From<std::io::Error> for PolicyError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_kind() {
        assert_eq!(PolicyError::Validation("x".into()).status_code(), 400);
        assert_eq!(PolicyError::Lock("x".into()).status_code(), 409);
        assert_eq!(PolicyError::Version("x".into()).status_code(), 400);
        assert_eq!(PolicyError::Infra("x".into()).status_code(), 500);
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PolicyError = io.into();
        assert!(matches!(err, PolicyError::Storage(_)));
    }
}
