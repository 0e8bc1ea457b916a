use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFLICT: {0}")]
    Conflict(String),
    #[error("UNAVAILABLE: {0}")]
    Unavailable(String),
    #[error("INVALID_DATA: {0}")]
    InvalidData(String),
    #[error("PARTIAL_FAILURE: {0}")]
    PartialFailure(String),
    #[error("POLICY_DENIED: {0}")]
    Policy(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::PartialFailure(_) => "PARTIAL_FAILURE",
            Self::Policy(_) => "POLICY_DENIED",
            Self::Io(_) => "IO_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(message)
            | Self::Conflict(message)
            | Self::Unavailable(message)
            | Self::InvalidData(message)
            | Self::PartialFailure(message)
            | Self::Policy(message)
            | Self::Io(message)
            | Self::Internal(message) => message,
        }
    }

    /// Prefixes the message with the name of the operation that failed.
    pub fn context(self, operation: &str) -> Self {
        let wrap = |message: String| format!("{}: {}", operation, message);
        match self {
            Self::NotFound(message) => Self::NotFound(wrap(message)),
            Self::Conflict(message) => Self::Conflict(wrap(message)),
            Self::Unavailable(message) => Self::Unavailable(wrap(message)),
            Self::InvalidData(message) => Self::InvalidData(wrap(message)),
            Self::PartialFailure(message) => Self::PartialFailure(wrap(message)),
            Self::Policy(message) => Self::Policy(wrap(message)),
            Self::Io(message) => Self::Io(wrap(message)),
            Self::Internal(message) => Self::Internal(wrap(message)),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(value.to_string()),
            std::io::ErrorKind::AlreadyExists => Self::Conflict(value.to_string()),
            _ => Self::Io(value.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Error payload handed across the IPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientError {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ClientError {
    fn from(value: &AppError) -> Self {
        Self {
            code: value.code().to_string(),
            message: value.message().to_string(),
        }
    }
}

impl From<AppError> for ClientError {
    fn from(value: AppError) -> Self {
        Self::from(&value)
    }
}

/// Discriminated result returned by every IPC command. Failures are data,
/// never a rejected call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClientError>,
}

impl<T> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<ClientError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn as_ok(&self) -> Option<&T> {
        self.data.as_ref().filter(|_| self.success)
    }
}

impl<T> From<AppResult<T>> for CommandResult<T> {
    fn from(value: AppResult<T>) -> Self {
        match value {
            Ok(data) => Self::ok(data),
            Err(error) => {
                tracing::warn!(code = error.code(), error = %error, "command failed");
                Self::failed(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_by_kind() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(AppError::from(missing).code(), "NOT_FOUND");
        let exists = std::io::Error::new(std::io::ErrorKind::AlreadyExists, "there");
        assert_eq!(AppError::from(exists).code(), "CONFLICT");
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let mapped = AppError::from(denied);
        assert_eq!(mapped.code(), "IO_FAILURE");
        assert_eq!(mapped.message(), "nope");
    }

    #[test]
    fn command_result_serializes_failure_without_data() {
        let result: CommandResult<u32> = Err(AppError::NotFound("Event 7 not found".to_string())).into();
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "success": false,
                "error": {"code": "NOT_FOUND", "message": "Event 7 not found"}
            })
        );
        assert!(result.as_ok().is_none());
    }

    #[test]
    fn context_names_the_operation() {
        let error = AppError::Io("disk full".to_string()).context("write file");
        assert_eq!(error.to_string(), "IO_FAILURE: write file: disk full");
    }
}
