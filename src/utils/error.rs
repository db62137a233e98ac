use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeleteError {
    #[error("Could not decode deletion request: {message}")]
    Decode { message: String },

    #[error("State of {key} does not allow async deletion: {reason}")]
    Precondition { key: String, reason: String },

    #[error("Resource {key} does not exist")]
    ResourceNotFound { key: String },

    #[error("Cannot delete a {kind} via this action")]
    UnsupportedResourceKind { kind: String },

    #[error("Invalid resource key: {value}")]
    InvalidResourceKey { value: String },

    #[error("Resource store error: {message}")]
    Store { message: String },

    #[error("Work queue error: {message}")]
    Queue { message: String },

    #[error("DNS queue error: {message}")]
    Dns { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, DeleteError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Data,
    Storage,
    Queue,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DeleteError {
    pub fn decode(message: impl Into<String>) -> Self {
        DeleteError::Decode {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DeleteError::Internal {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DeleteError::Decode { .. } | DeleteError::InvalidResourceKey { .. } => {
                ErrorCategory::Input
            }
            DeleteError::Precondition { .. } | DeleteError::ResourceNotFound { .. } => {
                ErrorCategory::Data
            }
            DeleteError::Store { .. }
            | DeleteError::IoError(_)
            | DeleteError::SerializationError(_)
            | DeleteError::CsvError(_) => ErrorCategory::Storage,
            DeleteError::Queue { .. } | DeleteError::Dns { .. } => ErrorCategory::Queue,
            DeleteError::ConfigError { .. }
            | DeleteError::ConfigValidationError { .. }
            | DeleteError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            DeleteError::UnsupportedResourceKind { .. } | DeleteError::Internal { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DeleteError::Dns { .. } => ErrorSeverity::Low,
            DeleteError::Precondition { .. }
            | DeleteError::Queue { .. }
            | DeleteError::Store { .. } => ErrorSeverity::Medium,
            DeleteError::Internal { .. } | DeleteError::UnsupportedResourceKind { .. } => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Input => {
                "Inspect the task parameters; the task stays leased for a day before it is retried"
            }
            ErrorCategory::Data => "The resource changed since the request was made; no retry is needed",
            ErrorCategory::Storage => "Check that the registry state file exists and is valid JSON",
            ErrorCategory::Queue => "Retry after the current lease expires",
            ErrorCategory::Configuration => "Check the command line flags and the TOML config file",
            ErrorCategory::Internal => "This is a bug; report it with the full log output",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            DeleteError::ConfigError { message } => format!("Configuration problem: {}", message),
            DeleteError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            DeleteError::IoError(e) => format!("Could not read or write a file: {}", e),
            other => other.to_string(),
        }
    }
}
