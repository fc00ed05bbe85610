use thiserror::Error;

/// Reason a cluster rejected a well-formed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    RecordExists,
    GenerationMismatch,
    IndexAlreadyExists,
    ModuleNotFound,
    ModuleNotActive,
    InvalidRequest,
    Unsupported,
}

impl ServerErrorKind {
    /// Numeric result code reported by the cluster for this rejection.
    pub fn result_code(self) -> i32 {
        match self {
            ServerErrorKind::GenerationMismatch => 3,
            ServerErrorKind::InvalidRequest => 4,
            ServerErrorKind::RecordExists => 5,
            ServerErrorKind::Unsupported => 16,
            ServerErrorKind::IndexAlreadyExists => 200,
            ServerErrorKind::ModuleNotFound => 1301,
            ServerErrorKind::ModuleNotActive => 1302,
        }
    }
}

impl std::fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerErrorKind::RecordExists => write!(f, "record exists"),
            ServerErrorKind::GenerationMismatch => write!(f, "generation mismatch"),
            ServerErrorKind::IndexAlreadyExists => write!(f, "index already exists"),
            ServerErrorKind::ModuleNotFound => write!(f, "module not found"),
            ServerErrorKind::ModuleNotActive => write!(f, "module not active"),
            ServerErrorKind::InvalidRequest => write!(f, "invalid request"),
            ServerErrorKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    InvalidConfig,
    RecordNotFound,
    TypeMismatch,
    Overflow,
    IndexNotFound,
    JobNotFound,
    JobStateRegression,
    Timeout,
    TransportError,
    ServerError,
    Io,
    Closed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::RecordNotFound => "record_not_found",
            ErrorCode::TypeMismatch => "type_mismatch",
            ErrorCode::Overflow => "overflow",
            ErrorCode::IndexNotFound => "index_not_found",
            ErrorCode::JobNotFound => "job_not_found",
            ErrorCode::JobStateRegression => "job_state_regression",
            ErrorCode::Timeout => "timeout",
            ErrorCode::TransportError => "transport_error",
            ErrorCode::ServerError => "server_error",
            ErrorCode::Io => "io",
            ErrorCode::Closed => "closed",
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("record not found: {key}")]
    RecordNotFound { key: String },
    #[error("type mismatch on bin '{bin}': expected {expected}, got {actual}")]
    TypeMismatch {
        bin: String,
        expected: String,
        actual: String,
    },
    #[error("integer overflow on bin '{bin}'")]
    Overflow { bin: String },
    #[error("index '{name}' not found in namespace '{namespace}'")]
    IndexNotFound { namespace: String, name: String },
    #[error("job '{job_id}' not found")]
    JobNotFound { job_id: String },
    #[error("job '{job_id}' moved backwards from {from} to {to}")]
    JobStateRegression {
        job_id: String,
        from: crate::job::JobStatus,
        to: crate::job::JobStatus,
    },
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        operation: &'static str,
        elapsed_ms: u64,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error ({kind}, code {}): {message}", .kind.result_code())]
    Server {
        kind: ServerErrorKind,
        message: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("client is closed")]
    Closed,
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ClientError::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            ClientError::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            ClientError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            ClientError::Overflow { .. } => ErrorCode::Overflow,
            ClientError::IndexNotFound { .. } => ErrorCode::IndexNotFound,
            ClientError::JobNotFound { .. } => ErrorCode::JobNotFound,
            ClientError::JobStateRegression { .. } => ErrorCode::JobStateRegression,
            ClientError::Timeout { .. } => ErrorCode::Timeout,
            ClientError::Transport(_) => ErrorCode::TransportError,
            ClientError::Server { .. } => ErrorCode::ServerError,
            ClientError::Io(_) => ErrorCode::Io,
            ClientError::Closed => ErrorCode::Closed,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Kinds a caller-driven wait loop may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::JobNotFound { .. } | ClientError::Timeout { .. } | ClientError::Transport(_)
        )
    }

    pub(crate) fn server(kind: ServerErrorKind, message: impl Into<String>) -> Self {
        ClientError::Server {
            kind,
            message: message.into(),
        }
    }
}
