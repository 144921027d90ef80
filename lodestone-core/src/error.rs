//! Error types for the Lodestone system.

/// Result type alias for Lodestone operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Lodestone system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Lookup by an unknown id
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Duplicate unique constraint
    #[error("Already exists: {resource} {name}")]
    AlreadyExists { resource: String, name: String },

    /// Malformed request (k < 1, empty update patch, unknown index params)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown operator or malformed operand in a filter spec
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Zero-norm or non-finite embedding vector
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// New vector dimension differs from the library's locked dimension
    #[error("Invalid dimension: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// External embedding provider failure
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors (missing credential, bad provider name)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invariant violation
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create a new already exists error
    pub fn already_exists(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Create a new invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new invalid filter error
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Create a new invalid vector error
    pub fn invalid_vector(msg: impl Into<String>) -> Self {
        Self::InvalidVector(msg.into())
    }

    /// Create a new embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a dimension mismatch
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }

    /// HTTP status the surrounding server maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. } => 409,
            Self::InvalidRequest(_) | Self::InvalidFilter(_) => 400,
            Self::InvalidVector(_) | Self::DimensionMismatch { .. } => 422,
            Self::Embedding(_) => 502,
            Self::Config(_) | Self::Internal(_) | Self::Io(_) | Self::Json(_) => 500,
        }
    }
}
