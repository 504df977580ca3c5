use thiserror::Error;

/// Failure classes of the embedding gateway.
///
/// Kept separate from [`KnowRagError`] so callers can tell "the provider failed"
/// apart from "the provider answered with nothing" or "answered with the wrong count".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("no input text to embed")]
    EmptyInput,

    #[error("provider returned no vector")]
    NoVectorReturned,

    #[error("provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("provider request failed: {0}")]
    Provider(String),
}

#[derive(Error, Debug)]
pub enum KnowRagError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate content: fingerprint {fingerprint} already tracked by {existing_id}")]
    DuplicateContent {
        fingerprint: String,
        existing_id: String,
    },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store upsert failed: {0}")]
    VectorStoreUpsert(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Tracking store error: {0}")]
    TrackingStore(String),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    #[error("Campaign {0} has no projects")]
    CampaignNoProjects(String),

    #[error("Query too short: {len} characters (minimum {min})")]
    QueryTooShort { len: usize, min: usize },

    #[error("Query too long: {len} characters (maximum {max})")]
    QueryTooLong { len: usize, max: usize },

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Invalid filters: {0}")]
    InvalidFilters(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Custom(String),
}

impl KnowRagError {
    /// Stable classification code recorded on tracking rows and failed-record reports.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateContent { .. } => "DUPLICATE_CONTENT",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::VectorStoreUpsert(_) | Self::VectorStore(_) => "VECTOR_STORE_ERROR",
            Self::TrackingStore(_) | Self::Database(_) => "DATABASE_ERROR",
            Self::CampaignNotFound(_) => "CAMPAIGN_NOT_FOUND",
            Self::CampaignNoProjects(_) => "CAMPAIGN_NO_PROJECTS",
            Self::QueryTooShort { .. } => "QUERY_TOO_SHORT",
            Self::QueryTooLong { .. } => "QUERY_TOO_LONG",
            Self::SearchFailed(_) => "SEARCH_FAILED",
            Self::InvalidFilters(_) => "INVALID_FILTERS",
            Self::Parse { .. } | Self::Serialization(_) => "PARSE_ERROR",
            Self::Storage(_) | Self::Io(_) => "STORAGE_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::HttpError(_) => "UPSTREAM_ERROR",
            Self::ConfigError(_) | Self::TomlParsing(_) => "CONFIG_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Custom(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status a transport layer should answer with.
    ///
    /// Anything not explicitly client-caused falls through to 500.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::QueryTooShort { .. }
            | Self::QueryTooLong { .. }
            | Self::InvalidFilters(_)
            | Self::Parse { .. } => 400,
            Self::CampaignNotFound(_) => 404,
            Self::DuplicateContent { .. } => 409,
            Self::CampaignNoProjects(_) => 422,
            Self::Cancelled => 499,
            Self::Embedding(_) | Self::HttpError(_) => 502,
            Self::VectorStoreUpsert(_) | Self::VectorStore(_) | Self::SearchFailed(_) => 503,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, KnowRagError>;
