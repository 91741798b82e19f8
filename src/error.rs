use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Config error: {0}")]
    Config(String),

    /// A definition whose identity collapses to zero or several symbols.
    #[error("Unresolvable identifier `{name}` ({reason})\n    in {file}:{line}:{column}")]
    UnresolvableIdentifier {
        name: String,
        reason: String,
        file: String,
        line: u32,
        column: u32,
    },

    #[error("Unsupported syntax, unhandled node kinds:\n  {}\n    in {file}:{line}:{column}", .kinds.join("\n  "))]
    UnsupportedSyntax {
        kinds: Vec<String>,
        file: String,
        line: u32,
        column: u32,
    },

    #[error("Store integrity error: {0}")]
    StoreIntegrity(String),

    #[error("Index error: {0}")]
    Index(String),
}

impl IndexerError {
    /// Maps SQLite constraint violations to `StoreIntegrity`, everything else to `Database`.
    pub fn from_store(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => {
                IndexerError::StoreIntegrity(err.to_string())
            }
            _ => IndexerError::Database(err),
        }
    }

    pub fn is_fatal_resolution(&self) -> bool {
        matches!(
            self,
            IndexerError::UnresolvableIdentifier { .. } | IndexerError::UnsupportedSyntax { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
