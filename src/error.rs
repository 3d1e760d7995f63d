
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequeryError {
    #[error("Unsupported variant: '{variant}' is not a registered search for {entity}")]
    UnsupportedVariant { entity: String, variant: String },
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Resolver error: {0}")]
    Resolve(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, RequeryError>;

// Helper conversions
impl From<rusqlite::Error> for RequeryError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
