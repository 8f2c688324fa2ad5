use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotatorError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Encrypted PDFs are not supported")]
    Encrypted,

    #[error("No document loaded")]
    NoDocument,

    #[error("Page {page} is outside the document (1..={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Malformed media payload: {0}")]
    MalformedMedia(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl From<lopdf::Error> for AnnotatorError {
    fn from(e: lopdf::Error) -> Self {
        AnnotatorError::OperationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnnotatorError>;
