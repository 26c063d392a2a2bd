use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldStampError {
    #[error("asset error: {0}")]
    Asset(String),
    #[error("document error: {0}")]
    Document(String),
    #[error("page {requested} out of range (document has {available} pages)")]
    PageOutOfRange { requested: usize, available: usize },
    #[error("no usable font (tried: {})", .tried.join(", "))]
    FontUnavailable { tried: Vec<String> },
    #[error("render error: {0}")]
    Render(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for FieldStampError {
    fn from(value: lopdf::Error) -> Self {
        FieldStampError::Document(value.to_string())
    }
}
