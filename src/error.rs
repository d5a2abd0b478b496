use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapError {
    /// OS-level process enumeration failed. The handler logs this and still
    /// serves an empty list rather than a 5xx.
    #[error("process enumeration failed: {0}")]
    Provider(String),

    #[error("JSON encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP server error: {0}")]
    Http(#[from] hyper::Error),
}
