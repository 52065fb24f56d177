use thiserror::Error;

/// Errors surfaced by the overlay engine.
///
/// The variants follow how callers are expected to react: input errors are
/// reported to the user and reset the session, asset errors abort an export,
/// geometry errors indicate a broken page partition and are never expected
/// at runtime.
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Unsupported or corrupt document: {0}")]
    InputError(String),

    #[error("Asset could not be loaded: {0}")]
    AssetError(String),

    #[error("Annotation {id} references page {page_index}, but only {page_count} pages exist")]
    GeometryError {
        id: String,
        page_index: usize,
        page_count: usize,
    },

    #[error("PDF write failed: {0}")]
    WriterError(String),
}

impl OverlayError {
    /// Whether the error is caused by the source document itself
    pub fn is_input_error(&self) -> bool {
        matches!(self, OverlayError::InputError(_))
    }
}

pub type OverlayResult<T> = Result<T, OverlayError>;
