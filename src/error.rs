//! Error taxonomy for the report pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the pipeline can surface to its caller.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The template name failed validation (traversal, absolute, not normalized).
    #[error("Invalid template name: {0:?}")]
    InvalidName(String),

    /// The main document of a resolvable template does not exist.
    #[error("Template document not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Deployment problem, e.g. the pagination script cannot be located.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The rendering engine failed to launch, load, evaluate, or print.
    #[error("Rendering failed: {0}")]
    Render(String),

    /// A template or partial exists but fails to compile or render.
    #[error("Template error: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    /// Errors caused by the request itself rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ReportError::InvalidName(_) | ReportError::NotFound { .. })
    }

    /// Rendering failures carry no partial state and may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReportError::Render(_))
    }
}

impl From<handlebars::TemplateError> for ReportError {
    fn from(e: handlebars::TemplateError) -> Self {
        ReportError::Template(e.to_string())
    }
}

impl From<handlebars::RenderError> for ReportError {
    fn from(e: handlebars::RenderError) -> Self {
        ReportError::Template(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ReportError::InvalidName("../x".into()).is_client_error());
        assert!(ReportError::NotFound { path: PathBuf::from("a") }.is_client_error());
        assert!(!ReportError::Configuration("missing".into()).is_client_error());
        assert!(ReportError::Render("crash".into()).is_retryable());
        assert!(!ReportError::Template("bad".into()).is_retryable());
    }
}
