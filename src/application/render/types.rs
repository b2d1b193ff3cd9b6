use thiserror::Error;
use uuid::Uuid;

use crate::{
    application::repos::{BlobStoreError, RepoError},
    domain::{entities::ArtifactRecord, types::RenderErrorCode},
};

use super::sanitize::sanitize_error_message;

/// Errors raised while turning an artifact into renderer input HTML.
#[derive(Debug, Clone, Error)]
pub enum DocumentBuildError {
    #[error("document `{title}` has no content")]
    Empty { title: String },
    #[error("document input is {actual} bytes, exceeding the {max} byte limit")]
    TooLarge { actual: usize, max: usize },
    #[error("document rendering failed: {message}")]
    Render { message: String },
}

/// Produces the self-contained HTML document handed to the renderer.
/// Implementations must be pure: the same artifact yields the same HTML.
pub trait DocumentBuilder: Send + Sync {
    fn build_html(&self, artifact: &ArtifactRecord) -> Result<String, DocumentBuildError>;
}

/// A classified render failure, ready to be persisted on the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub code: RenderErrorCode,
    /// Sanitized operator-facing detail.
    pub message: String,
}

impl RenderFailure {
    pub fn new(code: RenderErrorCode, message: impl AsRef<str>) -> Self {
        Self {
            code,
            message: sanitize_error_message(message.as_ref()),
        }
    }
}

/// Environment faults that abort `start_render` instead of failing the job.
#[derive(Debug, Error)]
pub enum RenderPipelineError {
    #[error("render job `{0}` not found")]
    JobNotFound(Uuid),
    #[error("artifact `{0}` not found")]
    ArtifactNotFound(Uuid),
    #[error("failed to prepare render workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("failed to hash rendered pdf: {0}")]
    Hash(#[source] std::io::Error),
    #[error("failed to open rendered pdf for storage: {0}")]
    OpenPdf(#[source] std::io::Error),
    #[error("rendered pdf size {0} exceeds the supported range")]
    SizeOverflow(u64),
    #[error(transparent)]
    Blob(#[from] BlobStoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_messages_are_sanitized_on_construction() {
        let failure = RenderFailure::new(
            RenderErrorCode::BuildHtmlFailed,
            "template failed: Authorization: Bearer abc.def.ghi",
        );
        assert_eq!(failure.code, RenderErrorCode::BuildHtmlFailed);
        assert!(!failure.message.contains("abc.def.ghi"), "{}", failure.message);
        assert!(failure.message.starts_with("template failed"));
    }
}
