//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{ArtifactPdf, ArtifactRecord, RenderJobRecord};
use crate::domain::types::JobType;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewRenderJob {
    pub id: Uuid,
    pub artifact_id: Uuid,
}

/// Terminal failure write. Lists must already be sanitized and capped.
#[derive(Debug, Clone)]
pub struct FailRenderJobParams {
    pub id: Uuid,
    pub completed_at: OffsetDateTime,
    pub blocked_urls: Vec<String>,
    pub missing_images: Vec<String>,
    pub error_code: String,
    pub error_message: String,
    pub qa_report: serde_json::Value,
}

/// Terminal success write; clears any error fields.
#[derive(Debug, Clone)]
pub struct CompleteRenderJobParams {
    pub id: Uuid,
    pub completed_at: OffsetDateTime,
    pub blocked_urls: Vec<String>,
    pub missing_images: Vec<String>,
    pub qa_report: serde_json::Value,
}

#[async_trait]
pub trait RenderJobsRepo: Send + Sync {
    async fn create_render_job(&self, job: NewRenderJob) -> Result<RenderJobRecord, RepoError>;

    async fn find_render_job(&self, id: Uuid) -> Result<Option<RenderJobRecord>, RepoError>;

    /// Move a `queued` job to `running`. Returns `false` when the job was not
    /// `queued` at the time of the write (another worker claimed it first).
    async fn mark_render_job_running(
        &self,
        id: Uuid,
        started_at: OffsetDateTime,
    ) -> Result<bool, RepoError>;

    async fn fail_render_job(&self, params: FailRenderJobParams) -> Result<(), RepoError>;

    async fn complete_render_job(&self, params: CompleteRenderJobParams) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ArtifactsRepo: Send + Sync {
    async fn find_artifact(&self, id: Uuid) -> Result<Option<ArtifactRecord>, RepoError>;

    /// Write all PDF metadata fields in a single atomic update.
    async fn update_artifact_pdf(&self, id: Uuid, pdf: &ArtifactPdf) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;
}

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error("blob payload is empty")]
    EmptyPayload,
    #[error("blob size exceeds supported range")]
    SizeOverflow,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Streamed chunks fed into [`BlobStore::save`].
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Durable storage for rendered artifacts. Keys are never overwritten in place
/// by concurrent writers because every render attempt uses its own key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist the stream under `key`, returning an opaque reference.
    async fn save(&self, key: &str, stream: ByteStream) -> Result<String, BlobStoreError>;
}
