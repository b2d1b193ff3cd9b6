//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::RenderStatus;

/// Content type stamped on every stored report PDF.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Persisted render attempt for a single artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderJobRecord {
    pub id: Uuid,
    pub artifact_id: Uuid,
    pub status: RenderStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub blocked_urls: Vec<String>,
    pub missing_images: Vec<String>,
    pub error_code: String,
    pub error_message: String,
    pub qa_report: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Report run that owns rendered PDFs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub body_markdown: String,
    pub pdf: Option<ArtifactPdf>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// PDF metadata written as one group once a render succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPdf {
    pub reference: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub rendered_at: OffsetDateTime,
}
