//! Render status notifications for observers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::types::RenderStatus;

pub const STATUS_CHANGED_EVENT: &str = "report_pdf.status_changed";

/// Published on every persisted render status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderStatusEvent {
    /// Organisation that owns the artifact; the event's delivery scope.
    pub scope_id: Uuid,
    pub event_type: &'static str,
    pub job_id: Uuid,
    pub artifact_id: Uuid,
    pub status: RenderStatus,
    /// Empty unless `status` is `failed`.
    pub error_code: String,
}

impl RenderStatusEvent {
    pub fn status_changed(
        scope_id: Uuid,
        job_id: Uuid,
        artifact_id: Uuid,
        status: RenderStatus,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            scope_id,
            event_type: STATUS_CHANGED_EVENT,
            job_id,
            artifact_id,
            status,
            error_code: error_code.into(),
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "job_id": self.job_id,
            "artifact_id": self.artifact_id,
            "status": self.status.as_str(),
            "error_code": self.error_code,
        })
    }
}

/// Best-effort event publication. Implementations swallow and log their own
/// failures; a lost notification never affects the job outcome.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn notify(&self, event: RenderStatusEvent);
}
