//! Postgres `NOTIFY` transport for render status events.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::application::events::{RenderStatusEvent, StatusNotifier};

pub const STATUS_CHANNEL: &str = "report_pdf_events";

/// Publishes status events on a Postgres channel for org-scoped listeners.
#[derive(Clone)]
pub struct PgStatusNotifier {
    pool: PgPool,
}

impl PgStatusNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Message body sent over `NOTIFY`.
pub fn envelope(event: &RenderStatusEvent) -> serde_json::Value {
    serde_json::json!({
        "scope_id": event.scope_id,
        "event_type": event.event_type,
        "payload": event.payload(),
    })
}

#[async_trait]
impl StatusNotifier for PgStatusNotifier {
    async fn notify(&self, event: RenderStatusEvent) {
        let message = envelope(&event).to_string();
        let result = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(STATUS_CHANNEL)
            .bind(message)
            .execute(&self.pool)
            .await;

        if let Err(err) = result {
            warn!(
                target = "infra::events",
                op = "notify",
                result = "error",
                job_id = %event.job_id,
                status = %event.status,
                error = %err,
                "Failed to publish render status event"
            );
        }
    }
}
