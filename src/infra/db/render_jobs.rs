use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CompleteRenderJobParams, FailRenderJobParams, NewRenderJob, RenderJobsRepo, RepoError,
    },
    domain::{entities::RenderJobRecord, types::RenderStatus},
};

use super::{PostgresRepositories, map_sqlx_error, util::expect_one_row};

const RENDER_JOB_COLUMNS: &str = "id, artifact_id, status, started_at, completed_at, \
     blocked_urls, missing_images, error_code, error_message, qa_report, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RenderJobRow {
    id: Uuid,
    artifact_id: Uuid,
    status: RenderStatus,
    started_at: Option<OffsetDateTime>,
    completed_at: Option<OffsetDateTime>,
    blocked_urls: Vec<String>,
    missing_images: Vec<String>,
    error_code: String,
    error_message: String,
    qa_report: serde_json::Value,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<RenderJobRow> for RenderJobRecord {
    fn from(row: RenderJobRow) -> Self {
        Self {
            id: row.id,
            artifact_id: row.artifact_id,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            blocked_urls: row.blocked_urls,
            missing_images: row.missing_images,
            error_code: row.error_code,
            error_message: row.error_message,
            qa_report: row.qa_report,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl RenderJobsRepo for PostgresRepositories {
    async fn create_render_job(&self, job: NewRenderJob) -> Result<RenderJobRecord, RepoError> {
        let sql = format!(
            "INSERT INTO report_render_jobs (id, artifact_id, status) \
             VALUES ($1, $2, $3) \
             RETURNING {RENDER_JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RenderJobRow>(&sql)
            .bind(job.id)
            .bind(job.artifact_id)
            .bind(RenderStatus::Queued)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_render_job(&self, id: Uuid) -> Result<Option<RenderJobRecord>, RepoError> {
        let sql = format!("SELECT {RENDER_JOB_COLUMNS} FROM report_render_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, RenderJobRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn mark_render_job_running(
        &self,
        id: Uuid,
        started_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE report_render_jobs
               SET status = $2,
                   started_at = $3,
                   updated_at = now()
             WHERE id = $1
               AND status = $4
            "#,
        )
        .bind(id)
        .bind(RenderStatus::Running)
        .bind(started_at)
        .bind(RenderStatus::Queued)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_render_job(&self, params: FailRenderJobParams) -> Result<(), RepoError> {
        let FailRenderJobParams {
            id,
            completed_at,
            blocked_urls,
            missing_images,
            error_code,
            error_message,
            qa_report,
        } = params;

        let result = sqlx::query(
            r#"
            UPDATE report_render_jobs
               SET status = $2,
                   completed_at = $3,
                   blocked_urls = $4,
                   missing_images = $5,
                   error_code = $6,
                   error_message = $7,
                   qa_report = $8,
                   updated_at = now()
             WHERE id = $1
               AND status = $9
            "#,
        )
        .bind(id)
        .bind(RenderStatus::Failed)
        .bind(completed_at)
        .bind(blocked_urls)
        .bind(missing_images)
        .bind(error_code)
        .bind(error_message)
        .bind(qa_report)
        .bind(RenderStatus::Running)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        expect_one_row(result.rows_affected(), "render job", "a running job")
    }

    async fn complete_render_job(&self, params: CompleteRenderJobParams) -> Result<(), RepoError> {
        let CompleteRenderJobParams {
            id,
            completed_at,
            blocked_urls,
            missing_images,
            qa_report,
        } = params;

        let result = sqlx::query(
            r#"
            UPDATE report_render_jobs
               SET status = $2,
                   completed_at = $3,
                   blocked_urls = $4,
                   missing_images = $5,
                   error_code = '',
                   error_message = '',
                   qa_report = $6,
                   updated_at = now()
             WHERE id = $1
               AND status = $7
            "#,
        )
        .bind(id)
        .bind(RenderStatus::Success)
        .bind(completed_at)
        .bind(blocked_urls)
        .bind(missing_images)
        .bind(qa_report)
        .bind(RenderStatus::Running)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        expect_one_row(result.rows_affected(), "render job", "a running job")
    }
}
