use apalis::prelude::{Data, Error as ApalisError};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    application::{
        jobs::{JobWorkerContext, enqueue_job, job_failed},
        render::RenderPipelineError,
        repos::{ArtifactsRepo, JobsRepo, NewRenderJob, RenderJobsRepo, RepoError},
    },
    domain::{entities::RenderJobRecord, types::JobType},
};

/// Dispatcher attempts per render job. An environment fault leaves the job
/// `running`, and the orchestrator skips any job that already left `queued`,
/// so a redelivery could never render again. Rerendering means a new job.
pub const RENDER_JOB_MAX_ATTEMPTS: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderReportPdfJobPayload {
    pub job_id: Uuid,
}

/// Hand a `queued` render job to the worker pool.
pub async fn enqueue_render_report_pdf_job<J: JobsRepo + ?Sized>(
    repo: &J,
    job_id: Uuid,
    scheduled_at: Option<OffsetDateTime>,
) -> Result<String, RepoError> {
    enqueue_job(
        repo,
        JobType::RenderReportPdf,
        &RenderReportPdfJobPayload { job_id },
        scheduled_at,
        RENDER_JOB_MAX_ATTEMPTS,
        0,
    )
    .await
}

/// Create a `queued` render job for an existing artifact and dispatch it.
pub async fn request_render<A, R, J>(
    artifacts: &A,
    render_jobs: &R,
    jobs: &J,
    artifact_id: Uuid,
) -> Result<RenderJobRecord, RenderPipelineError>
where
    A: ArtifactsRepo + ?Sized,
    R: RenderJobsRepo + ?Sized,
    J: JobsRepo + ?Sized,
{
    if artifacts.find_artifact(artifact_id).await?.is_none() {
        return Err(RenderPipelineError::ArtifactNotFound(artifact_id));
    }

    let job = render_jobs
        .create_render_job(NewRenderJob {
            id: Uuid::new_v4(),
            artifact_id,
        })
        .await?;
    let queue_id = enqueue_render_report_pdf_job(jobs, job.id, None).await?;

    info!(
        target = "application::render::request_render",
        job_id = %job.id,
        artifact_id = %artifact_id,
        queue_id = %queue_id,
        "render job queued"
    );
    Ok(job)
}

pub async fn process_render_report_pdf_job(
    payload: RenderReportPdfJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let started_at = Instant::now();

    match context.orchestrator.start_render(payload.job_id).await {
        Ok(()) => {
            info!(
                target = "application::render::process_render_report_pdf_job",
                job_id = %payload.job_id,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "render job handled"
            );
            Ok(())
        }
        Err(err) => {
            error!(
                target = "application::render::process_render_report_pdf_job",
                job_id = %payload.job_id,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %err,
                "render pipeline environment failure"
            );
            Err(job_failed(err))
        }
    }
}
