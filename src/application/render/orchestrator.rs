//! Render job state machine: `queued → running → success | failed`.
//!
//! Every renderer, QA or document failure ends in a persisted `failed` job
//! with sanitized diagnostics. Only environment faults (database, hashing,
//! blob storage) escape as [`RenderPipelineError`].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        events::{RenderStatusEvent, StatusNotifier},
        repos::{
            ArtifactsRepo, BlobStore, ByteStream, CompleteRenderJobParams, FailRenderJobParams,
            RenderJobsRepo,
        },
    },
    domain::{
        entities::{ArtifactPdf, ArtifactRecord, PDF_CONTENT_TYPE, RenderJobRecord},
        types::{RenderErrorCode, RenderStatus},
    },
};

use super::{
    hasher::hash_file,
    qa::{QaFindings, classify, interpret, read_qa_report},
    renderer::{ExternalRenderer, RenderInvocation, policy_env},
    runtime::{InFlightError, InFlightRenders},
    types::{DocumentBuilder, RenderFailure, RenderPipelineError},
};

pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(90);
pub const PDF_BLOB_PREFIX: &str = "report-pdfs";

const METRIC_RENDER_TOTAL: &str = "pressroom_render_total";
const METRIC_RENDER_SKIPPED_TOTAL: &str = "pressroom_render_skipped_total";
const METRIC_RENDER_MS: &str = "pressroom_render_ms";
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Renderer settings fixed at construction time.
#[derive(Debug, Clone)]
pub struct PdfRenderConfig {
    pub assets_dir: PathBuf,
    pub browser_binary: Option<PathBuf>,
    pub timeout: Duration,
    pub disable_sandbox: bool,
    pub allow_remote_requests: bool,
    /// Parent for per-job working directories; the system temp dir when unset.
    pub workdir_root: Option<PathBuf>,
}

impl Default for PdfRenderConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            browser_binary: None,
            timeout: DEFAULT_RENDER_TIMEOUT,
            disable_sandbox: false,
            allow_remote_requests: false,
            workdir_root: None,
        }
    }
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct RenderCollaborators {
    pub jobs: Arc<dyn RenderJobsRepo>,
    pub artifacts: Arc<dyn ArtifactsRepo>,
    pub documents: Arc<dyn DocumentBuilder>,
    pub renderer: Arc<dyn ExternalRenderer>,
    pub blobs: Arc<dyn BlobStore>,
    pub notifier: Arc<dyn StatusNotifier>,
}

#[derive(Clone)]
pub struct PdfRenderOrchestrator {
    deps: RenderCollaborators,
    config: PdfRenderConfig,
    inflight: InFlightRenders,
}

enum RenderOutcome {
    Failed {
        failure: RenderFailure,
        findings: QaFindings,
    },
    Rendered {
        pdf: ArtifactPdf,
        findings: QaFindings,
    },
}

/// Storage key for one render attempt; unique per job so attempts never collide.
pub fn pdf_blob_key(artifact_id: Uuid, job_id: Uuid) -> String {
    format!("{PDF_BLOB_PREFIX}/{artifact_id}/{job_id}.pdf")
}

impl PdfRenderOrchestrator {
    pub fn new(deps: RenderCollaborators, config: PdfRenderConfig) -> Self {
        Self {
            deps,
            config,
            inflight: InFlightRenders::new(),
        }
    }

    /// Run one render attempt for `job_id`.
    ///
    /// Safe to call repeatedly: a job that is already running (here or in
    /// another worker) or already terminal is left untouched.
    pub async fn start_render(&self, job_id: Uuid) -> Result<(), RenderPipelineError> {
        let started_at = Instant::now();

        let _guard = match self.inflight.acquire(job_id) {
            Ok(guard) => guard,
            Err(InFlightError::AlreadyRunning { job_id }) => {
                record_skip(job_id, "in_flight");
                return Ok(());
            }
        };

        let job = self
            .deps
            .jobs
            .find_render_job(job_id)
            .await?
            .ok_or(RenderPipelineError::JobNotFound(job_id))?;
        if job.status != RenderStatus::Queued {
            record_skip(job_id, job.status.as_str());
            return Ok(());
        }

        let artifact = self
            .deps
            .artifacts
            .find_artifact(job.artifact_id)
            .await?
            .ok_or(RenderPipelineError::ArtifactNotFound(job.artifact_id))?;

        let claimed = self
            .deps
            .jobs
            .mark_render_job_running(job_id, OffsetDateTime::now_utc())
            .await?;
        if !claimed {
            record_skip(job_id, "claimed_elsewhere");
            return Ok(());
        }
        self.publish(&artifact, job_id, RenderStatus::Running, "")
            .await;

        match self.execute(&job, &artifact).await? {
            RenderOutcome::Failed { failure, findings } => {
                self.fail(&job, &artifact, failure, findings, started_at)
                    .await
            }
            RenderOutcome::Rendered { pdf, findings } => {
                self.complete(&job, &artifact, pdf, findings, started_at)
                    .await
            }
        }
    }

    async fn execute(
        &self,
        job: &RenderJobRecord,
        artifact: &ArtifactRecord,
    ) -> Result<RenderOutcome, RenderPipelineError> {
        let html = match self.deps.documents.build_html(artifact) {
            Ok(html) => html,
            Err(err) => {
                return Ok(RenderOutcome::Failed {
                    failure: RenderFailure::new(RenderErrorCode::BuildHtmlFailed, err.to_string()),
                    findings: QaFindings::default(),
                });
            }
        };

        let workdir = self.create_workdir()?;
        let invocation = RenderInvocation {
            html_path: workdir.path().join("input.html"),
            pdf_path: workdir.path().join("output.pdf"),
            qa_report_path: workdir.path().join("qa-report.json"),
            assets_dir: self.config.assets_dir.clone(),
            browser_binary: self.config.browser_binary.clone(),
            timeout: self.config.timeout,
            extra_env: policy_env(
                self.config.disable_sandbox,
                self.config.allow_remote_requests,
            ),
        };
        tokio::fs::write(&invocation.html_path, html)
            .await
            .map_err(RenderPipelineError::Workspace)?;

        let process = self.deps.renderer.run(&invocation).await;
        let findings = interpret(&read_qa_report(&invocation.qa_report_path).await);

        if let Some(failure) = classify(&process, &findings, self.config.timeout) {
            return Ok(RenderOutcome::Failed { failure, findings });
        }

        if !pdf_present(&invocation.pdf_path).await {
            return Ok(RenderOutcome::Failed {
                failure: RenderFailure::new(
                    RenderErrorCode::PdfMissing,
                    "renderer exited successfully but produced no PDF",
                ),
                findings,
            });
        }

        let digest = hash_file(&invocation.pdf_path)
            .await
            .map_err(RenderPipelineError::Hash)?;
        let size_bytes = i64::try_from(digest.size_bytes)
            .map_err(|_| RenderPipelineError::SizeOverflow(digest.size_bytes))?;

        let file = File::open(&invocation.pdf_path)
            .await
            .map_err(RenderPipelineError::OpenPdf)?;
        let reference = self
            .deps
            .blobs
            .save(&pdf_blob_key(artifact.id, job.id), file_chunks(file))
            .await?;

        let pdf = ArtifactPdf {
            reference,
            content_type: PDF_CONTENT_TYPE.to_string(),
            size_bytes,
            sha256: digest.sha256_hex,
            rendered_at: OffsetDateTime::now_utc(),
        };
        self.deps
            .artifacts
            .update_artifact_pdf(artifact.id, &pdf)
            .await?;

        Ok(RenderOutcome::Rendered { pdf, findings })
    }

    async fn fail(
        &self,
        job: &RenderJobRecord,
        artifact: &ArtifactRecord,
        failure: RenderFailure,
        findings: QaFindings,
        started_at: Instant,
    ) -> Result<(), RenderPipelineError> {
        let error_code = failure.code.as_string();
        self.deps
            .jobs
            .fail_render_job(FailRenderJobParams {
                id: job.id,
                completed_at: OffsetDateTime::now_utc(),
                blocked_urls: findings.blocked_urls,
                missing_images: findings.missing_images,
                error_code: error_code.clone(),
                error_message: failure.message,
                qa_report: findings.report,
            })
            .await?;

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        counter!(METRIC_RENDER_TOTAL, "result" => "failed", "error_code" => error_code.clone())
            .increment(1);
        histogram!(METRIC_RENDER_MS, "result" => "failed").record(elapsed_ms);
        warn!(
            target = "application::render::orchestrator",
            op = "start_render",
            result = "failed",
            elapsed_ms = elapsed_ms as u64,
            job_id = %job.id,
            artifact_id = %artifact.id,
            error_code = %error_code,
            blocked_urls = findings.blocked_total,
            missing_images = findings.missing_total,
            "Report PDF render failed"
        );

        self.publish(artifact, job.id, RenderStatus::Failed, error_code)
            .await;
        Ok(())
    }

    async fn complete(
        &self,
        job: &RenderJobRecord,
        artifact: &ArtifactRecord,
        pdf: ArtifactPdf,
        findings: QaFindings,
        started_at: Instant,
    ) -> Result<(), RenderPipelineError> {
        self.deps
            .jobs
            .complete_render_job(CompleteRenderJobParams {
                id: job.id,
                completed_at: OffsetDateTime::now_utc(),
                blocked_urls: findings.blocked_urls,
                missing_images: findings.missing_images,
                qa_report: findings.report,
            })
            .await?;

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        counter!(METRIC_RENDER_TOTAL, "result" => "success").increment(1);
        histogram!(METRIC_RENDER_MS, "result" => "success").record(elapsed_ms);
        info!(
            target = "application::render::orchestrator",
            op = "start_render",
            result = "success",
            elapsed_ms = elapsed_ms as u64,
            job_id = %job.id,
            artifact_id = %artifact.id,
            pdf_bytes = pdf.size_bytes,
            pdf_sha256 = %pdf.sha256,
            "Report PDF rendered"
        );

        self.publish(artifact, job.id, RenderStatus::Success, "")
            .await;
        Ok(())
    }

    async fn publish(
        &self,
        artifact: &ArtifactRecord,
        job_id: Uuid,
        status: RenderStatus,
        error_code: impl Into<String>,
    ) {
        self.deps
            .notifier
            .notify(RenderStatusEvent::status_changed(
                artifact.org_id,
                job_id,
                artifact.id,
                status,
                error_code,
            ))
            .await;
    }

    fn create_workdir(&self) -> Result<tempfile::TempDir, RenderPipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pressroom-render-");
        let workdir = match self.config.workdir_root.as_ref() {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        workdir.map_err(RenderPipelineError::Workspace)
    }
}

fn record_skip(job_id: Uuid, reason: &'static str) {
    counter!(METRIC_RENDER_SKIPPED_TOTAL, "reason" => reason).increment(1);
    info!(
        target = "application::render::orchestrator",
        op = "start_render",
        result = "skipped",
        job_id = %job_id,
        reason,
        "Render job not queued; skipping"
    );
}

/// A zero-length file counts as missing.
async fn pdf_present(path: &Path) -> bool {
    matches!(
        tokio::fs::metadata(path).await,
        Ok(metadata) if metadata.is_file() && metadata.len() > 0
    )
}

fn file_chunks(file: File) -> ByteStream {
    stream::try_unfold(file, next_chunk).boxed()
}

async fn next_chunk(mut file: File) -> Result<Option<(Bytes, File)>, std::io::Error> {
    let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];
    let read = file.read(&mut buffer).await?;
    if read == 0 {
        return Ok(None);
    }
    buffer.truncate(read);
    Ok(Some((Bytes::from(buffer), file)))
}
