//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use pressroom::{
    application::{
        events::{RenderStatusEvent, StatusNotifier},
        repos::{
            ArtifactsRepo, CompleteRenderJobParams, FailRenderJobParams, JobsRepo, NewJobRecord,
            NewRenderJob, RenderJobsRepo, RepoError,
        },
    },
    domain::{
        entities::{ArtifactPdf, ArtifactRecord, RenderJobRecord},
        types::RenderStatus,
    },
};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryRepos {
    pub jobs: Mutex<HashMap<Uuid, RenderJobRecord>>,
    pub artifacts: Mutex<HashMap<Uuid, ArtifactRecord>>,
    pub transitions: Mutex<Vec<(Uuid, RenderStatus)>>,
    pub enqueued: Mutex<Vec<NewJobRecord>>,
}

impl MemoryRepos {
    pub async fn insert_artifact(&self, body: &str) -> ArtifactRecord {
        let now = OffsetDateTime::now_utc();
        let artifact = ArtifactRecord {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            title: "Quarterly Operations Review".to_string(),
            body_markdown: body.to_string(),
            pdf: None,
            created_at: now,
            updated_at: now,
        };
        self.artifacts
            .lock()
            .await
            .insert(artifact.id, artifact.clone());
        artifact
    }

    pub async fn insert_job(&self, artifact_id: Uuid, status: RenderStatus) -> RenderJobRecord {
        self.insert_job_with_id(Uuid::new_v4(), artifact_id, status)
            .await
    }

    pub async fn insert_job_with_id(
        &self,
        id: Uuid,
        artifact_id: Uuid,
        status: RenderStatus,
    ) -> RenderJobRecord {
        let now = OffsetDateTime::now_utc();
        let job = RenderJobRecord {
            id,
            artifact_id,
            status,
            started_at: (status != RenderStatus::Queued).then_some(now),
            completed_at: status.is_terminal().then_some(now),
            blocked_urls: Vec::new(),
            missing_images: Vec::new(),
            error_code: String::new(),
            error_message: String::new(),
            qa_report: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().await.insert(job.id, job.clone());
        job
    }

    pub async fn job(&self, id: Uuid) -> RenderJobRecord {
        self.jobs.lock().await.get(&id).cloned().expect("job exists")
    }

    pub async fn artifact(&self, id: Uuid) -> ArtifactRecord {
        self.artifacts
            .lock()
            .await
            .get(&id)
            .cloned()
            .expect("artifact exists")
    }

    pub async fn transitions_for(&self, id: Uuid) -> Vec<RenderStatus> {
        self.transitions
            .lock()
            .await
            .iter()
            .filter(|(job_id, _)| *job_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        next: RenderStatus,
        apply: impl FnOnce(&mut RenderJobRecord),
    ) -> Result<bool, RepoError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(RepoError::NotFound)?;
        if !job.status.can_transition_to(next) {
            return Ok(false);
        }
        job.status = next;
        job.updated_at = OffsetDateTime::now_utc();
        apply(job);
        self.transitions.lock().await.push((id, next));
        Ok(true)
    }
}

#[async_trait]
impl RenderJobsRepo for MemoryRepos {
    async fn create_render_job(&self, job: NewRenderJob) -> Result<RenderJobRecord, RepoError> {
        Ok(self
            .insert_job_with_id(job.id, job.artifact_id, RenderStatus::Queued)
            .await)
    }

    async fn find_render_job(&self, id: Uuid) -> Result<Option<RenderJobRecord>, RepoError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn mark_render_job_running(
        &self,
        id: Uuid,
        started_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        self.transition(id, RenderStatus::Running, |job| {
            job.started_at = Some(started_at);
        })
        .await
    }

    async fn fail_render_job(&self, params: FailRenderJobParams) -> Result<(), RepoError> {
        let moved = self
            .transition(params.id, RenderStatus::Failed, |job| {
                job.completed_at = Some(params.completed_at);
                job.blocked_urls = params.blocked_urls;
                job.missing_images = params.missing_images;
                job.error_code = params.error_code;
                job.error_message = params.error_message;
                job.qa_report = params.qa_report;
            })
            .await?;
        moved.then_some(()).ok_or_else(|| RepoError::Integrity {
            message: "render job was not running".to_string(),
        })
    }

    async fn complete_render_job(&self, params: CompleteRenderJobParams) -> Result<(), RepoError> {
        let moved = self
            .transition(params.id, RenderStatus::Success, |job| {
                job.completed_at = Some(params.completed_at);
                job.blocked_urls = params.blocked_urls;
                job.missing_images = params.missing_images;
                job.error_code.clear();
                job.error_message.clear();
                job.qa_report = params.qa_report;
            })
            .await?;
        moved.then_some(()).ok_or_else(|| RepoError::Integrity {
            message: "render job was not running".to_string(),
        })
    }
}

#[async_trait]
impl ArtifactsRepo for MemoryRepos {
    async fn find_artifact(&self, id: Uuid) -> Result<Option<ArtifactRecord>, RepoError> {
        Ok(self.artifacts.lock().await.get(&id).cloned())
    }

    async fn update_artifact_pdf(&self, id: Uuid, pdf: &ArtifactPdf) -> Result<(), RepoError> {
        let mut artifacts = self.artifacts.lock().await;
        let artifact = artifacts.get_mut(&id).ok_or(RepoError::NotFound)?;
        artifact.pdf = Some(pdf.clone());
        Ok(())
    }
}

#[async_trait]
impl JobsRepo for MemoryRepos {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        let mut enqueued = self.enqueued.lock().await;
        enqueued.push(job);
        Ok(format!("queue-{}", enqueued.len()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<RenderStatusEvent>>,
}

impl RecordingNotifier {
    pub async fn statuses(&self) -> Vec<(RenderStatus, String)> {
        self.events
            .lock()
            .await
            .iter()
            .map(|event| (event.status, event.error_code.clone()))
            .collect()
    }
}

#[async_trait]
impl StatusNotifier for RecordingNotifier {
    async fn notify(&self, event: RenderStatusEvent) {
        self.events.lock().await.push(event);
    }
}
