//! Report PDF render pipeline.
//!
//! Leaves first: [`sanitize`] and [`hasher`] are pure helpers, [`renderer`]
//! supervises the external renderer process, [`qa`] turns its QA report into
//! findings and failure overrides, and [`orchestrator`] owns the job state
//! machine that ties them to persistence, storage and notifications.

pub mod hasher;
mod jobs;
pub mod orchestrator;
pub mod qa;
pub mod renderer;
mod runtime;
pub mod sanitize;
mod types;

pub use hasher::{FileDigest, hash_file};
pub use jobs::{
    RENDER_JOB_MAX_ATTEMPTS, RenderReportPdfJobPayload, enqueue_render_report_pdf_job,
    process_render_report_pdf_job, request_render,
};
pub use orchestrator::{
    DEFAULT_RENDER_TIMEOUT, PdfRenderConfig, PdfRenderOrchestrator, RenderCollaborators,
    pdf_blob_key,
};
pub use qa::{QaFindings, classify, interpret, read_qa_report};
pub use renderer::{
    ExternalRenderer, ProcessOutcome, ProcessRenderer, ProcessResult, RenderInvocation, policy_env,
};
pub use runtime::{InFlightError, InFlightRenders, RenderGuard};
pub use types::{DocumentBuildError, DocumentBuilder, RenderFailure, RenderPipelineError};
