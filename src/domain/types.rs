//! Shared domain enumerations aligned with persisted database enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single PDF render attempt (mirrors Postgres enum `report_render_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "report_render_status", rename_all = "snake_case")]
pub enum RenderStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl RenderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderStatus::Queued => "queued",
            RenderStatus::Running => "running",
            RenderStatus::Success => "success",
            RenderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RenderStatus::Success | RenderStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle linear.
    pub fn can_transition_to(self, next: RenderStatus) -> bool {
        matches!(
            (self, next),
            (RenderStatus::Queued, RenderStatus::Running)
                | (RenderStatus::Running, RenderStatus::Success)
                | (RenderStatus::Running, RenderStatus::Failed)
        )
    }
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable failure tag persisted on a failed render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RenderErrorCode {
    BuildHtmlFailed,
    RendererMissingDependency,
    RendererTimeout,
    RendererFailed,
    RendererExit(i32),
    BlockedRemoteRequests,
    MissingImages,
    PdfMissing,
    /// Code reported by the renderer itself in its QA report.
    Reported(String),
}

impl RenderErrorCode {
    pub fn as_string(&self) -> String {
        match self {
            RenderErrorCode::BuildHtmlFailed => "build_html_failed".to_string(),
            RenderErrorCode::RendererMissingDependency => "renderer_missing_dependency".to_string(),
            RenderErrorCode::RendererTimeout => "renderer_timeout".to_string(),
            RenderErrorCode::RendererFailed => "renderer_failed".to_string(),
            RenderErrorCode::RendererExit(code) => format!("renderer_exit_{code}"),
            RenderErrorCode::BlockedRemoteRequests => "blocked_remote_requests".to_string(),
            RenderErrorCode::MissingImages => "missing_images".to_string(),
            RenderErrorCode::PdfMissing => "pdf_missing".to_string(),
            RenderErrorCode::Reported(code) => code.clone(),
        }
    }
}

impl fmt::Display for RenderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<RenderErrorCode> for String {
    fn from(code: RenderErrorCode) -> Self {
        code.as_string()
    }
}

impl From<String> for RenderErrorCode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "build_html_failed" => RenderErrorCode::BuildHtmlFailed,
            "renderer_missing_dependency" => RenderErrorCode::RendererMissingDependency,
            "renderer_timeout" => RenderErrorCode::RendererTimeout,
            "renderer_failed" => RenderErrorCode::RendererFailed,
            "blocked_remote_requests" => RenderErrorCode::BlockedRemoteRequests,
            "missing_images" => RenderErrorCode::MissingImages,
            "pdf_missing" => RenderErrorCode::PdfMissing,
            other => match other
                .strip_prefix("renderer_exit_")
                .and_then(|code| code.parse::<i32>().ok())
            {
                Some(code) => RenderErrorCode::RendererExit(code),
                None => RenderErrorCode::Reported(value),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    RenderReportPdf,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::RenderReportPdf => "render_report_pdf",
        }
    }
}
