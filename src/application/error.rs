use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{render::RenderPipelineError, repos::RepoError},
    infra::error::InfraError,
};

/// Error chain flattened for a single log line.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn joined(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Render(#[from] RenderPipelineError),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status, loosely following `sysexits.h`.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::NotFound(_) => 66,
            AppError::Validation(_) => 65,
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Infra(InfraError::Database { .. })
            | AppError::Infra(InfraError::Queue { .. })
            | AppError::Repo(_) => 69,
            AppError::Render(RenderPipelineError::JobNotFound(_))
            | AppError::Render(RenderPipelineError::ArtifactNotFound(_)) => 66,
            AppError::Infra(InfraError::Io(_)) | AppError::Render(_) => 74,
            AppError::Infra(InfraError::Telemetry(_)) | AppError::Unexpected(_) => 70,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
