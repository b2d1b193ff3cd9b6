use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ArtifactsRepo, RepoError},
    domain::entities::{ArtifactPdf, ArtifactRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    org_id: Uuid,
    title: String,
    body_markdown: String,
    pdf_reference: Option<String>,
    pdf_content_type: Option<String>,
    pdf_size_bytes: Option<i64>,
    pdf_sha256: Option<String>,
    pdf_rendered_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ArtifactRow> for ArtifactRecord {
    fn from(row: ArtifactRow) -> Self {
        let pdf = match (
            row.pdf_reference,
            row.pdf_content_type,
            row.pdf_size_bytes,
            row.pdf_sha256,
            row.pdf_rendered_at,
        ) {
            (Some(reference), Some(content_type), Some(size_bytes), Some(sha256), Some(rendered_at)) => {
                Some(ArtifactPdf {
                    reference,
                    content_type,
                    size_bytes,
                    sha256,
                    rendered_at,
                })
            }
            _ => None,
        };

        Self {
            id: row.id,
            org_id: row.org_id,
            title: row.title,
            body_markdown: row.body_markdown,
            pdf,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ArtifactsRepo for PostgresRepositories {
    async fn find_artifact(&self, id: Uuid) -> Result<Option<ArtifactRecord>, RepoError> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id,
                   org_id,
                   title,
                   body_markdown,
                   pdf_reference,
                   pdf_content_type,
                   pdf_size_bytes,
                   pdf_sha256,
                   pdf_rendered_at,
                   created_at,
                   updated_at
              FROM report_artifacts
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn update_artifact_pdf(&self, id: Uuid, pdf: &ArtifactPdf) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE report_artifacts
               SET pdf_reference = $2,
                   pdf_content_type = $3,
                   pdf_size_bytes = $4,
                   pdf_sha256 = $5,
                   pdf_rendered_at = $6,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&pdf.reference)
        .bind(&pdf.content_type)
        .bind(pdf.size_bytes)
        .bind(&pdf.sha256)
        .bind(pdf.rendered_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
