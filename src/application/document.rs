//! Default document builder: artifact markdown to a standalone HTML page.

use comrak::{markdown_to_html, options::Options};

use crate::{
    application::render::{DocumentBuildError, DocumentBuilder},
    domain::entities::ArtifactRecord,
};

pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 2 * 1024 * 1024;

const PRINT_STYLESHEET: &str = "\
@page { size: A4; margin: 18mm 16mm; }
body { font-family: \"Inter\", \"Helvetica Neue\", Arial, sans-serif; font-size: 11pt; line-height: 1.5; color: #1f2328; }
h1, h2, h3 { page-break-after: avoid; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #d0d7de; padding: 4px 8px; text-align: left; }
pre, code { font-family: \"JetBrains Mono\", Menlo, monospace; font-size: 9.5pt; }
pre { white-space: pre-wrap; page-break-inside: avoid; }
img { max-width: 100%; }";

/// Renders report markdown with Comrak and cleans it with Ammonia.
pub struct ComrakDocumentBuilder {
    options: Options<'static>,
    sanitizer: ammonia::Builder<'static>,
    max_markdown_bytes: usize,
}

impl ComrakDocumentBuilder {
    pub fn new(max_markdown_bytes: usize) -> Self {
        let mut options = Options::default();
        let ext = &mut options.extension;
        ext.strikethrough = true;
        ext.table = true;
        ext.autolink = true;
        ext.tasklist = true;
        ext.footnotes = true;
        ext.description_lists = true;
        options.render.r#unsafe = true;

        Self {
            options,
            sanitizer: ammonia::Builder::default(),
            max_markdown_bytes,
        }
    }
}

impl Default for ComrakDocumentBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DOCUMENT_BYTES)
    }
}

impl DocumentBuilder for ComrakDocumentBuilder {
    fn build_html(&self, artifact: &ArtifactRecord) -> Result<String, DocumentBuildError> {
        let markdown = artifact.body_markdown.as_str();
        if markdown.trim().is_empty() {
            return Err(DocumentBuildError::Empty {
                title: artifact.title.clone(),
            });
        }
        if markdown.len() > self.max_markdown_bytes {
            return Err(DocumentBuildError::TooLarge {
                actual: markdown.len(),
                max: self.max_markdown_bytes,
            });
        }

        let body = self
            .sanitizer
            .clean(&markdown_to_html(markdown, &self.options))
            .to_string();
        let title = ammonia::clean_text(&artifact.title);

        Ok(format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\n{PRINT_STYLESHEET}\n</style>\n</head>\n<body>\n<h1 class=\"report-title\">{title}</h1>\n{body}</body>\n</html>\n"
        ))
    }
}
