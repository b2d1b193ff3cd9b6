//! Interpretation of the JSON QA report written by the renderer.

use std::{path::Path, time::Duration};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::types::RenderErrorCode;

use super::{
    renderer::ProcessResult,
    sanitize::{sanitize_error_code, sanitize_error_message, sanitize_qa_value, sanitize_url},
    types::RenderFailure,
};

/// Upper bound on persisted `blocked_urls` / `missing_images` entries.
pub const MAX_PERSISTED_URLS: usize = 200;
/// Reports above this size are ignored rather than parsed.
pub const MAX_QA_REPORT_BYTES: u64 = 8 * 1024 * 1024;

/// Sanitized findings extracted from a QA report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QaFindings {
    /// At most [`MAX_PERSISTED_URLS`] entries, in report order.
    pub blocked_urls: Vec<String>,
    /// Total blocked requests in the report, before capping.
    pub blocked_total: usize,
    pub missing_images: Vec<String>,
    pub missing_total: usize,
    /// Full sanitized report for persistence.
    pub report: Value,
    pub reported_code: Option<String>,
    pub reported_message: Option<String>,
}

/// Load the renderer's QA report. Never fails: anything absent, oversized,
/// unreadable or not a JSON object yields an empty object.
pub async fn read_qa_report(path: &Path) -> Value {
    let empty = || Value::Object(Map::new());

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) => {
            debug!(
                target = "application::render::qa",
                op = "qa::read",
                result = "absent",
                error = %err,
                "QA report not available"
            );
            return empty();
        }
    };
    if metadata.len() > MAX_QA_REPORT_BYTES {
        warn!(
            target = "application::render::qa",
            op = "qa::read",
            result = "oversized",
            size_bytes = metadata.len(),
            "QA report exceeds size limit; ignoring"
        );
        return empty();
    }

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                target = "application::render::qa",
                op = "qa::read",
                result = "error",
                error = %err,
                "Failed to read QA report"
            );
            return empty();
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            warn!(
                target = "application::render::qa",
                op = "qa::read",
                result = "not_object",
                "QA report is not a JSON object; ignoring"
            );
            empty()
        }
        Err(err) => {
            warn!(
                target = "application::render::qa",
                op = "qa::read",
                result = "malformed",
                error = %err,
                "QA report is not valid JSON; ignoring"
            );
            empty()
        }
    }
}

/// Extract sanitized findings from a raw report.
pub fn interpret(report: &Value) -> QaFindings {
    let (blocked_urls, blocked_total) = url_list(report.get("blocked_requests"));
    let (missing_images, missing_total) = url_list(report.get("missing_images"));

    let reported_code = report
        .get("error_code")
        .and_then(Value::as_str)
        .and_then(sanitize_error_code);
    let reported_message = report
        .get("error_message")
        .and_then(Value::as_str)
        .map(sanitize_error_message)
        .filter(|message| !message.is_empty());

    QaFindings {
        blocked_urls,
        blocked_total,
        missing_images,
        missing_total,
        report: sanitize_qa_value(report),
        reported_code,
        reported_message,
    }
}

/// Classify a finished renderer run.
///
/// Process classifications come first; a non-zero exit prefers the code the
/// renderer reported in its QA report. A zero exit is still a failure when
/// remote requests were blocked or, failing that, images went missing.
/// `None` means the run may proceed to the output checks.
pub fn classify(
    process: &ProcessResult,
    findings: &QaFindings,
    timeout: Duration,
) -> Option<RenderFailure> {
    if let Some(code) = process.failure_code() {
        if let RenderErrorCode::RendererExit(_) = code
            && let Some(reported) = findings.reported_code.as_ref()
        {
            let message = findings
                .reported_message
                .clone()
                .unwrap_or_else(|| process.failure_detail(timeout));
            return Some(RenderFailure::new(
                RenderErrorCode::from(reported.clone()),
                message,
            ));
        }
        return Some(RenderFailure::new(code, process.failure_detail(timeout)));
    }

    if findings.blocked_total > 0 {
        return Some(RenderFailure::new(
            RenderErrorCode::BlockedRemoteRequests,
            summarize(
                "renderer blocked",
                findings.blocked_total,
                "remote request",
                &findings.blocked_urls,
            ),
        ));
    }

    if findings.missing_total > 0 {
        return Some(RenderFailure::new(
            RenderErrorCode::MissingImages,
            summarize(
                "renderer could not load",
                findings.missing_total,
                "image",
                &findings.missing_images,
            ),
        ));
    }

    None
}

fn summarize(prefix: &str, total: usize, noun: &str, urls: &[String]) -> String {
    let plural = if total == 1 { "" } else { "s" };
    match urls.first() {
        Some(first) => format!("{prefix} {total} {noun}{plural} (first: {first})"),
        None => format!("{prefix} {total} {noun}{plural}"),
    }
}

fn url_list(field: Option<&Value>) -> (Vec<String>, usize) {
    let Some(Value::Array(items)) = field else {
        return (Vec::new(), 0);
    };

    let mut urls = Vec::new();
    let mut total = 0;
    for item in items {
        let raw = match item {
            Value::String(url) => Some(url.as_str()),
            Value::Object(entry) => entry.get("url").and_then(Value::as_str),
            _ => None,
        };
        let Some(raw) = raw else { continue };
        if raw.trim().is_empty() {
            continue;
        }
        total += 1;
        if urls.len() < MAX_PERSISTED_URLS {
            let url = sanitize_url(raw);
            if !url.is_empty() {
                urls.push(url);
            }
        }
    }
    (urls, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::renderer::ProcessOutcome;
    use serde_json::json;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(90);

    fn exited(code: i32) -> ProcessResult {
        ProcessResult {
            outcome: ProcessOutcome::Exited { code: Some(code) },
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn unreadable_reports_become_empty_objects() {
        let dir = TempDir::new().expect("temp dir");
        assert_eq!(read_qa_report(&dir.path().join("absent.json")).await, json!({}));

        let malformed = dir.path().join("malformed.json");
        tokio::fs::write(&malformed, b"{not json").await.expect("write");
        assert_eq!(read_qa_report(&malformed).await, json!({}));

        let array = dir.path().join("array.json");
        tokio::fs::write(&array, b"[1,2,3]").await.expect("write");
        assert_eq!(read_qa_report(&array).await, json!({}));

        let valid = dir.path().join("valid.json");
        tokio::fs::write(&valid, br#"{"pages": 3}"#).await.expect("write");
        assert_eq!(read_qa_report(&valid).await, json!({"pages": 3}));
    }

    #[test]
    fn extracts_strings_and_url_objects() {
        let report = json!({
            "blocked_requests": [
                "https://cdn.example.com/font.woff?token=abc",
                {"url": "https://user:pw@tracker.example.com/p#frag", "reason": "egress"},
                42,
                ""
            ],
            "missing_images": "not-a-list"
        });

        let findings = interpret(&report);
        assert_eq!(findings.blocked_total, 2);
        assert_eq!(
            findings.blocked_urls,
            vec![
                "https://cdn.example.com/font.woff?token=[REDACTED]".to_string(),
                "https://tracker.example.com/p".to_string(),
            ]
        );
        assert!(findings.missing_images.is_empty());
        assert_eq!(findings.missing_total, 0);
    }

    #[test]
    fn caps_lists_but_keeps_totals() {
        let urls: Vec<String> = (0..500)
            .map(|i| format!("https://blocked.example.com/{i}"))
            .collect();
        let findings = interpret(&json!({ "blocked_requests": urls }));
        assert_eq!(findings.blocked_urls.len(), MAX_PERSISTED_URLS);
        assert_eq!(findings.blocked_total, 500);
        assert_eq!(findings.blocked_urls[0], "https://blocked.example.com/0");
    }

    #[test]
    fn zero_exit_with_blocked_request_still_fails() {
        let findings = interpret(&json!({
            "blocked_requests": ["https://evil.example.com/x.js"],
            "missing_images": ["https://img.example.com/a.png"]
        }));

        let failure = classify(&exited(0), &findings, TIMEOUT).expect("policy failure");
        assert_eq!(failure.code, RenderErrorCode::BlockedRemoteRequests);
        assert!(failure.message.contains("1 remote request"), "{}", failure.message);
    }

    #[test]
    fn zero_exit_with_missing_images_fails() {
        let findings = interpret(&json!({"missing_images": [{"url": "https://img.example.com/a.png"}]}));
        let failure = classify(&exited(0), &findings, TIMEOUT).expect("policy failure");
        assert_eq!(failure.code, RenderErrorCode::MissingImages);
    }

    #[test]
    fn clean_zero_exit_passes() {
        assert_eq!(classify(&exited(0), &interpret(&json!({})), TIMEOUT), None);
    }

    #[test]
    fn nonzero_exit_prefers_reported_code() {
        let findings = interpret(&json!({
            "error_code": "Font_Load_Failed",
            "error_message": "could not load font from https://fonts.example.com/x?sig=123",
            "blocked_requests": ["https://evil.example.com"]
        }));

        let failure = classify(&exited(3), &findings, TIMEOUT).expect("failure");
        assert_eq!(
            failure.code,
            RenderErrorCode::Reported("font_load_failed".to_string())
        );
        assert!(failure.message.contains("sig=[REDACTED]"), "{}", failure.message);

        let plain = classify(&exited(3), &interpret(&json!({})), TIMEOUT).expect("failure");
        assert_eq!(plain.code, RenderErrorCode::RendererExit(3));
    }

    #[test]
    fn invalid_reported_codes_are_ignored() {
        let findings = interpret(&json!({"error_code": "DROP TABLE jobs;"}));
        assert_eq!(findings.reported_code, None);
        let failure = classify(&exited(9), &findings, TIMEOUT).expect("failure");
        assert_eq!(failure.code, RenderErrorCode::RendererExit(9));
    }

    #[test]
    fn timeout_outranks_reported_code_and_exit() {
        let findings = interpret(&json!({"error_code": "navigation_failed"}));
        let process = ProcessResult {
            outcome: ProcessOutcome::TimedOut,
            stdout: String::new(),
            stderr: "partial output".to_string(),
            elapsed: Duration::from_secs(1),
        };
        let failure = classify(&process, &findings, TIMEOUT).expect("failure");
        assert_eq!(failure.code, RenderErrorCode::RendererTimeout);
    }

    #[test]
    fn report_is_sanitized_for_persistence() {
        let findings = interpret(&json!({
            "headers": {"Authorization": "Bearer secret-value"},
            "console": ["fetch https://api.example.com/?api_key=k1 failed"]
        }));
        let serialized = findings.report.to_string();
        assert!(!serialized.contains("secret-value"), "{serialized}");
        assert!(!serialized.contains("k1"), "{serialized}");
    }
}
