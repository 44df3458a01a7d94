// crates/vpt-cli/src/report.rs
// ============================================================================
// Module: Script Report
// Description: Builds and uploads the minimal end-of-script report and log
//              artifacts (§6 "Object storage", §9 Non-goals).
// Purpose: Produce *a* report URL for `SCRIPT_REPORT_URL` without a
//          report-HTML templating subsystem, which is explicitly out of
//          scope.
// Dependencies: vpt-core, vpt-broker
// ============================================================================

//! ## Overview
//! The report is a fixed, unstyled HTML wrapper around a plain-text
//! summary — not a template engine with partials or themes. Its remote key
//! follows `vpt_broker::well_known::script_report_key`; the run log sits
//! next to it under the same directory, a naming convention local to this
//! crate since the well-known key list (§6) does not define one.

use std::fs;
use std::path::Path;

use vpt_broker::well_known::script_report_key;
use vpt_core::ObjectStore;
use vpt_core::UploadRequest;
use vpt_core::VptError;

/// A plain-text summary of one script run, before it is rendered and
/// uploaded.
#[derive(Debug, Clone)]
pub struct ScriptSummary {
    /// Script name (`goto` or `fullzap`).
    pub script_name: String,
    /// Whether the run succeeded overall.
    pub success: bool,
    /// Human-readable outcome line, e.g. an error message on failure.
    pub message: String,
    /// One line per step taken, in order.
    pub steps: Vec<String>,
}

impl ScriptSummary {
    /// Renders this summary as a minimal, unstyled HTML document.
    #[must_use]
    pub fn to_html(&self) -> String {
        let status = if self.success { "PASSED" } else { "FAILED" };
        let mut body = format!(
            "<html><body><h1>{} - {status}</h1><p>{}</p><ol>",
            escape_html(&self.script_name),
            escape_html(&self.message)
        );
        for step in &self.steps {
            body.push_str(&format!("<li>{}</li>", escape_html(step)));
        }
        body.push_str("</ol></body></html>");
        body
    }

    /// Renders this summary's steps as a plain-text log.
    #[must_use]
    pub fn to_log_text(&self) -> String {
        let mut text = format!("script={} success={}\n{}\n", self.script_name, self.success, self.message);
        for step in &self.steps {
            text.push_str(step);
            text.push('\n');
        }
        text
    }
}

/// Escapes the handful of characters that matter inside our own fixed HTML
/// wrapper.
fn escape_html(input: &str) -> String {
    input.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Writes the report and log artifacts under `capture_root`, uploads them,
/// and returns their public URLs as `(report_url, logs_url)`.
///
/// # Errors
///
/// Returns [`VptError`] when the local write or the upload fails.
pub fn publish(
    object_store: &(dyn ObjectStore + Send + Sync),
    capture_root: &str,
    device_model: &str,
    summary: &ScriptSummary,
    yyyymmdd: &str,
    unix_timestamp: i64,
) -> Result<(String, String), VptError> {
    let dir = format!("{}/reports", capture_root.trim_end_matches('/'));
    fs::create_dir_all(&dir).map_err(|err| VptError::Io(err.to_string()))?;

    let report_local = format!("{dir}/report.html");
    fs::write(&report_local, summary.to_html()).map_err(|err| VptError::Io(err.to_string()))?;
    let logs_local = format!("{dir}/logs.txt");
    fs::write(&logs_local, summary.to_log_text()).map_err(|err| VptError::Io(err.to_string()))?;

    let report_key = script_report_key(device_model, &summary.script_name, yyyymmdd, unix_timestamp);
    let logs_key = logs_key_for(&report_key);

    let outcome = object_store.upload_files(&[
        UploadRequest { local_path: report_local, remote_path: report_key.clone(), content_type: Some("text/html".to_string()) },
        UploadRequest { local_path: logs_local, remote_path: logs_key.clone(), content_type: Some("text/plain".to_string()) },
    ])?;

    let report_url = uploaded_url(&outcome, &report_key).unwrap_or_else(|| object_store.get_public_url(&report_key));
    let logs_url = uploaded_url(&outcome, &logs_key).unwrap_or_else(|| object_store.get_public_url(&logs_key));
    Ok((report_url, logs_url))
}

/// Derives the run-log key alongside a `.../report.html` key.
fn logs_key_for(report_key: &str) -> String {
    report_key.replacen("report.html", "logs.txt", 1)
}

/// Looks up the public URL an upload batch reported for `remote_path`, by
/// matching local-file basenames.
fn uploaded_url(outcome: &vpt_core::UploadOutcome, remote_path: &str) -> Option<String> {
    let expected = Path::new(remote_path).file_name()?;
    outcome.uploaded_files.iter().find_map(|(local, url)| {
        (Path::new(local).file_name() == Some(expected)).then(|| url.clone())
    })
}
