//! Report persistence and the result envelope
//!
//! The envelope markers are fixed literal text: callers pattern-match on
//! them, so they must not change.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::models::RunContext;
use crate::Result;

pub const SUCCESS_MARKER: &str = "📄 Report Generated Successfully";
pub const FAILURE_MARKER: &str = "⚠️ Report Generation Notice";
pub const FAILURE_NOTICE: &str = "⚠️ Report Generation Notice\n\
     The report was generated but could not be saved to a file.\n\
     Please try again or contact support if the issue persists.";

#[derive(Debug, Clone, PartialEq)]
pub struct SavedReport {
    pub filename: String,
    pub download_url: String,
    pub report_id: String,
    pub path: PathBuf,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save(&self, ctx: &RunContext, markdown: &str) -> Result<SavedReport>;
}

/// Writes reports as markdown files under one directory.
pub struct FileReportStore {
    dir: PathBuf,
    base_url: Option<String>,
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.storage_path, settings.report_base_url.clone())
    }
}

/// First 16 hex chars of the body's SHA-256.
pub fn report_id(markdown: &str) -> String {
    let digest = Sha256::digest(markdown.as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub fn report_filename(ctx: &RunContext) -> String {
    let run = ctx.workflow_run_id.simple().to_string();
    format!(
        "risk_report_{}_{}.md",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &run[..8]
    )
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn save(&self, ctx: &RunContext, markdown: &str) -> Result<SavedReport> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            OrchestrationError::Storage(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let filename = report_filename(ctx);
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, markdown).await.map_err(|e| {
            OrchestrationError::Storage(format!("cannot write {}: {}", path.display(), e))
        })?;

        let download_url = match &self.base_url {
            Some(base) => format!("{}/{}", base, filename),
            None => path.display().to_string(),
        };

        info!(
            workflow_run_id = %ctx.workflow_run_id,
            filename = %filename,
            "Report saved"
        );

        Ok(SavedReport {
            report_id: report_id(markdown),
            filename,
            download_url,
            path,
        })
    }
}

pub fn success_envelope(saved: &SavedReport) -> String {
    format!(
        "{}\nFilename: {}\nDownload URL: {}\nReport ID: {}",
        SUCCESS_MARKER, saved.filename, saved.download_url, saved.report_id
    )
}

/// Report body followed by the success block or the failure notice.
pub fn apply_envelope(report: &str, saved: &Result<SavedReport>) -> String {
    let block = match saved {
        Ok(saved) => success_envelope(saved),
        Err(e) => {
            warn!("Report could not be saved: {}", e);
            FAILURE_NOTICE.to_string()
        }
    };
    format!("{}\n\n---\n\n{}\n", report.trim_end(), block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path(), Some("https://files.example.com/".into()));
        let ctx = RunContext::new();

        let saved = store.save(&ctx, "# Report").await.unwrap();

        assert!(saved.filename.starts_with("risk_report_"));
        assert!(saved.filename.ends_with(".md"));
        assert!(saved
            .filename
            .contains(&ctx.workflow_run_id.simple().to_string()[..8]));
        assert_eq!(
            saved.download_url,
            format!("https://files.example.com/{}", saved.filename)
        );
        assert_eq!(saved.report_id, report_id("# Report"));
        assert_eq!(saved.report_id.len(), 16);

        let written = tokio::fs::read_to_string(&saved.path).await.unwrap();
        assert_eq!(written, "# Report");
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let store = FileReportStore::new(&blocker, None);
        let err = store.save(&RunContext::new(), "# Report").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Storage(_)));
    }

    #[test]
    fn test_success_envelope_markers() {
        let saved = SavedReport {
            filename: "risk_report_x.md".into(),
            download_url: "https://f/risk_report_x.md".into(),
            report_id: "abc".into(),
            path: PathBuf::from("risk_report_x.md"),
        };
        let out = apply_envelope("# Report\n", &Ok(saved));
        assert!(out.starts_with("# Report\n\n---\n\n"));
        assert!(out.contains(
            "📄 Report Generated Successfully\nFilename: risk_report_x.md\nDownload URL: https://f/risk_report_x.md\nReport ID: abc"
        ));
    }

    #[test]
    fn test_failure_envelope_notice() {
        let out = apply_envelope(
            "# Report",
            &Err(OrchestrationError::Storage("disk full".into())),
        );
        assert!(out.contains(FAILURE_MARKER));
        assert!(out.contains("The report was generated but could not be saved to a file.\nPlease try again or contact support if the issue persists."));
        assert!(!out.contains(SUCCESS_MARKER));
    }
}
