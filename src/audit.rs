//! Audit journal for cache changes and integrity failures
//!
//! Writes JSON lines to `<state_dir>/imgsync/audit.log`. On by default;
//! `general.audit_log = false` turns it off.

use crate::cache::SyncReport;
use crate::config::{schema::Config, ConfigManager};
use crate::error::ImgsyncError;
use crate::image_list::FetchReport;
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-based audit logger that appends JSON lines
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    /// Create a new audit logger from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
        }
    }

    /// Log an audit event as a JSON line
    ///
    /// IO failures are logged and the event dropped.
    pub async fn log(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write audit log: {}", e);
        }
    }

    /// Record lists that could not be fetched
    pub async fn record_fetch(&self, report: &FetchReport) {
        for failure in &report.failures {
            self.log(
                "list.fetch_failed",
                &serde_json::json!({
                    "list": failure.name,
                    "url": failure.url,
                    "reason": failure.error.to_string(),
                }),
            )
            .await;
        }
    }

    /// Record integrity failures and removals of a cache sync
    pub async fn record_sync(&self, report: &SyncReport) {
        for failure in &report.failures {
            if let ImgsyncError::VerificationFailed {
                expected, obtained, ..
            } = &failure.error
            {
                self.log(
                    "image.verification_failed",
                    &serde_json::json!({
                        "run_id": report.run_id,
                        "list": failure.list,
                        "identifier": failure.identifier,
                        "expected": expected,
                        "obtained": obtained,
                    }),
                )
                .await;
            }
        }

        if !report.removed.is_empty() {
            self.log(
                "cache.swept",
                &serde_json::json!({
                    "run_id": report.run_id,
                    "removed": report.removed,
                }),
            )
            .await;
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
