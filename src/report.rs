use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::RoutingAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Destination issue created and the original closed.
    Routed,
    /// Labeled for manual review.
    Flagged,
    /// Nothing to do, or already handled.
    Skipped,
    /// Actionable, but no side effects were executed.
    DryRun,
    /// Destination issue created, follow-up on the original failed.
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub repository: String,
    pub issue_number: u64,
    pub title: String,
    pub url: String,
    pub action: RoutingAction,
    pub target: Option<String>,
    pub score: usize,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_issue_url: Option<String>,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingReport {
    pub timestamp: DateTime<Utc>,
    pub total_candidates: usize,
    pub successfully_routed: usize,
    pub results: Vec<RoutingResult>,
}

impl RoutingReport {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            total_candidates: 0,
            successfully_routed: 0,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: RoutingResult) {
        if result.status == ResultStatus::Routed {
            self.successfully_routed += 1;
        }
        self.results.push(result);
    }

    pub fn count(&self, status: ResultStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Report(format!("failed to serialize report: {e}")))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Report(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(path, self.to_json()? + "\n")
            .map_err(|e| Error::Report(format!("failed to write {}: {e}", path.display())))
    }
}
