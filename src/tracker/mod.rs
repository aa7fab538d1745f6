pub mod github;

use serde::{Deserialize, Serialize};

use crate::classifier::IssueContent;
use crate::error::Result;

pub const LABEL_NEEDS_ROUTING: &str = "needs-routing";
pub const LABEL_ROUTED: &str = "routed";
pub const LABEL_AUTO_ROUTED: &str = "auto-routed";
pub const LABEL_MANUAL_REVIEW: &str = "manual-review";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub repository: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub url: String,
    pub state: IssueState,
}

impl Issue {
    pub fn content(&self) -> IssueContent {
        IssueContent::new(self.title.clone(), self.body.clone())
    }

    pub fn has_any_label(&self, labels: &[String]) -> bool {
        self.labels
            .iter()
            .any(|l| labels.iter().any(|x| l.eq_ignore_ascii_case(x)))
    }
}

/// Issue filter for a listing call.
#[derive(Debug, Clone, Default)]
pub struct ListFilter<'a> {
    /// Only issues carrying this label.
    pub label: Option<&'a str>,
    /// Drop issues carrying any of these labels (case-insensitive).
    pub exclude_labels: &'a [String],
    pub limit: u32,
}

/// Remote issue tracker the router reads from and writes decisions to.
pub trait IssueTracker {
    /// Open issues in `repository` that pass `filter`.
    fn list_open_issues(&self, repository: &str, filter: &ListFilter<'_>) -> Result<Vec<Issue>>;

    /// Current state of a single issue.
    fn get_issue(&self, repository: &str, number: u64) -> Result<Issue>;

    /// Create an issue and return its URL.
    fn create_issue(
        &self,
        repository: &str,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<String>;

    fn comment(&self, repository: &str, number: u64, body: &str) -> Result<()>;

    fn edit_labels(&self, repository: &str, number: u64, add: &[&str], remove: &[&str])
    -> Result<()>;

    fn close(&self, repository: &str, number: u64) -> Result<()>;
}
