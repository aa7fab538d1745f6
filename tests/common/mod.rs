#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::Parser;

use bugroute::cli::Cli;
use bugroute::config::{Config, merge, parse_config};
use bugroute::error::{Error, Result};
use bugroute::ticket::TicketNotifier;
use bugroute::tracker::{Issue, IssueState, IssueTracker, ListFilter};

pub const TEST_CONFIG: &str = r#"
owner = "acme"
repositories = ["acme/inbox", "acme/web"]
auto_threshold = 0.75
manual_threshold = 0.5

[destinations.frontend]
repo = "acme/web"
keywords = ["login", "ui"]

[destinations.backend]
repo = "acme/api"
keywords = ["api", "database", "timeout", "server"]
"#;

/// Route-mode config with no inter-issue delay and the report under `dir`.
pub fn test_config(dir: &Path) -> Config {
    config_with_args(dir, &[])
}

pub fn config_with_args(dir: &Path, extra: &[&str]) -> Config {
    let report = dir.join("report.json");
    let mut args = vec![
        "bugroute",
        "route",
        "--delay-ms",
        "0",
        "--report",
        report.to_str().unwrap(),
    ];
    args.extend_from_slice(extra);
    let cli = Cli::parse_from(args);
    merge(parse_config(TEST_CONFIG).unwrap(), &cli).unwrap()
}

pub fn issue(repository: &str, number: u64, title: &str, body: &str, labels: &[&str]) -> Issue {
    Issue {
        repository: repository.to_string(),
        number,
        title: title.to_string(),
        body: body.to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        url: format!("https://github.com/{repository}/issues/{number}"),
        state: IssueState::Open,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(String),
    Get(String, u64),
    Create {
        repository: String,
        title: String,
        body: String,
        labels: Vec<String>,
    },
    Comment {
        repository: String,
        number: u64,
        body: String,
    },
    EditLabels {
        repository: String,
        number: u64,
        add: Vec<String>,
        remove: Vec<String>,
    },
    Close(String, u64),
}

impl Call {
    pub fn is_write(&self) -> bool {
        !matches!(self, Call::List(_) | Call::Get(..))
    }
}

/// In-memory tracker recording every call.
#[derive(Default)]
pub struct MockTracker {
    pub issues: HashMap<String, Vec<Issue>>,
    /// Labels returned by `get_issue`, overriding the listed ones.
    pub fresh_labels: HashMap<u64, Vec<String>>,
    /// State returned by `get_issue`, overriding the listed one.
    pub fresh_state: HashMap<u64, IssueState>,
    pub fail_list: HashSet<String>,
    pub fail_get: bool,
    pub fail_create: bool,
    pub fail_comment: bool,
    pub fail_labels: bool,
    pub fail_close: bool,
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl MockTracker {
    pub fn new(issues: Vec<Issue>) -> Self {
        let mut by_repo: HashMap<String, Vec<Issue>> = HashMap::new();
        for issue in issues {
            by_repo
                .entry(issue.repository.clone())
                .or_default()
                .push(issue);
        }
        Self {
            issues: by_repo,
            ..Default::default()
        }
    }

    pub fn call_log(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl IssueTracker for MockTracker {
    fn list_open_issues(&self, repository: &str, filter: &ListFilter<'_>) -> Result<Vec<Issue>> {
        self.record(Call::List(repository.to_string()));
        if self.fail_list.contains(repository) {
            return Err(Error::ExternalApi(format!("cannot list {repository}")));
        }
        Ok(self
            .issues
            .get(repository)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|i| !i.has_any_label(filter.exclude_labels))
            .collect())
    }

    fn get_issue(&self, repository: &str, number: u64) -> Result<Issue> {
        self.record(Call::Get(repository.to_string(), number));
        if self.fail_get {
            return Err(Error::ExternalApi("view failed".to_string()));
        }
        let mut issue = self
            .issues
            .get(repository)
            .and_then(|issues| issues.iter().find(|i| i.number == number))
            .cloned()
            .ok_or_else(|| Error::ExternalApi(format!("no issue {number}")))?;
        if let Some(labels) = self.fresh_labels.get(&number) {
            issue.labels = labels.clone();
        }
        if let Some(state) = self.fresh_state.get(&number) {
            issue.state = *state;
        }
        Ok(issue)
    }

    fn create_issue(
        &self,
        repository: &str,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<String> {
        self.record(Call::Create {
            repository: repository.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        });
        if self.fail_create {
            return Err(Error::ExternalApi("create failed".to_string()));
        }
        Ok(format!("https://github.com/{repository}/issues/100"))
    }

    fn comment(&self, repository: &str, number: u64, body: &str) -> Result<()> {
        self.record(Call::Comment {
            repository: repository.to_string(),
            number,
            body: body.to_string(),
        });
        if self.fail_comment {
            return Err(Error::ExternalApi("comment failed".to_string()));
        }
        Ok(())
    }

    fn edit_labels(
        &self,
        repository: &str,
        number: u64,
        add: &[&str],
        remove: &[&str],
    ) -> Result<()> {
        self.record(Call::EditLabels {
            repository: repository.to_string(),
            number,
            add: add.iter().map(|l| l.to_string()).collect(),
            remove: remove.iter().map(|l| l.to_string()).collect(),
        });
        if self.fail_labels {
            return Err(Error::ExternalApi("label edit failed".to_string()));
        }
        Ok(())
    }

    fn close(&self, repository: &str, number: u64) -> Result<()> {
        self.record(Call::Close(repository.to_string(), number));
        if self.fail_close {
            return Err(Error::ExternalApi("close failed".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockNotifier {
    pub fail: bool,
    pub notes: Arc<Mutex<Vec<(String, String)>>>,
}

impl TicketNotifier for MockNotifier {
    fn post_note(&self, ticket_id: &str, text: &str) -> Result<()> {
        self.notes
            .lock()
            .unwrap()
            .push((ticket_id.to_string(), text.to_string()));
        if self.fail {
            return Err(Error::ExternalApi("ticket api down".to_string()));
        }
        Ok(())
    }
}
