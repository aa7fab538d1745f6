use std::process::Command;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::{Issue, IssueState, IssueTracker, ListFilter};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const ISSUE_FIELDS: &str = "number,title,body,labels,url,state";

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    body: Option<String>,
    labels: Vec<GhLabel>,
    url: String,
    #[serde(default)]
    state: IssueState,
}

/// Abstraction over `gh` CLI execution for testability.
pub trait GhClient {
    fn run(&self, args: &[&str]) -> Result<String>;
}

/// Real `gh` CLI client. Every invocation is attempted once.
struct DefaultGhClient;

impl GhClient for DefaultGhClient {
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("gh")
            .args(args)
            .output()
            .map_err(|e| Error::ExternalApi(format!("failed to run gh: {e}")))?;

        if output.status.success() {
            String::from_utf8(output.stdout)
                .map_err(|e| Error::ExternalApi(format!("invalid utf8 from gh: {e}")))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::ExternalApi(format!(
                "gh {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )))
        }
    }
}

/// GitHub issue tracker backed by the `gh` CLI.
///
/// Read-only calls are retried with exponential backoff. Writes are sent
/// once: a retried `issue create` could leave duplicates behind.
pub struct GitHubTracker {
    client: Box<dyn GhClient>,
    backoff_ms: u64,
}

impl Default for GitHubTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubTracker {
    pub fn new() -> Self {
        Self {
            client: Box::new(DefaultGhClient),
            backoff_ms: INITIAL_BACKOFF_MS,
        }
    }

    #[cfg(test)]
    fn with_client(client: Box<dyn GhClient>) -> Self {
        Self {
            client,
            backoff_ms: 1,
        }
    }

    fn read(&self, args: &[&str]) -> Result<String> {
        retry_with_backoff_ms(|| self.client.run(args), self.backoff_ms, MAX_RETRIES)
    }

    fn parse_issue(repository: &str, gh: GhIssue) -> Issue {
        Issue {
            repository: repository.to_string(),
            number: gh.number,
            title: gh.title,
            body: gh.body.unwrap_or_default(),
            labels: gh.labels.into_iter().map(|l| l.name).collect(),
            url: gh.url,
            state: gh.state,
        }
    }
}

impl IssueTracker for GitHubTracker {
    fn list_open_issues(&self, repository: &str, filter: &ListFilter<'_>) -> Result<Vec<Issue>> {
        let limit = filter.limit.to_string();
        let mut args: Vec<&str> = vec![
            "issue",
            "list",
            "--repo",
            repository,
            "--state",
            "open",
            "--json",
            ISSUE_FIELDS,
            "--limit",
            limit.as_str(),
        ];
        if let Some(label) = filter.label {
            args.push("--label");
            args.push(label);
        }
        let json = self.read(&args)?;

        let issues: Vec<GhIssue> = serde_json::from_str(&json)
            .map_err(|e| Error::ExternalApi(format!("failed to parse gh output: {e}")))?;

        let issues: Vec<Issue> = issues
            .into_iter()
            .map(|gh| Self::parse_issue(repository, gh))
            .filter(|issue| !issue.has_any_label(filter.exclude_labels))
            .collect();

        debug!(repository, count = issues.len(), "fetched open issues");
        Ok(issues)
    }

    fn get_issue(&self, repository: &str, number: u64) -> Result<Issue> {
        let number = number.to_string();
        let json = self.read(&[
            "issue",
            "view",
            &number,
            "--repo",
            repository,
            "--json",
            ISSUE_FIELDS,
        ])?;
        let issue: GhIssue = serde_json::from_str(&json)
            .map_err(|e| Error::ExternalApi(format!("failed to parse gh output: {e}")))?;
        Ok(Self::parse_issue(repository, issue))
    }

    fn create_issue(
        &self,
        repository: &str,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<String> {
        let mut args: Vec<&str> = vec![
            "issue", "create", "--repo", repository, "--title", title, "--body", body,
        ];
        for label in labels {
            args.push("--label");
            args.push(*label);
        }
        let url = self.client.run(&args)?.trim().to_string();
        debug!(repository, url = %url, "created issue");
        Ok(url)
    }

    fn comment(&self, repository: &str, number: u64, body: &str) -> Result<()> {
        let number = number.to_string();
        self.client.run(&[
            "issue", "comment", &number, "--repo", repository, "--body", body,
        ])?;
        Ok(())
    }

    fn edit_labels(
        &self,
        repository: &str,
        number: u64,
        add: &[&str],
        remove: &[&str],
    ) -> Result<()> {
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }
        let number = number.to_string();
        let add = add.join(",");
        let remove = remove.join(",");
        let mut args: Vec<&str> = vec!["issue", "edit", number.as_str(), "--repo", repository];
        if !add.is_empty() {
            args.push("--add-label");
            args.push(&add);
        }
        if !remove.is_empty() {
            args.push("--remove-label");
            args.push(&remove);
        }
        self.client.run(&args)?;
        Ok(())
    }

    fn close(&self, repository: &str, number: u64) -> Result<()> {
        let number = number.to_string();
        self.client
            .run(&["issue", "close", &number, "--repo", repository])?;
        Ok(())
    }
}

fn retry_with_backoff_ms<F, T>(f: F, initial_backoff_ms: u64, max_retries: u32) -> Result<T>
where
    F: Fn() -> Result<T>,
{
    let mut backoff_ms = initial_backoff_ms;

    for attempt in 1..=max_retries {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if attempt < max_retries => {
                warn!(attempt, error = %e, backoff_ms, "retrying after transient error");
                thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct MockGhClient {
        responses: RefCell<Vec<Result<String>>>,
        calls: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl MockGhClient {
        fn new(responses: Vec<Result<String>>) -> (Self, Rc<RefCell<Vec<Vec<String>>>>) {
            let calls = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    responses: RefCell::new(responses),
                    calls: Rc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl GhClient for MockGhClient {
        fn run(&self, args: &[&str]) -> Result<String> {
            self.calls
                .borrow_mut()
                .push(args.iter().map(|a| a.to_string()).collect());
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                Err(Error::ExternalApi("no more mock responses".to_string()))
            } else {
                responses.remove(0)
            }
        }
    }

    fn issue_json(number: u64, title: &str, labels: &[&str], body: &str) -> serde_json::Value {
        serde_json::json!({
            "number": number,
            "title": title,
            "body": body,
            "labels": labels.iter().map(|l| serde_json::json!({"name": l})).collect::<Vec<_>>(),
            "url": format!("https://github.com/acme/inbox/issues/{number}")
        })
    }

    fn excluded() -> Vec<String> {
        vec!["routed".to_string(), "manual-review".to_string()]
    }

    #[test]
    fn test_list_filters_routing_labels() {
        let json = serde_json::to_string(&[
            issue_json(1, "Task 1", &["bug"], "body 1"),
            issue_json(2, "Task 2", &["bug", "routed"], "body 2"),
            issue_json(3, "Task 3", &["Manual-Review"], "body 3"),
            issue_json(4, "Task 4", &[], "body 4"),
        ])
        .unwrap();
        let (client, calls) = MockGhClient::new(vec![Ok(json)]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        let exclude = excluded();
        let filter = ListFilter {
            label: None,
            exclude_labels: &exclude,
            limit: 50,
        };
        let issues = tracker.list_open_issues("acme/inbox", &filter).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].number, 1);
        assert_eq!(issues[1].number, 4);
        assert_eq!(issues[0].repository, "acme/inbox");

        let args = &calls.borrow()[0];
        assert!(args.contains(&"--repo".to_string()));
        assert!(args.contains(&"50".to_string()));
        assert!(!args.contains(&"--label".to_string()));
    }

    #[test]
    fn test_list_passes_required_label() {
        let (client, calls) = MockGhClient::new(vec![Ok("[]".to_string())]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        let filter = ListFilter {
            label: Some("needs-routing"),
            exclude_labels: &[],
            limit: 100,
        };
        let issues = tracker.list_open_issues("acme/inbox", &filter).unwrap();
        assert!(issues.is_empty());
        let args = &calls.borrow()[0];
        let pos = args.iter().position(|a| a == "--label").unwrap();
        assert_eq!(args[pos + 1], "needs-routing");
    }

    #[test]
    fn test_list_handles_null_body() {
        let json = r#"[{"number":1,"title":"No body","body":null,"labels":[],"url":"https://example.com/1"}]"#;
        let (client, _) = MockGhClient::new(vec![Ok(json.to_string())]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        let filter = ListFilter {
            limit: 10,
            ..Default::default()
        };
        let issues = tracker.list_open_issues("acme/inbox", &filter).unwrap();
        assert_eq!(issues[0].body, "");
    }

    #[test]
    fn test_list_retries_transient_failure() {
        let (client, calls) = MockGhClient::new(vec![
            Err(Error::ExternalApi("502".to_string())),
            Ok("[]".to_string()),
        ]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        let filter = ListFilter {
            limit: 10,
            ..Default::default()
        };
        tracker.list_open_issues("acme/inbox", &filter).unwrap();
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_list_error_propagated() {
        let (client, _) = MockGhClient::new(vec![
            Err(Error::ExternalApi("gh not found".to_string())),
            Err(Error::ExternalApi("gh not found".to_string())),
            Err(Error::ExternalApi("gh not found".to_string())),
        ]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        let filter = ListFilter {
            limit: 10,
            ..Default::default()
        };
        let err = tracker
            .list_open_issues("acme/inbox", &filter)
            .unwrap_err();
        assert!(err.to_string().contains("gh not found"));
    }

    #[test]
    fn test_get_issue() {
        let json = serde_json::to_string(&issue_json(7, "Detail", &["bug"], "text")).unwrap();
        let (client, _) = MockGhClient::new(vec![Ok(json)]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        let issue = tracker.get_issue("acme/inbox", 7).unwrap();
        assert_eq!(issue.number, 7);
        assert_eq!(issue.labels, vec!["bug"]);
        assert_eq!(issue.state, IssueState::Open);
    }

    #[test]
    fn test_get_issue_reads_state() {
        let mut json = issue_json(7, "Detail", &[], "text");
        json["state"] = serde_json::json!("CLOSED");
        let (client, calls) = MockGhClient::new(vec![Ok(json.to_string())]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        let issue = tracker.get_issue("acme/inbox", 7).unwrap();
        assert_eq!(issue.state, IssueState::Closed);
        assert!(calls.borrow()[0].contains(&ISSUE_FIELDS.to_string()));
        assert!(ISSUE_FIELDS.split(',').any(|f| f == "state"));
    }

    #[test]
    fn test_create_issue_not_retried() {
        let (client, calls) = MockGhClient::new(vec![
            Err(Error::ExternalApi("timeout".to_string())),
            Ok("https://github.com/acme/web/issues/9\n".to_string()),
        ]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        assert!(
            tracker
                .create_issue("acme/web", "t", "b", &["routed"])
                .is_err()
        );
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_create_issue_returns_trimmed_url() {
        let (client, calls) =
            MockGhClient::new(vec![Ok("https://github.com/acme/web/issues/9\n".to_string())]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        let url = tracker
            .create_issue("acme/web", "Title", "Body", &["routed"])
            .unwrap();
        assert_eq!(url, "https://github.com/acme/web/issues/9");
        let args = &calls.borrow()[0];
        assert_eq!(&args[..4], &["issue", "create", "--repo", "acme/web"]);
        assert!(args.contains(&"routed".to_string()));
    }

    #[test]
    fn test_edit_labels_joins_lists() {
        let (client, calls) = MockGhClient::new(vec![Ok(String::new())]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        tracker
            .edit_labels("acme/inbox", 3, &["routed", "auto-routed"], &["needs-routing"])
            .unwrap();
        let args = &calls.borrow()[0];
        assert!(args.contains(&"routed,auto-routed".to_string()));
        assert!(args.contains(&"needs-routing".to_string()));
    }

    #[test]
    fn test_edit_labels_noop_when_empty() {
        let (client, calls) = MockGhClient::new(vec![]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        tracker.edit_labels("acme/inbox", 3, &[], &[]).unwrap();
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_comment_and_close() {
        let (client, calls) = MockGhClient::new(vec![Ok(String::new()), Ok(String::new())]);
        let tracker = GitHubTracker::with_client(Box::new(client));
        tracker.comment("acme/inbox", 5, "moved").unwrap();
        tracker.close("acme/inbox", 5).unwrap();
        let calls = calls.borrow();
        assert_eq!(calls[0][1], "comment");
        assert_eq!(calls[1][..3], ["issue", "close", "5"]);
    }

    #[test]
    fn test_retry_succeeds_after_transient_failure() {
        let attempts = RefCell::new(0);
        let result = retry_with_backoff_ms(
            || {
                let mut a = attempts.borrow_mut();
                *a += 1;
                if *a < 3 {
                    Err(Error::ExternalApi("transient".to_string()))
                } else {
                    Ok("success".to_string())
                }
            },
            1,
            3,
        );
        assert_eq!(result.unwrap(), "success");
        assert_eq!(*attempts.borrow(), 3);
    }

    #[test]
    fn test_retry_fails_after_max_attempts() {
        let result: Result<String> =
            retry_with_backoff_ms(|| Err(Error::ExternalApi("permanent".to_string())), 1, 3);
        assert!(result.is_err());
    }
}
