use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, RoutingCandidate};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::policy::{RoutingAction, RoutingDecision, RoutingPolicy};
use crate::report::{ResultStatus, RoutingReport, RoutingResult};
use crate::templates::{RoutingContext, TemplateEngine, TemplateKind};
use crate::ticket::{TicketNotifier, extract_ticket_id};
use crate::tracker::{
    Issue, IssueState, IssueTracker, LABEL_AUTO_ROUTED, LABEL_MANUAL_REVIEW, LABEL_NEEDS_ROUTING,
    LABEL_ROUTED, ListFilter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Classify only. No issue is touched.
    Scan,
    /// Classify and execute decisions (unless `dry_run`).
    Route,
}

/// Sequential batch runner: list, classify, decide, act, report.
///
/// A failure on one issue is recorded in the report and never aborts the
/// batch. There is no compensation when a destination issue was created but
/// the follow-up on the original failed; such results are `partial`.
pub struct Router<T, N> {
    tracker: T,
    notifier: N,
    classifier: Classifier,
    policy: RoutingPolicy,
    templates: TemplateEngine,
    config: Config,
}

impl<T: IssueTracker, N: TicketNotifier> Router<T, N> {
    pub fn new(tracker: T, notifier: N, config: Config) -> Result<Self> {
        let classifier = Classifier::new(config.registry.clone(), config.match_mode)?;
        let policy = RoutingPolicy::new(config.thresholds);
        let templates = TemplateEngine::new(config.templates_dir.clone());
        Ok(Self {
            tracker,
            notifier,
            classifier,
            policy,
            templates,
            config,
        })
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Classify an issue against the registry and apply the policy, using the
    /// issue's repository as its current location.
    pub fn decide(&self, issue: &Issue) -> RoutingDecision {
        let current = self
            .config
            .registry
            .destination_for_repository(&issue.repository);
        let candidates = self.classifier.classify(&issue.content());
        self.policy.decide(candidates, current)
    }

    /// Run one pass over every configured repository and write the report.
    ///
    /// Returns `Error::Interrupted` (after writing the partial report) when
    /// `shutdown` flips to true mid-batch.
    pub async fn run_once(
        &self,
        mode: RunMode,
        mut shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<RoutingReport> {
        let mut report = RoutingReport::new(Utc::now());
        let execute = mode == RunMode::Route && !self.config.dry_run;
        let delay = Duration::from_millis(self.config.delay_ms);
        let filter = ListFilter {
            label: self.config.label.as_deref(),
            exclude_labels: &self.config.exclude_labels,
            limit: self.config.list_limit,
        };

        if self.config.repositories.is_empty() {
            warn!("no repositories configured, nothing to scan");
        }

        let mut interrupted = false;
        let mut first = true;
        'repos: for repository in &self.config.repositories {
            info!(repository = %repository, "listing open issues");
            let issues = match self.tracker.list_open_issues(repository, &filter) {
                Ok(issues) => issues,
                Err(e) => {
                    warn!(repository = %repository, error = %e, "failed to list issues");
                    report.push(listing_failure(repository, &e));
                    continue;
                }
            };
            report.total_candidates += issues.len();

            for issue in &issues {
                if !first && wait_or_shutdown(delay, &mut shutdown).await {
                    interrupted = true;
                    break 'repos;
                }
                first = false;

                let decision = self.decide(issue);
                info!(
                    repository = %issue.repository,
                    issue = issue.number,
                    action = decision.action.as_str(),
                    target = decision.target.as_deref().unwrap_or("-"),
                    "classified issue"
                );
                let result = if execute {
                    self.execute(issue, &decision)
                } else {
                    base_result(issue, &decision, preview_status(decision.action))
                };
                report.push(result);
            }
        }

        self.write_report(&report)?;
        info!(
            total = report.total_candidates,
            routed = report.successfully_routed,
            flagged = report.count(ResultStatus::Flagged),
            partial = report.count(ResultStatus::Partial),
            failed = report.count(ResultStatus::Failed),
            "routing pass complete"
        );

        if interrupted {
            return Err(Error::Interrupted);
        }
        Ok(report)
    }

    fn write_report(&self, report: &RoutingReport) -> Result<()> {
        let path = Path::new(&self.config.report_path);
        report.write(path)?;
        info!(path = %path.display(), "wrote routing report");
        Ok(())
    }

    fn execute(&self, issue: &Issue, decision: &RoutingDecision) -> RoutingResult {
        let mut result = base_result(issue, decision, ResultStatus::Skipped);
        let (Some(best), Some(target)) = (decision.best(), decision.target.as_deref()) else {
            return result;
        };

        // Another run (or a person) may have handled the issue since it was listed.
        match self.tracker.get_issue(&issue.repository, issue.number) {
            Ok(fresh) if fresh.has_any_label(&self.config.exclude_labels) => {
                info!(issue = issue.number, "issue already handled, skipping");
                return result;
            }
            Ok(fresh) if fresh.state != IssueState::Open => {
                info!(issue = issue.number, "issue no longer open, skipping");
                return result;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(issue = issue.number, error = %e, "failed to re-check issue");
                return fail(result, e);
            }
        }

        let target_repository = match self.config.registry.repository(target) {
            Ok(repo) => repo.to_string(),
            Err(e) => return fail(result, e),
        };
        let mut ctx = RoutingContext {
            source_repository: issue.repository.clone(),
            issue_number: issue.number,
            issue_title: issue.title.clone(),
            issue_url: issue.url.clone(),
            issue_body: issue.body.clone(),
            target: target.to_string(),
            target_repository,
            score: 0,
            matched_keywords: String::new(),
            confidence: String::new(),
            auto_routed: decision.action == RoutingAction::AutoRoute,
            new_issue_url: None,
        };
        ctx.fill_candidate(best);

        match decision.action {
            RoutingAction::AutoRoute => self.auto_route(issue, &mut ctx, result),
            RoutingAction::ManualReview => self.flag_for_review(issue, &ctx, result),
            RoutingAction::NoAction => result,
        }
    }

    fn auto_route(
        &self,
        issue: &Issue,
        ctx: &mut RoutingContext,
        mut result: RoutingResult,
    ) -> RoutingResult {
        let body = match self.templates.render(TemplateKind::RoutedIssue, ctx) {
            Ok(body) => body,
            Err(e) => return fail(result, e),
        };
        let url = match self.tracker.create_issue(
            &ctx.target_repository,
            &issue.title,
            &body,
            &[LABEL_ROUTED],
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!(issue = issue.number, error = %e, "failed to create destination issue");
                return fail(result, e);
            }
        };
        info!(issue = issue.number, url = %url, "created destination issue");
        result.new_issue_url = Some(url.clone());
        ctx.new_issue_url = Some(url);

        let mut errors = Vec::new();
        match self.templates.render(TemplateKind::RoutingComment, ctx) {
            Ok(comment) => {
                if let Err(e) = self.tracker.comment(&issue.repository, issue.number, &comment) {
                    errors.push(format!("comment: {e}"));
                }
            }
            Err(e) => errors.push(format!("comment: {e}")),
        }

        let remove: &[&str] = if issue.has_any_label(&[LABEL_NEEDS_ROUTING.to_string()]) {
            &[LABEL_NEEDS_ROUTING]
        } else {
            &[]
        };
        if let Err(e) = self.tracker.edit_labels(
            &issue.repository,
            issue.number,
            &[LABEL_ROUTED, LABEL_AUTO_ROUTED],
            remove,
        ) {
            errors.push(format!("labels: {e}"));
        }
        if let Err(e) = self.tracker.close(&issue.repository, issue.number) {
            errors.push(format!("close: {e}"));
        }

        self.notify_ticket(issue, ctx);

        if errors.is_empty() {
            result.status = ResultStatus::Routed;
        } else {
            let error = errors.join("; ");
            warn!(issue = issue.number, error = %error, "issue routed with follow-up failures");
            result.status = ResultStatus::Partial;
            result.error = Some(error);
        }
        result
    }

    fn flag_for_review(
        &self,
        issue: &Issue,
        ctx: &RoutingContext,
        mut result: RoutingResult,
    ) -> RoutingResult {
        if let Err(e) =
            self.tracker
                .edit_labels(&issue.repository, issue.number, &[LABEL_MANUAL_REVIEW], &[])
        {
            warn!(issue = issue.number, error = %e, "failed to flag issue");
            return fail(result, e);
        }
        result.status = ResultStatus::Flagged;

        let comment = self
            .templates
            .render(TemplateKind::RoutingComment, ctx)
            .and_then(|c| self.tracker.comment(&issue.repository, issue.number, &c));
        if let Err(e) = comment {
            warn!(issue = issue.number, error = %e, "failed to comment on flagged issue");
            result.error = Some(format!("comment: {e}"));
        }
        result
    }

    /// Post a note to the ticket linked from the issue body, if any.
    /// Failures are logged only.
    fn notify_ticket(&self, issue: &Issue, ctx: &RoutingContext) {
        let ticket_id = match extract_ticket_id(&issue.body) {
            Ok(id) => id,
            Err(e) => {
                debug!(issue = issue.number, error = %e, "skipping ticket note");
                return;
            }
        };
        let sent = self
            .templates
            .render(TemplateKind::TicketNote, ctx)
            .and_then(|note| self.notifier.post_note(&ticket_id, &note));
        match sent {
            Ok(()) => info!(issue = issue.number, ticket_id = %ticket_id, "updated linked ticket"),
            Err(e) => {
                warn!(issue = issue.number, ticket_id = %ticket_id, error = %e, "failed to update linked ticket")
            }
        }
    }
}

fn preview_status(action: RoutingAction) -> ResultStatus {
    match action {
        RoutingAction::NoAction => ResultStatus::Skipped,
        RoutingAction::AutoRoute | RoutingAction::ManualReview => ResultStatus::DryRun,
    }
}

fn base_result(issue: &Issue, decision: &RoutingDecision, status: ResultStatus) -> RoutingResult {
    let best: Option<&RoutingCandidate> = decision.best();
    RoutingResult {
        repository: issue.repository.clone(),
        issue_number: issue.number,
        title: issue.title.clone(),
        url: issue.url.clone(),
        action: decision.action,
        target: decision.target.clone(),
        score: best.map_or(0, |b| b.score),
        confidence: best.map_or(0.0, |b| b.confidence),
        matched_keywords: best.map(|b| b.matched_keywords.clone()).unwrap_or_default(),
        new_issue_url: None,
        status,
        error: None,
    }
}

fn fail(mut result: RoutingResult, error: Error) -> RoutingResult {
    result.status = ResultStatus::Failed;
    result.error = Some(error.to_string());
    result
}

fn listing_failure(repository: &str, error: &Error) -> RoutingResult {
    RoutingResult {
        repository: repository.to_string(),
        issue_number: 0,
        title: String::new(),
        url: String::new(),
        action: RoutingAction::NoAction,
        target: None,
        score: 0,
        confidence: 0.0,
        matched_keywords: Vec::new(),
        new_issue_url: None,
        status: ResultStatus::Failed,
        error: Some(error.to_string()),
    }
}

/// Sleep for `delay`, returning early with `true` if shutdown is requested.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut Option<watch::Receiver<bool>>) -> bool {
    let Some(rx) = shutdown else {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        return false;
    };
    if *rx.borrow() {
        return true;
    }
    if delay.is_zero() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = rx.changed() => {
            if changed.is_ok() {
                *rx.borrow()
            } else {
                // Sender dropped; nobody can signal anymore.
                false
            }
        }
    }
}
