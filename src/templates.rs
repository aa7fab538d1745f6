use std::path::Path;

use serde::Serialize;

use crate::classifier::RoutingCandidate;
use crate::error::{Error, Result};

const DEFAULT_ROUTED_ISSUE: &str = include_str!("default_templates/routed-issue.md");
const DEFAULT_ROUTING_COMMENT: &str = include_str!("default_templates/routing-comment.md");
const DEFAULT_TICKET_NOTE: &str = include_str!("default_templates/ticket-note.md");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Body of the issue created in the destination repository.
    RoutedIssue,
    /// Comment left on the original issue.
    RoutingComment,
    /// Note posted to a linked ticket.
    TicketNote,
}

impl TemplateKind {
    fn filename(self) -> &'static str {
        match self {
            TemplateKind::RoutedIssue => "routed-issue.md",
            TemplateKind::RoutingComment => "routing-comment.md",
            TemplateKind::TicketNote => "ticket-note.md",
        }
    }

    fn default_source(self) -> &'static str {
        match self {
            TemplateKind::RoutedIssue => DEFAULT_ROUTED_ISSUE,
            TemplateKind::RoutingComment => DEFAULT_ROUTING_COMMENT,
            TemplateKind::TicketNote => DEFAULT_TICKET_NOTE,
        }
    }
}

/// Values available to every template.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingContext {
    pub source_repository: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub issue_url: String,
    pub issue_body: String,
    pub target: String,
    pub target_repository: String,
    pub score: usize,
    pub matched_keywords: String,
    pub confidence: String,
    pub auto_routed: bool,
    pub new_issue_url: Option<String>,
}

/// Render a confidence in `[0, 1]` as a whole percentage.
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.0}%", confidence * 100.0)
}

impl RoutingContext {
    pub fn fill_candidate(&mut self, candidate: &RoutingCandidate) {
        self.score = candidate.score;
        self.matched_keywords = candidate.matched_keywords.join(", ");
        self.confidence = format_confidence(candidate.confidence);
    }
}

/// Template loader with embedded defaults and per-file overrides.
pub struct TemplateEngine {
    override_dir: Option<String>,
}

impl TemplateEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self { override_dir }
    }

    /// User overrides in `override_dir` take precedence over defaults.
    pub fn load_template(&self, kind: TemplateKind) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(kind.filename());
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Template(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }
        Ok(kind.default_source().to_string())
    }

    pub fn render(&self, kind: TemplateKind, ctx: &RoutingContext) -> Result<String> {
        let source = self.load_template(kind)?;
        render_template(&source, ctx)
    }
}

/// Render `source` against `ctx`. Unknown variables are an error.
pub fn render_template<S: Serialize>(source: &str, ctx: &S) -> Result<String> {
    let engine = upon::Engine::new();
    let template = engine
        .compile(source)
        .map_err(|e| Error::Template(format!("failed to compile template: {e}")))?;
    template
        .render(&engine, ctx)
        .to_string()
        .map_err(|e| Error::Template(format!("failed to render template: {e}")))
}
