use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::ClickUpConfig;
use crate::error::{Error, Result};

const CLICKUP_API_URL: &str = "https://api.clickup.com/api/v2";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

static TICKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:app\.clickup\.com/t/(?:\d+/)?|\bCU-)([a-z0-9]+)")
        .expect("ticket regex is valid")
});

/// Find a linked ClickUp task id in an issue body.
///
/// Recognized forms: `https://app.clickup.com/t/<id>`,
/// `https://app.clickup.com/t/<team>/<id>` and `CU-<id>`.
pub fn extract_ticket_id(body: &str) -> Result<String> {
    TICKET_RE
        .captures(body)
        .map(|cap| cap[1].to_string())
        .ok_or_else(|| Error::Parse("no linked ticket reference found".to_string()))
}

/// Destination for notes about routed issues.
pub trait TicketNotifier {
    fn post_note(&self, ticket_id: &str, text: &str) -> Result<()>;
}

/// Notifier used when no ticket system is configured.
pub struct NoopNotifier;

impl TicketNotifier for NoopNotifier {
    fn post_note(&self, ticket_id: &str, _text: &str) -> Result<()> {
        debug!(ticket_id, "ticket notes disabled, skipping");
        Ok(())
    }
}

pub enum AnyNotifier {
    Noop(NoopNotifier),
    ClickUp(ClickUpNotifier),
}

impl TicketNotifier for AnyNotifier {
    fn post_note(&self, ticket_id: &str, text: &str) -> Result<()> {
        match self {
            AnyNotifier::Noop(n) => n.post_note(ticket_id, text),
            AnyNotifier::ClickUp(n) => n.post_note(ticket_id, text),
        }
    }
}

fn resolve_token(token_env: &str) -> Result<String> {
    std::env::var(token_env).map_err(|_| {
        Error::ConfigValidation(format!("ClickUp API token not found in ${token_env}"))
    })
}

/// Posts task comments through the ClickUp REST API.
pub struct ClickUpNotifier {
    token: String,
    base_url: String,
}

impl ClickUpNotifier {
    pub fn new(config: &ClickUpConfig) -> Result<Self> {
        Ok(Self {
            token: resolve_token(&config.token_env)?,
            base_url: CLICKUP_API_URL.to_string(),
        })
    }
}

impl TicketNotifier for ClickUpNotifier {
    fn post_note(&self, ticket_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/task/{ticket_id}/comment", self.base_url);
        let body = serde_json::json!({
            "comment_text": text,
            "notify_all": false,
        });

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        for attempt in 1..=MAX_RETRIES {
            // ClickUp personal tokens are sent raw, not as "Bearer <token>"
            match ureq::post(&url)
                .set("Authorization", &self.token)
                .set("Content-Type", "application/json")
                .send_json(&body)
            {
                Ok(_) => {
                    debug!(ticket_id, "posted ticket note");
                    return Ok(());
                }
                Err(ref e) if attempt < MAX_RETRIES && is_retryable(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms,
                        "retrying ClickUp API after transient error"
                    );
                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                }
                Err(e) => {
                    return Err(Error::ExternalApi(format!(
                        "ClickUp comment on {ticket_id} failed: {e}"
                    )));
                }
            }
        }
        unreachable!()
    }
}

/// Only retry rate-limits (429), server errors (5xx), and transport errors.
fn is_retryable(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}
