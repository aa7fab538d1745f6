use serde::{Deserialize, Serialize};

use crate::classifier::RoutingCandidate;
use crate::error::{Error, Result};

pub const DEFAULT_AUTO_THRESHOLD: f64 = 0.75;
pub const DEFAULT_MANUAL_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingAction {
    AutoRoute,
    ManualReview,
    NoAction,
}

impl RoutingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingAction::AutoRoute => "AUTO_ROUTE",
            RoutingAction::ManualReview => "MANUAL_REVIEW",
            RoutingAction::NoAction => "NO_ACTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub candidates: Vec<RoutingCandidate>,
    pub action: RoutingAction,
    /// Best candidate's destination for `AutoRoute` and `ManualReview`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl RoutingDecision {
    pub fn best(&self) -> Option<&RoutingCandidate> {
        self.candidates.first()
    }
}

/// Confidence gates. Both comparisons are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub auto: f64,
    pub manual: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            auto: DEFAULT_AUTO_THRESHOLD,
            manual: DEFAULT_MANUAL_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn new(auto: f64, manual: f64) -> Result<Self> {
        for (name, value) in [("auto_threshold", auto), ("manual_threshold", manual)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::ConfigValidation(format!(
                    "{name} must be between 0 and 1 (got {value})"
                )));
            }
        }
        if manual > auto {
            return Err(Error::ConfigValidation(format!(
                "manual_threshold ({manual}) must not exceed auto_threshold ({auto})"
            )));
        }
        Ok(Self { auto, manual })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingPolicy {
    thresholds: Thresholds,
}

impl RoutingPolicy {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Turn ranked candidates into a decision for an issue currently living in
    /// `current` (`None` when the issue sits outside every destination).
    pub fn decide(
        &self,
        candidates: Vec<RoutingCandidate>,
        current: Option<&str>,
    ) -> RoutingDecision {
        let (action, target) = match candidates.first() {
            None => (RoutingAction::NoAction, None),
            Some(best) if Some(best.destination.as_str()) == current => {
                (RoutingAction::NoAction, None)
            }
            Some(best) if best.confidence >= self.thresholds.auto => {
                (RoutingAction::AutoRoute, Some(best.destination.clone()))
            }
            Some(best) if best.confidence >= self.thresholds.manual => {
                (RoutingAction::ManualReview, Some(best.destination.clone()))
            }
            Some(_) => (RoutingAction::NoAction, None),
        };
        RoutingDecision {
            candidates,
            action,
            target,
        }
    }
}
