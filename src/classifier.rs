use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::KeywordRegistry;

/// How a keyword is matched against issue text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Plain substring containment. `api` matches inside `rapid`.
    #[default]
    Substring,
    /// Keyword must not be flanked by word characters.
    Word,
}

impl MatchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "substring" => Some(MatchMode::Substring),
            "word" => Some(MatchMode::Word),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Substring => "substring",
            MatchMode::Word => "word",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContent {
    pub title: String,
    pub body: String,
}

impl IssueContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Lowercased `title + " " + body`.
    pub fn normalized(&self) -> String {
        format!("{} {}", self.title, self.body).to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingCandidate {
    pub destination: String,
    pub matched_keywords: Vec<String>,
    pub score: usize,
    pub confidence: f64,
}

pub struct Classifier {
    registry: KeywordRegistry,
    mode: MatchMode,
    word_patterns: HashMap<String, Regex>,
}

impl Classifier {
    pub fn new(registry: KeywordRegistry, mode: MatchMode) -> Result<Self> {
        let mut word_patterns = HashMap::new();
        if mode == MatchMode::Word {
            for (_, dest) in registry.destinations() {
                for keyword in &dest.keywords {
                    if word_patterns.contains_key(keyword) {
                        continue;
                    }
                    let pattern = format!(r"(?:^|\W){}(?:$|\W)", regex::escape(keyword));
                    let re = Regex::new(&pattern).map_err(|e| {
                        Error::ConfigValidation(format!("invalid keyword {keyword:?}: {e}"))
                    })?;
                    word_patterns.insert(keyword.clone(), re);
                }
            }
        }
        Ok(Self {
            registry,
            mode,
            word_patterns,
        })
    }

    pub fn registry(&self) -> &KeywordRegistry {
        &self.registry
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Score `content` against every destination.
    ///
    /// Destinations with no matching keyword are omitted. The result is sorted
    /// by score descending; equal scores keep alphabetical destination order.
    pub fn classify(&self, content: &IssueContent) -> Vec<RoutingCandidate> {
        let text = content.normalized();
        let mut candidates: Vec<RoutingCandidate> = self
            .registry
            .destinations()
            .filter_map(|(id, dest)| {
                let matched: Vec<String> = dest
                    .keywords
                    .iter()
                    .filter(|k| self.matches(&text, k))
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                let score = matched.len();
                Some(RoutingCandidate {
                    destination: id.to_string(),
                    matched_keywords: matched,
                    score,
                    confidence: score as f64 / dest.keywords.len() as f64,
                })
            })
            .collect();

        // Stable: ties stay in registry (alphabetical) order.
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
    }

    fn matches(&self, text: &str, keyword: &str) -> bool {
        match self.mode {
            MatchMode::Substring => text.contains(keyword),
            MatchMode::Word => self
                .word_patterns
                .get(keyword)
                .is_some_and(|re| re.is_match(text)),
        }
    }
}
