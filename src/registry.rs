use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    /// GitHub slug (`owner/name`) that routed issues are created in.
    pub repository: String,
    pub keywords: BTreeSet<String>,
}

/// Immutable mapping from destination id to its vocabulary.
///
/// Destinations iterate in alphabetical order, which the classifier relies on
/// to break score ties deterministically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordRegistry {
    destinations: BTreeMap<String, Destination>,
}

impl KeywordRegistry {
    /// Build a registry from `(id, repository, keywords)` entries.
    ///
    /// Keywords are trimmed, lowercased and deduplicated. A destination whose
    /// keyword set ends up empty is rejected, as are two destinations sharing a
    /// repository (compared case-insensitively).
    pub fn new<I, K>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String, K)>,
        K: IntoIterator<Item = String>,
    {
        let mut destinations = BTreeMap::new();
        let mut owners: HashMap<String, String> = HashMap::new();
        for (id, repository, keywords) in entries {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(Error::ConfigValidation(
                    "destination id must not be empty".to_string(),
                ));
            }

            let mut set = BTreeSet::new();
            for keyword in keywords {
                let keyword = keyword.trim().to_lowercase();
                if keyword.is_empty() {
                    return Err(Error::ConfigValidation(format!(
                        "destination {id} has an empty keyword"
                    )));
                }
                set.insert(keyword);
            }
            if set.is_empty() {
                return Err(Error::ConfigValidation(format!(
                    "destination {id} must have at least one keyword"
                )));
            }

            if let Some(other) = owners.insert(repository.to_lowercase(), id.clone())
                && other != id
            {
                return Err(Error::ConfigValidation(format!(
                    "destinations {other} and {id} share repository {repository}"
                )));
            }

            if destinations
                .insert(
                    id.clone(),
                    Destination {
                        repository,
                        keywords: set,
                    },
                )
                .is_some()
            {
                return Err(Error::ConfigValidation(format!(
                    "duplicate destination: {id}"
                )));
            }
        }
        Ok(Self { destinations })
    }

    pub fn lookup(&self, destination: &str) -> Result<&BTreeSet<String>> {
        self.destinations
            .get(destination)
            .map(|d| &d.keywords)
            .ok_or_else(|| Error::UnknownDestination(destination.to_string()))
    }

    pub fn repository(&self, destination: &str) -> Result<&str> {
        self.destinations
            .get(destination)
            .map(|d| d.repository.as_str())
            .ok_or_else(|| Error::UnknownDestination(destination.to_string()))
    }

    /// Reverse lookup: which destination (if any) owns the given repository.
    pub fn destination_for_repository(&self, repository: &str) -> Option<&str> {
        self.destinations
            .iter()
            .find(|(_, d)| d.repository.eq_ignore_ascii_case(repository))
            .map(|(id, _)| id.as_str())
    }

    pub fn destinations(&self) -> impl Iterator<Item = (&str, &Destination)> {
        self.destinations.iter().map(|(id, d)| (id.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}
