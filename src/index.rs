//! The identifier to repository mapping produced by a run.

use crate::extract::Identifier;
use crate::model::Repository;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Maps each identifier to the set of repository URLs that mention it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultIndex {
    entries: BTreeMap<Identifier, BTreeSet<String>>,
}

impl ResultIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `url` mentions `identifier`. Returns `false` if the pair was already present.
    pub fn insert(&mut self, identifier: Identifier, url: &str) -> bool {
        self.entries.entry(identifier).or_default().insert(url.to_string())
    }

    /// Record every identifier found in `repository`.
    ///
    /// Empty repositories are never indexed.
    pub fn absorb<'a>(&mut self, repository: &Repository, identifiers: impl IntoIterator<Item = &'a Identifier>) {
        if repository.is_empty {
            return;
        }

        for identifier in identifiers {
            let _ = self.insert(identifier.clone(), &repository.url);
        }
    }

    /// Number of distinct identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of (identifier, URL) pairs.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn urls(&self, identifier: &Identifier) -> Option<&BTreeSet<String>> {
        self.entries.get(identifier)
    }

    /// Identifiers with their URLs, in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &BTreeSet<String>)> {
        self.entries.iter()
    }

    /// Every (identifier, URL) pair, ordered by identifier then URL.
    pub fn pairs(&self) -> impl Iterator<Item = (&Identifier, &str)> {
        self.entries
            .iter()
            .flat_map(|(identifier, urls)| urls.iter().map(move |url| (identifier, url.as_str())))
    }
}

/// A repository together with the identifiers found in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryReport {
    pub url: String,
    pub description: String,
    pub topics: Vec<String>,
    pub cves: Vec<Identifier>,
}

impl RepositoryReport {
    #[must_use]
    pub fn new(repository: &Repository, identifiers: &BTreeSet<Identifier>) -> Self {
        Self {
            url: repository.url.clone(),
            description: repository.description.clone(),
            topics: repository.topics.clone(),
            cves: identifiers.iter().cloned().collect(),
        }
    }
}
