//! Composite document queries built from GraphQL aliases.
//!
//! A [`BatchQuery`] reads the detail document of several repositories in one round
//! trip. Each repository is addressed by an alias (`repo0`, `repo1`, ...) whose
//! position in the caller's list is recorded when the entry is added, so the
//! response can be mapped back without inspecting its shape.

use super::queries::{DocumentRepository, Query, RATE_LIMIT_FIELDS, document_selection};
use super::rate_limit::{RateLimit, RateLimited};
use super::transport::Request;
use crate::model::RepoPath;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    alias: String,
    index: usize,
    path: RepoPath,
}

/// Builder for a composite document query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery {
    expression: String,
    entries: Vec<Entry>,
}

impl BatchQuery {
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            entries: Vec::new(),
        }
    }

    /// Add a repository that sits at `index` in the caller's list. Returns its alias.
    pub fn push(&mut self, index: usize, path: RepoPath) -> &str {
        let alias = format!("repo{}", self.entries.len());
        self.entries.push(Entry { alias, index, path });
        self.entries.last().map_or("", |entry| entry.alias.as_str())
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The alias-to-index table.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|entry| (entry.alias.as_str(), entry.index))
    }

    /// Map every aliased sub-result back to the index it was added with.
    ///
    /// An alias that resolved to `null` or is absent from the response yields `None`.
    #[must_use]
    pub fn distribute(&self, mut response: BatchResponse) -> Vec<(usize, Option<DocumentRepository>)> {
        self.entries
            .iter()
            .map(|entry| (entry.index, response.repositories.remove(&entry.alias).flatten()))
            .collect()
    }

    /// The repository path registered under `index`, if any.
    #[must_use]
    pub fn path_of(&self, index: usize) -> Option<&RepoPath> {
        self.entries.iter().find(|entry| entry.index == index).map(|entry| &entry.path)
    }
}

/// Response of a [`BatchQuery`]: the rate limit plus one member per alias.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub rate_limit: Option<RateLimit>,
    #[serde(flatten)]
    pub repositories: HashMap<String, Option<DocumentRepository>>,
}

impl RateLimited for BatchResponse {
    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }
}

impl Query for BatchQuery {
    type Response = BatchResponse;

    const ACCEPTS_PARTIAL_DATA: bool = true;

    fn request(&self) -> Request {
        let mut declarations = vec!["$expression: String!".to_string()];
        let mut selections = Vec::with_capacity(self.entries.len());
        let mut variables = Map::new();
        let _ = variables.insert("expression".to_string(), json!(self.expression));

        for (i, entry) in self.entries.iter().enumerate() {
            let owner_var = format!("owner{i}");
            let name_var = format!("name{i}");

            declarations.push(format!("${owner_var}: String!, ${name_var}: String!"));
            selections.push(format!(
                "{}: repository(owner: ${owner_var}, name: ${name_var}) {{ {} }}",
                entry.alias,
                document_selection("expression")
            ));

            let _ = variables.insert(owner_var, json!(entry.path.owner()));
            let _ = variables.insert(name_var, json!(entry.path.name()));
        }

        Request {
            query: format!(
                "query DocumentBatch({}) {{ {RATE_LIMIT_FIELDS} {} }}",
                declarations.join(", "),
                selections.join(" ")
            ),
            variables: Value::Object(variables),
        }
    }

    fn describe(&self) -> String {
        format!("documents of {} repositories", self.entries.len())
    }
}
