//! The fixed set of GraphQL query shapes issued by the finder.
//!
//! Every response type carries the `rateLimit` descriptor and exposes it through
//! [`RateLimited`], so the executor can refresh its budget regardless of shape.

use super::rate_limit::{RateLimit, RateLimited};
use super::transport::Request;
use crate::model::Repository;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

/// Selection set shared by every query to report the primary rate limit.
pub const RATE_LIMIT_FIELDS: &str = "rateLimit { limit remaining cost resetAt }";

/// A query shape the executor knows how to run.
pub trait Query {
    type Response: DeserializeOwned + RateLimited;

    /// Whether `data` accompanied by `errors` is still a usable answer.
    ///
    /// Composite queries set this so that one unresolvable alias does not discard
    /// the others.
    const ACCEPTS_PARTIAL_DATA: bool = false;

    fn request(&self) -> Request;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Count-only search used to decide whether a date range must be split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCountQuery {
    pub search: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCountResponse {
    pub rate_limit: Option<RateLimit>,
    pub search: SearchCount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCount {
    pub repository_count: u64,
}

impl Query for SearchCountQuery {
    type Response = SearchCountResponse;

    fn request(&self) -> Request {
        Request {
            query: format!(
                "query SearchCount($query: String!) {{ {RATE_LIMIT_FIELDS} search(query: $query, type: REPOSITORY, first: 1) {{ repositoryCount }} }}"
            ),
            variables: json!({ "query": self.search }),
        }
    }

    fn describe(&self) -> String {
        format!("count of '{}'", self.search)
    }
}

impl RateLimited for SearchCountResponse {
    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }
}

/// One page of repository search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPageQuery {
    pub search: String,
    pub first: u8,
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPageResponse {
    pub rate_limit: Option<RateLimit>,
    pub search: SearchPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub repository_count: u64,
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<Option<SearchNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// A search hit. Fields are optional because non-repository hits deserialize as `{}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchNode {
    pub url: Option<String>,
    pub description: Option<String>,
    pub is_empty: bool,
    pub repository_topics: Option<TopicConnection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TopicConnection {
    pub nodes: Vec<Option<TopicNode>>,
}

#[derive(Debug, Deserialize)]
pub struct TopicNode {
    pub topic: Topic,
}

#[derive(Debug, Deserialize)]
pub struct Topic {
    pub name: String,
}

impl SearchNode {
    /// Convert to a [`Repository`], or `None` when the hit is not a repository.
    #[must_use]
    pub fn into_repository(self) -> Option<Repository> {
        let url = self.url?;
        let topics = self
            .repository_topics
            .map(|connection| connection.nodes.into_iter().flatten().map(|node| node.topic.name).collect())
            .unwrap_or_default();

        Some(Repository {
            url,
            description: self.description.unwrap_or_default(),
            is_empty: self.is_empty,
            topics,
        })
    }
}

impl Query for SearchPageQuery {
    type Response = SearchPageResponse;

    fn request(&self) -> Request {
        Request {
            query: format!(
                "query SearchPage($query: String!, $first: Int!, $after: String) {{ {RATE_LIMIT_FIELDS} \
                 search(query: $query, type: REPOSITORY, first: $first, after: $after) {{ \
                 repositoryCount pageInfo {{ endCursor hasNextPage }} \
                 nodes {{ ... on Repository {{ url description isEmpty repositoryTopics(first: 100) {{ nodes {{ topic {{ name }} }} }} }} }} }} }}"
            ),
            variables: json!({
                "query": self.search,
                "first": self.first,
                "after": self.after,
            }),
        }
    }

    fn describe(&self) -> String {
        match &self.after {
            Some(cursor) => format!("page after {cursor} of '{}'", self.search),
            None => format!("first page of '{}'", self.search),
        }
    }
}

impl RateLimited for SearchPageResponse {
    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }
}

/// Selection set that reads a blob's text at a revision expression such as `HEAD:README.md`.
pub(crate) fn document_selection(expression_var: &str) -> String {
    format!("object(expression: ${expression_var}) {{ ... on Blob {{ text }} }}")
}

/// The detail document of a single repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    pub owner: String,
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub rate_limit: Option<RateLimit>,
    pub repository: Option<DocumentRepository>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DocumentRepository {
    pub object: Option<Blob>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Blob {
    pub text: Option<String>,
}

impl DocumentRepository {
    /// The blob text, if the object exists and is a text blob.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        self.object.and_then(|blob| blob.text)
    }
}

impl Query for DocumentQuery {
    type Response = DocumentResponse;

    fn request(&self) -> Request {
        Request {
            query: format!(
                "query Document($owner: String!, $name: String!, $expression: String!) {{ {RATE_LIMIT_FIELDS} \
                 repository(owner: $owner, name: $name) {{ {} }} }}",
                document_selection("expression")
            ),
            variables: json!({
                "owner": self.owner,
                "name": self.name,
                "expression": self.expression,
            }),
        }
    }

    fn describe(&self) -> String {
        format!("document of {}/{}", self.owner, self.name)
    }
}

impl RateLimited for DocumentResponse {
    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }
}
