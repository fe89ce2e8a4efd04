//! Scripted transport and reply builders shared by unit tests.

use super::transport::{GraphQlError, Reply, Request, Transport};
use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use ohno::app_err;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

type Handler = dyn Fn(&Request) -> Result<Reply> + Send + Sync;

struct Inner {
    handler: Box<Handler>,
    log: Mutex<Vec<(Request, Instant)>>,
}

/// A transport whose replies are produced by a closure, recording every request it sees.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScriptedTransport").finish_non_exhaustive()
    }
}

impl ScriptedTransport {
    pub fn from_fn(handler: impl Fn(&Request) -> Result<Reply> + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler: Box::new(handler),
                log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Answer requests with `replies` in order, failing once they run out.
    pub fn sequence(replies: Vec<Result<Reply>>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::from_fn(move |_| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(app_err!("no scripted reply left")))
        })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.inner.log.lock().unwrap().iter().map(|(request, _)| request.clone()).collect()
    }

    pub fn dispatch_times(&self) -> Vec<Instant> {
        self.inner.log.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    /// Requests whose operation is `operation`, e.g. `SearchCount`.
    pub fn requests_for(&self, operation: &str) -> Vec<Request> {
        let prefix = format!("query {operation}(");
        self.requests().into_iter().filter(|r| r.query.starts_with(&prefix)).collect()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Reply> {
        self.inner.log.lock().unwrap().push((request.clone(), Instant::now()));
        (self.inner.handler)(request)
    }
}

pub fn ok_reply(data: Value) -> Result<Reply> {
    Ok(Reply {
        status: 200,
        data: Some(data),
        errors: Vec::new(),
        header_rate_limit: None,
    })
}

pub fn error_reply(status: u16, message: &str) -> Result<Reply> {
    Ok(Reply {
        status,
        data: None,
        errors: vec![GraphQlError::new(message)],
        header_rate_limit: None,
    })
}

pub fn rate_limit_json(remaining: i64, reset_at: DateTime<Utc>) -> Value {
    json!({
        "limit": 5000,
        "remaining": remaining,
        "cost": 1,
        "resetAt": reset_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

pub fn count_data(count: u64, rate_limit: Option<Value>) -> Value {
    json!({
        "rateLimit": rate_limit,
        "search": { "repositoryCount": count },
    })
}

pub fn repo_node(url: &str, description: &str) -> Value {
    json!({
        "url": url,
        "description": description,
        "isEmpty": false,
        "repositoryTopics": { "nodes": [] },
    })
}

pub fn page_data(count: u64, nodes: Vec<Value>, end_cursor: Option<&str>, has_next_page: bool) -> Value {
    json!({
        "rateLimit": null,
        "search": {
            "repositoryCount": count,
            "pageInfo": { "endCursor": end_cursor, "hasNextPage": has_next_page },
            "nodes": nodes,
        },
    })
}

/// The `query` variable of a search request.
pub fn search_text(request: &Request) -> String {
    request.variables["query"].as_str().unwrap_or_default().to_string()
}
