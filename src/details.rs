//! Batched retrieval of repository detail documents.
//!
//! Repositories are processed in chunks. A full chunk is fetched with one composite
//! query of aliased sub-queries; a trailing partial chunk is fetched one repository
//! at a time. Every repository leaves with a [`DetailDocument`], empty when the URL
//! could not be addressed, the fetch failed, or no document exists.

use crate::Result;
use crate::github::queries::{DocumentQuery, DocumentRepository};
use crate::github::{BatchQuery, Executor, Transport};
use crate::model::{DetailDocument, DetailedRepository, RepoPath, Repository};
use crate::progress::{RequestTracker, TrackedTopic};

const LOG_TARGET: &str = "   details";

/// Largest number of aliases GitHub accepts comfortably in one document query.
pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailSettings {
    /// Repositories per composite query
    pub batch_size: usize,

    /// Revision expression naming the document, e.g. `HEAD:README.md`
    pub expression: String,
}

impl Default for DetailSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            expression: "HEAD:README.md".to_string(),
        }
    }
}

/// Attaches detail documents to repositories.
#[derive(Debug)]
pub struct DetailBatcher<'a, T> {
    executor: &'a Executor<T>,
    settings: DetailSettings,
    tracker: Option<RequestTracker>,
}

impl<T> Clone for DetailBatcher<'_, T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor,
            settings: self.settings.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<'a, T: Transport> DetailBatcher<'a, T> {
    #[must_use]
    pub const fn new(executor: &'a Executor<T>, settings: DetailSettings) -> Self {
        Self {
            executor,
            settings,
            tracker: None,
        }
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: RequestTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Start fetching the documents of `repositories`, one chunk at a time.
    #[must_use]
    pub fn walk(&self, repositories: Vec<Repository>) -> DetailWalk<'a, T> {
        if let Some(tracker) = &self.tracker {
            tracker.add_requests(TrackedTopic::Documents, repositories.len() as u64);
        }

        DetailWalk {
            batcher: self.clone(),
            batch_size: self.settings.batch_size.clamp(1, MAX_BATCH_SIZE),
            pending: repositories.into_iter(),
        }
    }

    async fn fetch_batch(&self, chunk: &[Repository]) -> Result<Vec<DetailDocument>> {
        let mut documents = vec![DetailDocument::Empty; chunk.len()];
        let mut batch = BatchQuery::new(self.settings.expression.clone());

        for (offset, repo) in chunk.iter().enumerate() {
            match RepoPath::parse(&repo.url) {
                Ok(path) => {
                    let _ = batch.push(offset, path);
                }
                Err(e) => log::warn!(target: LOG_TARGET, "Skipping document of {}: {e}", repo.url),
            }
        }

        if batch.is_empty() {
            return Ok(documents);
        }

        let response = self.executor.execute(&batch).await?;
        for (offset, repository) in batch.distribute(response) {
            let document = match repository {
                Some(repository) => to_document(repository),
                None => {
                    if let Some(path) = batch.path_of(offset) {
                        log::warn!(target: LOG_TARGET, "Could not resolve repository {path}, using an empty document");
                    }
                    DetailDocument::Empty
                }
            };

            if let Some(slot) = documents.get_mut(offset) {
                *slot = document;
            }
        }

        Ok(documents)
    }

    async fn fetch_single(&self, repo: &Repository) -> Result<DetailDocument> {
        let path = match RepoPath::parse(&repo.url) {
            Ok(path) => path,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Skipping document of {}: {e}", repo.url);
                return Ok(DetailDocument::Empty);
            }
        };

        let query = DocumentQuery {
            owner: path.owner().to_string(),
            name: path.name().to_string(),
            expression: self.settings.expression.clone(),
        };

        match self.executor.execute(&query).await {
            Ok(response) => Ok(response.repository.map_or(DetailDocument::Empty, to_document)),
            Err(e) if self.executor.cancel_token().is_cancelled() => Err(e),
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not fetch the document of {path}: {e}");
                Ok(DetailDocument::Empty)
            }
        }
    }
}

/// An in-progress document fetch over a list of repositories.
///
/// While at least a full batch remains, each step fetches one composite query. The
/// trailing repositories are then fetched and yielded one at a time, so a failure or
/// cancellation never discards documents already retrieved.
#[derive(Debug)]
pub struct DetailWalk<'a, T> {
    batcher: DetailBatcher<'a, T>,
    batch_size: usize,
    pending: std::vec::IntoIter<Repository>,
}

impl<T: Transport> DetailWalk<'_, T> {
    /// The next chunk of repositories with their documents attached, in input order.
    ///
    /// # Errors
    ///
    /// Individual document failures are logged and produce an empty document. A failed
    /// composite query, or cancellation, is returned.
    pub async fn next(&mut self) -> Result<Option<Vec<DetailedRepository>>> {
        let batched = self.batch_size > 1 && self.pending.len() >= self.batch_size;
        let take = if batched { self.batch_size } else { 1 };

        let chunk: Vec<_> = self.pending.by_ref().take(take).collect();
        if chunk.is_empty() {
            return Ok(None);
        }

        let documents = if batched {
            self.batcher.fetch_batch(&chunk).await?
        } else {
            let mut documents = Vec::with_capacity(chunk.len());
            for repo in &chunk {
                documents.push(self.batcher.fetch_single(repo).await?);
            }
            documents
        };

        if let Some(tracker) = &self.batcher.tracker {
            tracker.complete_requests(TrackedTopic::Documents, chunk.len() as u64);
        }

        Ok(Some(
            chunk
                .into_iter()
                .zip(documents)
                .map(|(repository, document)| DetailedRepository { repository, document })
                .collect(),
        ))
    }
}

fn to_document(repository: DocumentRepository) -> DetailDocument {
    DetailDocument::from_text(repository.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::github::ExecutorSettings;
    use crate::github::testing::{ScriptedTransport, error_reply, ok_reply};
    use crate::github::transport::{GraphQlError, Reply, Request};
    use serde_json::{Map, Value, json};

    fn repo(url: &str) -> Repository {
        Repository {
            url: url.to_string(),
            description: String::new(),
            is_empty: false,
            topics: Vec::new(),
        }
    }

    fn repos(count: usize) -> Vec<Repository> {
        (0..count).map(|i| repo(&format!("https://github.com/owner/repo{i}"))).collect()
    }

    fn readme(owner: &Value, name: &Value) -> Value {
        json!({ "object": { "text": format!("readme of {}/{}", owner.as_str().unwrap(), name.as_str().unwrap()) } })
    }

    /// Answers batch and single document queries with a readme naming the repository.
    fn answer(request: &Request) -> Value {
        let vars = &request.variables;
        if request.query.starts_with("query DocumentBatch(") {
            let mut data = Map::new();
            let mut i = 0;
            while let Some(owner) = vars.get(format!("owner{i}")) {
                let _ = data.insert(format!("repo{i}"), readme(owner, &vars[format!("name{i}")]));
                i += 1;
            }
            Value::Object(data)
        } else {
            json!({ "repository": readme(&vars["owner"], &vars["name"]) })
        }
    }

    fn executor(transport: ScriptedTransport) -> Executor<ScriptedTransport> {
        Executor::new(transport, ExecutorSettings::default(), CancelToken::new())
    }

    async fn attach(batcher: &DetailBatcher<'_, ScriptedTransport>, repositories: Vec<Repository>) -> Result<Vec<DetailedRepository>> {
        let mut walk = batcher.walk(repositories);
        let mut detailed = Vec::new();
        while let Some(chunk) = walk.next().await? {
            detailed.extend(chunk);
        }
        Ok(detailed)
    }

    #[tokio::test]
    async fn test_full_chunks_batched_and_remainder_fetched_individually() {
        let transport = ScriptedTransport::from_fn(|request| ok_reply(answer(request)));
        let executor = executor(transport.clone());
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let detailed = attach(&batcher, repos(23)).await.unwrap();

        assert_eq!(detailed.len(), 23);
        assert_eq!(transport.requests_for("DocumentBatch").len(), 2);
        assert_eq!(transport.requests_for("Document").len(), 3);

        for (i, repo) in detailed.iter().enumerate() {
            assert_eq!(repo.repository.url, format!("https://github.com/owner/repo{i}"));
            assert_eq!(repo.document.text(), format!("readme of owner/repo{i}"));
        }
    }

    #[tokio::test]
    async fn test_exact_multiple_uses_only_batches() {
        let transport = ScriptedTransport::from_fn(|request| ok_reply(answer(request)));
        let executor = executor(transport.clone());
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let detailed = attach(&batcher, repos(20)).await.unwrap();
        assert_eq!(detailed.len(), 20);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_url_in_batch_is_skipped() {
        let transport = ScriptedTransport::from_fn(|request| ok_reply(answer(request)));
        let executor = executor(transport.clone());
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let mut input = repos(10);
        input[4] = repo("https://github.com/owner/repo4/tree/main");

        let detailed = attach(&batcher, input).await.unwrap();
        assert_eq!(detailed.len(), 10);
        assert!(detailed[4].document.is_empty());
        assert_eq!(detailed[5].document.text(), "readme of owner/repo5");

        let batch = &transport.requests_for("DocumentBatch")[0];
        assert!(batch.variables.get("owner9").is_none());
        assert_eq!(batch.variables["name4"], "repo5");
    }

    #[tokio::test]
    async fn test_invalid_url_in_remainder_is_skipped() {
        let transport = ScriptedTransport::from_fn(|request| ok_reply(answer(request)));
        let executor = executor(transport.clone());
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let detailed = attach(&batcher, vec![repo("not a url"), repo("https://github.com/a/b")]).await.unwrap();
        assert!(detailed[0].document.is_empty());
        assert_eq!(detailed[1].document.text(), "readme of a/b");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_null_alias_and_missing_document_become_empty() {
        let transport = ScriptedTransport::from_fn(|request| {
            let mut data = answer(request);
            data["repo2"] = Value::Null;
            data["repo3"] = json!({ "object": null });
            Ok(Reply {
                status: 200,
                data: Some(data),
                errors: vec![GraphQlError {
                    message: "Could not resolve to a Repository with the name 'owner/repo2'.".into(),
                    kind: Some("NOT_FOUND".into()),
                }],
                header_rate_limit: None,
            })
        });
        let executor = executor(transport);
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let detailed = attach(&batcher, repos(10)).await.unwrap();
        assert!(detailed[2].document.is_empty());
        assert!(detailed[3].document.is_empty());
        assert_eq!(detailed[4].document.text(), "readme of owner/repo4");
    }

    #[tokio::test]
    async fn test_single_failure_yields_empty_document() {
        let transport = ScriptedTransport::from_fn(|request| {
            if request.variables["name"] == "repo1" {
                return error_reply(502, "Bad gateway");
            }
            ok_reply(answer(request))
        });
        let executor = executor(transport);
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let detailed = attach(&batcher, repos(3)).await.unwrap();
        assert_eq!(detailed[0].document.text(), "readme of owner/repo0");
        assert!(detailed[1].document.is_empty());
        assert_eq!(detailed[2].document.text(), "readme of owner/repo2");
    }

    #[tokio::test]
    async fn test_batch_failure_is_returned() {
        let transport = ScriptedTransport::from_fn(|_| error_reply(401, "Bad credentials"));
        let executor = executor(transport);
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let err = attach(&batcher, repos(10)).await.unwrap_err();
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn test_smaller_batch_size() {
        let transport = ScriptedTransport::from_fn(|request| ok_reply(answer(request)));
        let executor = executor(transport.clone());
        let settings = DetailSettings {
            batch_size: 4,
            expression: "HEAD:SECURITY.md".into(),
        };
        let batcher = DetailBatcher::new(&executor, settings);

        let detailed = attach(&batcher, repos(9)).await.unwrap();
        assert!(detailed.iter().all(|r| !r.document.is_empty()));
        assert_eq!(transport.requests_for("DocumentBatch").len(), 2);
        assert_eq!(transport.requests_for("Document").len(), 1);
        assert_eq!(transport.requests()[0].variables["expression"], "HEAD:SECURITY.md");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let transport = ScriptedTransport::from_fn(|request| ok_reply(answer(request)));
        let executor = executor(transport.clone());
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        assert!(attach(&batcher, Vec::new()).await.unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_walk_yields_batches_then_single_repositories() {
        let transport = ScriptedTransport::from_fn(|request| ok_reply(answer(request)));
        let executor = executor(transport);
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let mut walk = batcher.walk(repos(23));
        let mut sizes = Vec::new();
        while let Some(chunk) = walk.next().await.unwrap() {
            sizes.push(chunk.len());
        }

        assert_eq!(sizes, vec![10, 10, 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_walk_keeps_earlier_chunks_when_a_later_batch_fails() {
        let transport = ScriptedTransport::sequence(vec![ok_reply(json!({})), error_reply(502, "Bad gateway")]);
        let executor = executor(transport);
        let batcher = DetailBatcher::new(&executor, DetailSettings::default());

        let mut walk = batcher.walk(repos(20));
        let first = walk.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 10);
        assert!(first.iter().all(|r| r.document.is_empty()));

        let err = walk.next().await.unwrap_err();
        assert!(err.to_string().contains("Bad gateway"));
    }
}
