//! Orchestration of a complete run.
//!
//! The finder walks the search partitions one at a time. Each partition is enriched with
//! detail documents chunk by chunk, and every chunk is scanned for identifiers and
//! absorbed into the [`ResultIndex`] as soon as it arrives, so an interrupted run still
//! holds everything completed up to that point.

use crate::Result;
use crate::cancel::CancelToken;
use crate::details::{DetailBatcher, DetailSettings};
use crate::extract::extract_from_repository;
use crate::github::{Executor, Transport};
use crate::index::{RepositoryReport, ResultIndex};
use crate::progress::RequestTracker;
use crate::search::{DateRange, SearchPartitioner, SearchSettings};

const LOG_TARGET: &str = "    finder";

/// What a run produced, complete or not.
#[derive(Debug, Default)]
pub struct Outcome {
    pub index: ResultIndex,

    /// One entry per repository in which at least one identifier was found
    pub reports: Vec<RepositoryReport>,

    /// Number of repositories examined
    pub examined: usize,

    /// The failure that ended the run early, if any
    pub error: Option<ohno::AppError>,

    /// Whether the run was stopped by cancellation
    pub cancelled: bool,
}

impl Outcome {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }
}

/// Drives search, document retrieval, and extraction.
#[derive(Debug)]
pub struct Finder<T> {
    executor: Executor<T>,
    search: SearchSettings,
    details: DetailSettings,
    tracker: Option<RequestTracker>,
}

impl<T: Transport> Finder<T> {
    #[must_use]
    pub const fn new(executor: Executor<T>, search: SearchSettings, details: DetailSettings) -> Self {
        Self {
            executor,
            search,
            details,
            tracker: None,
        }
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: RequestTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        self.executor.cancel_token()
    }

    /// Find every identifier mentioned by repositories matching `query` within `range`.
    ///
    /// Never fails outright: errors and cancellation are recorded in the returned
    /// [`Outcome`] next to whatever was collected before they occurred.
    pub async fn run(&self, query: &str, range: DateRange) -> Outcome {
        let mut outcome = Outcome::default();

        match self.collect(query, range, &mut outcome).await {
            Ok(()) => log::info!(
                target: LOG_TARGET,
                "Examined {} repositories, found {} identifiers",
                outcome.examined,
                outcome.index.len()
            ),
            Err(e) if self.cancel_token().is_cancelled() => {
                log::info!(target: LOG_TARGET, "Run cancelled after examining {} repositories: {e}", outcome.examined);
                outcome.cancelled = true;
            }
            Err(e) => {
                log::error!(target: LOG_TARGET, "Run failed after examining {} repositories: {e}", outcome.examined);
                outcome.error = Some(e);
            }
        }

        if let Some(rate_limit) = self.executor.rate_limit().await {
            log::info!(
                target: LOG_TARGET,
                "{}/{} requests left in the rate limit budget, resets at {}",
                rate_limit.remaining,
                rate_limit.limit,
                rate_limit.reset_at
            );
        }

        outcome
    }

    async fn collect(&self, query: &str, range: DateRange, outcome: &mut Outcome) -> Result<()> {
        let mut partitioner = SearchPartitioner::new(&self.executor, self.search);
        let mut batcher = DetailBatcher::new(&self.executor, self.details.clone());
        if let Some(tracker) = &self.tracker {
            partitioner = partitioner.with_tracker(tracker.clone());
            batcher = batcher.with_tracker(tracker.clone());
        }

        let mut walk = partitioner.walk(query, range);
        while let Some(partition) = walk.next().await? {
            log::debug!(
                target: LOG_TARGET,
                "Partition {} yielded {} new repositories",
                partition.range,
                partition.repositories.len()
            );

            let mut documents = batcher.walk(partition.repositories);
            while let Some(chunk) = documents.next().await? {
                for repo in chunk {
                    outcome.examined += 1;

                    let identifiers = extract_from_repository(&repo);
                    if identifiers.is_empty() {
                        continue;
                    }

                    outcome.index.absorb(&repo.repository, &identifiers);
                    outcome.reports.push(RepositoryReport::new(&repo.repository, &identifiers));
                }
            }
        }

        log::info!(target: LOG_TARGET, "Search yielded {} distinct repositories", walk.yielded());
        Ok(())
    }
}
