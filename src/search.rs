//! Date-range partitioning of repository searches.
//!
//! GitHub returns at most a fixed number of results (1000) for any search, so a query
//! that matches more is narrowed with a `created:` qualifier and the creation-date
//! range is bisected until every piece fits under the cap. Each piece is then
//! paginated with the forward cursor.
//!
//! The walk over the range is pull-based: [`PartitionWalk::next`] yields one completed
//! partition at a time, so callers can process results incrementally and stop early.

use crate::Result;
use crate::github::queries::{SearchCountQuery, SearchNode, SearchPageQuery};
use crate::github::{Executor, Transport};
use crate::model::Repository;
use crate::progress::{RequestTracker, TopicStatus, TrackedTopic};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use core::fmt::{Display, Formatter};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

const LOG_TARGET: &str = "    search";

static CREATED_QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)created:\S*").expect("created qualifier pattern is a valid regex"));

/// A closed creation-date range with one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Create a range, truncating both boundaries to whole seconds.
    ///
    /// Returns `None` when `start` is after `end`.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        let start = DateTime::from_timestamp(start.timestamp(), 0)?;
        let end = DateTime::from_timestamp(end.timestamp(), 0)?;
        (start <= end).then_some(Self { start, end })
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Bisect at the wall-clock midpoint into `[start, mid]` and `[mid + 1s, end]`.
    ///
    /// Returns `None` for a single-second range.
    #[must_use]
    pub fn split(&self) -> Option<(Self, Self)> {
        if self.start == self.end {
            return None;
        }

        let mid = self.start + (self.end - self.start) / 2;
        let mid = DateTime::from_timestamp(mid.timestamp(), 0)?;
        let lower = Self { start: self.start, end: mid };
        let upper = Self {
            start: mid + TimeDelta::seconds(1),
            end: self.end,
        };

        Some((lower, upper))
    }

    /// The `created:<start>..<end>` search qualifier for this range.
    #[must_use]
    pub fn qualifier(&self) -> String {
        format!(
            "created:{}..{}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Append the qualifier for `range` to `query`, replacing any `created:` qualifier already present.
#[must_use]
pub fn with_created_range(query: &str, range: &DateRange) -> String {
    let stripped = CREATED_QUALIFIER.replace_all(query, "");
    let stripped = stripped.trim();

    if stripped.is_empty() {
        range.qualifier()
    } else {
        format!("{stripped} {}", range.qualifier())
    }
}

/// Search tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    /// Results requested per page
    pub page_size: u8,

    /// Largest result count the API will serve for a single query
    pub result_cap: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            result_cap: 1000,
        }
    }
}

/// Repositories collected from one date range.
#[derive(Debug, Clone)]
pub struct Partition {
    pub range: DateRange,

    /// Result count the API reported for the range
    pub count: u64,

    /// Non-empty repositories not yielded by an earlier partition
    pub repositories: Vec<Repository>,
}

/// Retrieves every repository matching a query, working around the result cap.
#[derive(Debug)]
pub struct SearchPartitioner<'a, T> {
    executor: &'a Executor<T>,
    settings: SearchSettings,
    tracker: Option<RequestTracker>,
}

impl<T> Clone for SearchPartitioner<'_, T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor,
            settings: self.settings,
            tracker: self.tracker.clone(),
        }
    }
}

impl<'a, T: Transport> SearchPartitioner<'a, T> {
    #[must_use]
    pub const fn new(executor: &'a Executor<T>, settings: SearchSettings) -> Self {
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

    /// Start a walk over `range` for `query`.
    #[must_use]
    pub fn walk(&self, query: &str, range: DateRange) -> PartitionWalk<'a, T> {
        PartitionWalk {
            partitioner: self.clone(),
            query: query.to_string(),
            pending: vec![range],
            seen: HashSet::new(),
            counted_root: false,
        }
    }

    /// Collect every repository matching `query` within `range`.
    pub async fn search(&self, query: &str, range: DateRange) -> Result<Vec<Repository>> {
        let mut walk = self.walk(query, range);
        let mut repositories = Vec::new();

        while let Some(partition) = walk.next().await? {
            repositories.extend(partition.repositories);
        }

        Ok(repositories)
    }

    async fn count(&self, search: String) -> Result<u64> {
        let response = self.executor.execute(&SearchCountQuery { search }).await?;
        Ok(response.search.repository_count)
    }

    async fn paginate(&self, search: String) -> Result<Vec<Repository>> {
        let mut repositories = Vec::new();
        let mut after = None;

        loop {
            let query = SearchPageQuery {
                search: search.clone(),
                first: self.settings.page_size,
                after: after.take(),
            };

            let page = self.executor.execute(&query).await?.search;
            let raw = page.nodes.len();

            repositories.extend(
                page.nodes
                    .into_iter()
                    .flatten()
                    .filter_map(SearchNode::into_repository)
                    .filter(|repo| !repo.is_empty),
            );

            if let Some(tracker) = &self.tracker {
                tracker.complete_requests(TrackedTopic::Search, raw as u64);
            }

            if !page.page_info.has_next_page {
                break;
            }

            if raw == 0 {
                log::warn!(target: LOG_TARGET, "Empty page with more pages announced for '{search}', stopping pagination");
                break;
            }

            match page.page_info.end_cursor {
                Some(cursor) => after = Some(cursor),
                None => {
                    log::warn!(target: LOG_TARGET, "Page without a cursor for '{search}', stopping pagination");
                    break;
                }
            }
        }

        Ok(repositories)
    }
}

/// An in-progress walk over the partitions of a search.
///
/// Ranges are kept on an explicit stack with the earlier half on top, so partitions
/// are produced in creation-date order.
#[derive(Debug)]
pub struct PartitionWalk<'a, T> {
    partitioner: SearchPartitioner<'a, T>,
    query: String,
    pending: Vec<DateRange>,
    seen: HashSet<String>,
    counted_root: bool,
}

impl<T: Transport> PartitionWalk<'_, T> {
    /// The next partition with at least one match, or `None` once the range is exhausted.
    pub async fn next(&mut self) -> Result<Option<Partition>> {
        let cap = self.partitioner.settings.result_cap;

        while let Some(range) = self.pending.pop() {
            let search = with_created_range(&self.query, &range);
            let count = self.partitioner.count(search.clone()).await?;

            if !self.counted_root {
                self.counted_root = true;
                log::info!(target: LOG_TARGET, "'{}' matches {count} repositories", self.query);
                if let Some(tracker) = &self.partitioner.tracker {
                    tracker.add_requests(TrackedTopic::Search, count);
                }
            }

            if count == 0 {
                log::debug!(target: LOG_TARGET, "No matches in {range}");
                continue;
            }

            if count >= cap {
                if let Some((lower, upper)) = range.split() {
                    log::info!(target: LOG_TARGET, "{range} has {count} matches, splitting");
                    self.pending.push(upper);
                    self.pending.push(lower);
                    continue;
                }

                log::warn!(
                    target: LOG_TARGET,
                    "{range} has {count} matches but cannot be split further, results may be truncated"
                );
            }

            log::info!(target: LOG_TARGET, "Retrieving {count} repositories created in {range}");
            let mut repositories = self.partitioner.paginate(search).await?;
            repositories.retain(|repo| self.seen.insert(repo.url.clone()));

            return Ok(Some(Partition {
                range,
                count,
                repositories,
            }));
        }

        if let Some(tracker) = &self.partitioner.tracker {
            tracker.set_topic_status(TrackedTopic::Search, TopicStatus::Done);
        }

        Ok(None)
    }

    /// Number of distinct repositories yielded so far.
    #[must_use]
    pub fn yielded(&self) -> usize {
        self.seen.len()
    }
}
