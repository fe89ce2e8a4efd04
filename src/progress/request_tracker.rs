//! Request tracking for monitoring search and document retrieval.

use super::Progress;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use owo_colors::OwoColorize;
use std::sync::Arc;

/// Topics that can be tracked for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrackedTopic {
    /// Repositories returned by search pages, against the total reported by the API
    Search,
    /// Detail documents attached to repositories
    Documents,
}

impl TrackedTopic {
    const fn name(self) -> &'static str {
        match self {
            Self::Search => "repos",
            Self::Documents => "documents",
        }
    }

    const fn all() -> [Self; 2] {
        [Self::Search, Self::Documents]
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Visual status of a tracked topic, controlling its display color in the
/// progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TopicStatus {
    /// Normal active state (default color).
    Active = 0,
    /// Waiting on a rate limit (blinks yellow).
    Blocked = 1,
    /// All work completed (green).
    Done = 2,
}

#[derive(Debug, Default)]
struct RequestCounter {
    issued: AtomicU64,
    completed: AtomicU64,
    status: AtomicU8,
}

/// Tracks outstanding work and updates progress reporting.
#[derive(Clone)]
pub struct RequestTracker {
    counters: Arc<[RequestCounter; 2]>,
    progress: Arc<dyn Progress>,
}

impl core::fmt::Debug for RequestTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RequestTracker")
            .field("counters", &self.counters)
            .field("progress", &"<dyn Progress>")
            .finish()
    }
}

impl RequestTracker {
    /// Create a new request tracker that feeds the given progress reporter.
    #[must_use]
    pub fn new(progress: &Arc<dyn Progress>) -> Self {
        let counters: Arc<[RequestCounter; 2]> = Arc::default();

        let counters_clone = Arc::clone(&counters);
        let use_colors = progress.use_colors();
        progress.set_determinate(Box::new(move || Self::progress_reporter_callback(&counters_clone, use_colors)));

        Self {
            counters,
            progress: Arc::clone(progress),
        }
    }

    /// Print a message line without disrupting the progress indicator.
    pub fn println(&self, msg: &str) {
        self.progress.println(msg);
    }

    pub fn add_requests(&self, topic: TrackedTopic, count: u64) {
        let counter = &self.counters[topic.index()];
        let _ = counter.issued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn complete_requests(&self, topic: TrackedTopic, count: u64) {
        let counter = &self.counters[topic.index()];
        let completed = counter.completed.fetch_add(count, Ordering::Relaxed) + count;
        let issued = counter.issued.load(Ordering::Relaxed);
        if completed >= issued && issued > 0 {
            counter.status.store(TopicStatus::Done as u8, Ordering::Relaxed);
        }
    }

    pub fn set_topic_status(&self, topic: TrackedTopic, status: TopicStatus) {
        self.counters[topic.index()].status.store(status as u8, Ordering::Relaxed);
    }

    /// Flag every unfinished topic as blocked on a rate limit, or restore it to active.
    pub fn set_waiting(&self, waiting: bool) {
        let (from, to) = if waiting {
            (TopicStatus::Active, TopicStatus::Blocked)
        } else {
            (TopicStatus::Blocked, TopicStatus::Active)
        };

        for counter in self.counters.iter() {
            let _ = counter
                .status
                .compare_exchange(from as u8, to as u8, Ordering::Relaxed, Ordering::Relaxed);
        }
    }

    /// Compute current progress state from counters.
    ///
    /// Returns (`total_length`, `current_position`, `message_string`).
    fn progress_reporter_callback(counters: &[RequestCounter; 2], use_colors: bool) -> (u64, u64, String) {
        // Toggle every 500ms for the blink effect on blocked topics
        let blink_on = use_colors && {
            let ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            (ms / 500).is_multiple_of(2)
        };

        let mut total_issued = 0u64;
        let mut total_completed = 0u64;
        let mut parts = Vec::with_capacity(TrackedTopic::all().len());

        for topic in TrackedTopic::all() {
            let counter = &counters[topic.index()];
            let issued = counter.issued.load(Ordering::Relaxed);
            let completed = counter.completed.load(Ordering::Relaxed).min(issued);

            if issued > 0 {
                total_issued += issued;
                total_completed += completed;

                let text = format!("{completed}/{issued} {}", topic.name());
                let status = counter.status.load(Ordering::Relaxed);

                let styled = if use_colors && status == TopicStatus::Done as u8 {
                    format!("{}", text.green())
                } else if status == TopicStatus::Blocked as u8 && blink_on {
                    format!("{}", text.yellow())
                } else {
                    text
                };

                parts.push(styled);
            }
        }

        let message = if parts.is_empty() {
            "Waiting for results".to_string()
        } else {
            parts.join(", ")
        };

        (total_issued, total_completed, message)
    }
}
