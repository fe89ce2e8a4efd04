//! Access to the GitHub GraphQL API.
//!
//! [`transport`] performs single round trips, [`executor`] layers rate-limit handling
//! on top, and [`queries`] and [`batch`] define the request shapes the finder issues.

pub mod batch;
pub mod executor;
pub mod queries;
pub mod rate_limit;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchQuery, BatchResponse};
pub use executor::{Executor, ExecutorSettings};
pub use queries::{DocumentQuery, Query, SearchCountQuery, SearchPageQuery};
pub use rate_limit::{RateLimit, RateLimitState, RateLimited};
pub use transport::{GraphQlError, HttpTransport, Reply, Request, Transport};
