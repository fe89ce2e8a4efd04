//! Repositories and their detail documents.

use crate::Result;
use core::fmt::{Display, Formatter};
use ohno::{IntoAppError, bail};
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// A repository returned by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub url: String,
    pub description: String,
    #[serde(skip)]
    pub is_empty: bool,
    pub topics: Vec<String>,
}

/// The owner and name addressed by a repository URL of the form `https://host/owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoPath {
    owner: Arc<str>,
    name: Arc<str>,
}

impl RepoPath {
    /// Parse a repository URL.
    ///
    /// The path must consist of exactly two non-empty segments; anything longer or
    /// shorter does not address a repository and is rejected.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url.trim()).into_app_err_with(|| format!("parsing repository URL '{url}'"))?;
        let segments: Vec<_> = parsed.path_segments().map(Iterator::collect).unwrap_or_default();

        let [owner, name] = segments.as_slice() else {
            bail!("repository URL '{url}' does not have the form https://host/owner/name");
        };

        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() {
            bail!("repository URL '{url}' has an empty owner or name");
        }

        Ok(Self {
            owner: Arc::from(owner),
            name: Arc::from(name),
        })
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for RepoPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The long-form text associated with a repository, typically its README.
///
/// `Empty` is an explicit outcome (nothing to fetch, fetch failed, or no such file),
/// distinct from a repository whose document has not been fetched yet, which is
/// simply a bare [`Repository`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DetailDocument {
    #[default]
    Empty,
    Text(String),
}

impl DetailDocument {
    /// Wrap fetched text, treating a missing body as empty.
    #[must_use]
    pub fn from_text(text: Option<String>) -> Self {
        text.map_or(Self::Empty, Self::Text)
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Text(text) => text,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A repository with its detail document attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailedRepository {
    pub repository: Repository,
    pub document: DetailDocument,
}
