//! CVE identifier extraction and normalization.

use crate::model::DetailedRepository;
use core::fmt::{Display, Formatter};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static CVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)cve[-–_][0-9]{4}[-–_][0-9]{4,}").expect("CVE pattern is a valid regex"));

/// A canonical vulnerability identifier of the form `CVE-YYYY-NNNN...`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Normalize a raw match: uppercase, with underscores and en-dashes turned into hyphens.
    fn normalize(raw: &str) -> Self {
        Self(raw.to_uppercase().replace(['_', '–'], "-"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every canonical identifier occurring in `text`.
#[must_use]
pub fn extract_identifiers(text: &str) -> BTreeSet<Identifier> {
    let mut found = BTreeSet::new();
    collect(text, &mut found);
    found
}

/// Every canonical identifier in a repository's URL, description, topics, and document.
#[must_use]
pub fn extract_from_repository(repo: &DetailedRepository) -> BTreeSet<Identifier> {
    let mut found = BTreeSet::new();

    collect(&repo.repository.url, &mut found);
    collect(&repo.repository.description, &mut found);
    for topic in &repo.repository.topics {
        collect(topic, &mut found);
    }
    collect(repo.document.text(), &mut found);

    found
}

fn collect(text: &str, found: &mut BTreeSet<Identifier>) {
    found.extend(CVE_PATTERN.find_iter(text).map(|m| Identifier::normalize(m.as_str())));
}
