use crate::Result;
use crate::index::RepositoryReport;
use core::fmt::Write;
use serde_json::json;

pub fn generate<W: Write>(repositories: &[RepositoryReport], writer: &mut W) -> Result<()> {
    let mut sorted: Vec<_> = repositories.iter().collect();
    sorted.sort_by(|a, b| a.url.cmp(&b.url));

    let output = json!({
        "repositories": sorted
    });

    write!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    Ok(())
}
