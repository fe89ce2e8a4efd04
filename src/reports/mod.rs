//! Output generation for a finished or interrupted run
//!
//! Three generators are provided, each writing into a [`core::fmt::Write`]:
//! - **Pairs**: one `<IDENTIFIER> - <url>` line per pair, ordered by identifier then URL
//! - **Identifier**: the URLs mentioning a single identifier, one per line
//! - **JSON**: the repositories in which identifiers were found, with their identifiers
//!
//! [`write_directory`] lays the text reports out in an output directory.

mod json;
mod text;

pub use json::generate as generate_json;
pub use text::{generate_identifier, generate_pairs};

use crate::Result;
use crate::index::ResultIndex;
use camino::Utf8Path;
use ohno::IntoAppError;
use std::fs;

/// Name of the file holding every pair
pub const RESULTS_FILE_NAME: &str = "results.txt";

/// Write `results.txt` and one `<IDENTIFIER>.txt` file per identifier into `dir`, creating it if needed.
pub fn write_directory(dir: &Utf8Path, index: &ResultIndex) -> Result<()> {
    fs::create_dir_all(dir).into_app_err_with(|| format!("creating output directory '{dir}'"))?;

    let mut pairs = String::new();
    generate_pairs(index, &mut pairs)?;
    let results_path = dir.join(RESULTS_FILE_NAME);
    fs::write(&results_path, pairs).into_app_err_with(|| format!("writing '{results_path}'"))?;

    for (identifier, urls) in index.iter() {
        let mut content = String::new();
        generate_identifier(urls, &mut content)?;
        let path = dir.join(format!("{identifier}.txt"));
        fs::write(&path, content).into_app_err_with(|| format!("writing '{path}'"))?;
    }

    Ok(())
}
