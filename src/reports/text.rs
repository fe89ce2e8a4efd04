use crate::Result;
use crate::index::ResultIndex;
use core::fmt::Write;
use std::collections::BTreeSet;

pub fn generate_pairs<W: Write>(index: &ResultIndex, writer: &mut W) -> Result<()> {
    for (identifier, url) in index.pairs() {
        writeln!(writer, "{identifier} - {url}")?;
    }
    Ok(())
}

pub fn generate_identifier<W: Write>(urls: &BTreeSet<String>, writer: &mut W) -> Result<()> {
    for url in urls {
        writeln!(writer, "{url}")?;
    }
    Ok(())
}
