//! Command dispatch logic for cve-finder

use super::{FindArgs, InitArgs, init_config, process_find};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "cve-finder", version, author, long_about = None)]
#[command(about = "Find GitHub repositories that reference CVE identifiers")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search repositories and collect the CVE identifiers they mention
    Find(Box<FindArgs>),
    /// Generate a default configuration file
    Init(InitArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// This function parses the command-line arguments and executes the corresponding
/// subcommand. It's designed to be called from main.rs with the program arguments.
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        Command::Find(find_args) => process_find(host, find_args).await,
        Command::Init(init_args) => init_config(host, init_args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_find_requires_a_query() {
        let result = Cli::try_parse_from(["cve-finder", "find", "--token", "t", "-o", "out"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_query_and_query_file_conflict() {
        let result = Cli::try_parse_from(["cve-finder", "find", "--query", "a", "--query-file", "q.txt", "-o", "out"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_find_parses_scope_list() {
        let cli = Cli::try_parse_from(["cve-finder", "find", "--query", "poc", "--scope", "name,topics", "-o", "out"]).unwrap();
        let Command::Find(args) = cli.command else {
            panic!("expected the find command");
        };
        assert_eq!(args.scope.len(), 2);
    }
}
