//! The `find` command: search, extract, and write the results.

use super::{Host, ProgressReporter};
use crate::Result;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::finder::{Finder, Outcome};
use crate::github::{Executor, HttpTransport};
use crate::progress::{Progress, RequestTracker};
use crate::reports::{generate_json, generate_pairs, write_directory};
use crate::search::DateRange;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use core::time::Duration;
use ohno::{IntoAppError, app_err, bail};
use owo_colors::OwoColorize;
use std::fs;
use std::io::Write;
use std::sync::Arc;

/// Color mode configuration for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always use colors
    Always,

    /// Never use colors
    Never,

    /// Use colors if the output is a terminal, otherwise don't use colors
    Auto,
}

impl ColorMode {
    fn enabled_for_stderr(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                use std::io::{IsTerminal, stderr};
                stderr().is_terminal()
            }
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Repository fields the search text is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchScope {
    /// Repository name
    Name,

    /// Short description
    Description,

    /// README contents
    Readme,

    /// Topic labels
    Topics,
}

impl SearchScope {
    const fn qualifier(self) -> &'static str {
        match self {
            Self::Name => "in:name",
            Self::Description => "in:description",
            Self::Readme => "in:readme",
            Self::Topics => "in:topics",
        }
    }
}

#[derive(Args, Debug)]
pub struct FindArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// File holding the GitHub personal access token, used instead of --token
    #[arg(long, value_name = "PATH")]
    pub token_file: Option<Utf8PathBuf>,

    /// Search text, in GitHub repository search syntax
    #[arg(long, short = 'q', value_name = "TEXT", required_unless_present = "query_file", conflicts_with = "query_file")]
    pub query: Option<String>,

    /// File holding the search text
    #[arg(long, value_name = "PATH")]
    pub query_file: Option<Utf8PathBuf>,

    /// Repository fields the search text must match. Give the flag without values to add no qualifier.
    #[arg(long, value_name = "FIELDS", value_delimiter = ',', num_args = 0.., default_value = "name,description,readme")]
    pub scope: Vec<SearchScope>,

    /// Directory receiving results.txt and one file per identifier
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Utf8PathBuf,

    /// Write a JSON report of the matching repositories to this file
    #[arg(long, value_name = "PATH", help_heading = "Report Output")]
    pub json: Option<Utf8PathBuf>,

    /// Don't echo the results to standard output
    #[arg(long, help_heading = "Report Output")]
    pub silent: bool,

    /// Earliest repository creation time searched (RFC 3339)
    #[arg(long, value_name = "TIME")]
    pub since: Option<DateTime<Utc>>,

    /// Latest repository creation time searched (RFC 3339, default is now)
    #[arg(long, value_name = "TIME")]
    pub until: Option<DateTime<Utc>>,

    /// Path to configuration file (default is `cve-finder.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none")]
    pub log_level: LogLevel,
}

pub async fn process_find<H: Host>(host: &mut H, args: &FindArgs) -> Result<()> {
    init_logging(args.log_level);

    let token = read_token(args)?;
    let query = scoped_query(&read_query(args)?, &args.scope);

    let base_dir = std::env::current_dir().into_app_err("determining the current directory")?;
    let base_dir = Utf8PathBuf::try_from(base_dir).into_app_err("current directory is not valid UTF-8")?;
    let config = Config::load(&base_dir, args.config.as_deref())?;

    let range = search_range(&config, args.since, args.until)?;

    let delay = if args.log_level == LogLevel::None {
        Duration::from_millis(300)
    } else {
        Duration::from_hours(365 * 24)
    };
    let progress: Arc<dyn Progress> = Arc::new(ProgressReporter::new(delay, args.color.enabled_for_stderr()));
    progress.set_phase("Searching");
    let tracker = RequestTracker::new(&progress);

    let cancel = CancelToken::new();
    let shutdown = tokio::spawn(cancel_on_signal(cancel.clone(), Arc::clone(&progress)));

    let transport = HttpTransport::new(&token, config.endpoint.clone(), config.request_timeout)?;
    let executor = Executor::new(transport, config.executor_settings(), cancel).with_tracker(tracker.clone());
    let finder = Finder::new(executor, config.search_settings(), config.detail_settings()).with_tracker(tracker);

    log::info!(target: LOG_TARGET, "Searching '{query}' in repositories created {range}");
    let outcome = finder.run(&query, range).await;

    shutdown.abort();
    progress.done();

    flush(host, args, &outcome)?;
    summarize(host, args, &outcome);

    if let Some(e) = &outcome.error {
        let _ = writeln!(host.error(), "{e:#}");
        host.exit(1);
    }

    Ok(())
}

const LOG_TARGET: &str = "  commands";

/// Initialize logger based on log level
fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .init();
}

fn read_token(args: &FindArgs) -> Result<String> {
    let token = if let Some(path) = &args.token_file {
        read_trimmed(path, "token")?
    } else if let Some(token) = &args.token {
        token.trim().to_string()
    } else {
        bail!("a GitHub token is required, pass --token, --token-file, or set GITHUB_TOKEN");
    };

    if token.is_empty() {
        bail!("the GitHub token is empty");
    }

    Ok(token)
}

fn read_query(args: &FindArgs) -> Result<String> {
    let query = match (&args.query, &args.query_file) {
        (Some(query), _) => query.trim().to_string(),
        (None, Some(path)) => read_trimmed(path, "query")?,
        (None, None) => bail!("a search query is required, pass --query or --query-file"),
    };

    if query.is_empty() {
        bail!("the search query is empty");
    }

    Ok(query)
}

fn read_trimmed(path: &Utf8Path, what: &str) -> Result<String> {
    let text = fs::read_to_string(path).into_app_err_with(|| format!("reading {what} file '{path}'"))?;
    Ok(text.trim().to_string())
}

/// Append one `in:` qualifier per scope to `query`.
fn scoped_query(query: &str, scope: &[SearchScope]) -> String {
    let mut scoped = query.to_string();
    for qualifier in scope.iter().map(|s| s.qualifier()) {
        scoped.push(' ');
        scoped.push_str(qualifier);
    }
    scoped
}

fn search_range(config: &Config, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Result<DateRange> {
    let start = since.unwrap_or(config.search_start);
    let end = until.unwrap_or_else(Utc::now);

    DateRange::new(start, end).ok_or_else(|| app_err!("the search range start ({start}) is after its end ({end})"))
}

/// Cancel `cancel` on Ctrl-C, or SIGTERM on Unix.
async fn cancel_on_signal(cancel: CancelToken, progress: Arc<dyn Progress>) {
    wait_for_signal().await;
    progress.println("Interrupted, writing the results collected so far");
    log::warn!(target: LOG_TARGET, "Interrupted, finishing the request in flight");
    cancel.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Write every output the run asked for, whether or not the run completed.
fn flush<H: Host>(host: &mut H, args: &FindArgs, outcome: &Outcome) -> Result<()> {
    write_directory(&args.output, &outcome.index)?;

    if let Some(filename) = &args.json {
        let mut json_output = String::new();
        generate_json(&outcome.reports, &mut json_output)?;
        fs::write(filename, json_output).into_app_err_with(|| format!("writing JSON report '{filename}'"))?;
    }

    if !args.silent {
        let mut pairs = String::new();
        generate_pairs(&outcome.index, &mut pairs)?;
        let _ = write!(host.output(), "{pairs}");
    }

    Ok(())
}

fn summarize<H: Host>(host: &mut H, args: &FindArgs, outcome: &Outcome) {
    let summary = format!(
        "Examined {} repositories, found {} identifiers in {} repositories",
        outcome.examined,
        outcome.index.len(),
        outcome.reports.len()
    );

    let use_colors = args.color.enabled_for_stderr();
    let status = if outcome.cancelled {
        "Interrupted"
    } else if outcome.error.is_some() {
        "Failed"
    } else {
        "Finished"
    };

    let status = match (use_colors, outcome.is_complete()) {
        (false, _) => status.to_string(),
        (true, true) => status.green().bold().to_string(),
        (true, false) => status.yellow().bold().to_string(),
    };

    let _ = writeln!(host.error(), "{status}: {summary}, results written to '{}'", args.output);
}
