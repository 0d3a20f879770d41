//! Command-line parsing.
//!
//! Anything other than exactly one page URL yields usage text instead of an
//! error, so a bare `api-trace` invocation prints instructions and exits
//! cleanly.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

const EXAMPLE_URL: &str = "https://www.notion.so/Test-text-4c6a54c68b3e4ea2af9cfaabcc88d58d";

#[derive(Parser, Debug)]
#[command(
    name = "api-trace",
    about = "Load a page in headless Chromium and record its API traffic",
    version,
    after_help = "Set NOTION_TOKEN to the token_v2 cookie of www.notion.so to trace private pages."
)]
struct Cli {
    /// Page URL to load.
    #[arg(value_name = "PAGE_URL")]
    urls: Vec<String>,

    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the trace (default: notion_api_trace.txt).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Wait this long after the network goes idle.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Only print console summaries for API traffic.
    #[arg(long)]
    only_api: bool,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Options for a tracing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceArgs {
    pub url: String,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub settle_ms: Option<u64>,
    pub only_api: bool,
    pub log_level: String,
}

/// What the process should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Trace(TraceArgs),
    /// Print the effective configuration.
    PrintConfig(TraceArgs),
    /// Print this text to stdout and do nothing else.
    Usage(String),
}

/// Parse process arguments (including the program name).
pub fn parse_args<I, T>(args: I) -> Invocation
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    Invocation::Usage(e.to_string())
                }
                _ => Invocation::Usage(usage()),
            };
        }
    };

    let mut urls = cli.urls;
    if urls.len() != 1 && !(cli.print_config && urls.is_empty()) {
        return Invocation::Usage(usage());
    }

    let args = TraceArgs {
        url: urls.pop().unwrap_or_default(),
        config: cli.config,
        output: cli.output,
        settle_ms: cli.settle_ms,
        only_api: cli.only_api,
        log_level: cli.log_level,
    };

    if cli.print_config {
        Invocation::PrintConfig(args)
    } else {
        Invocation::Trace(args)
    }
}

/// Usage text shown for a wrong number of arguments.
pub fn usage() -> String {
    let name = Cli::command().get_name().to_string();
    format!("Call me as:\n{name} <PAGE_URL>\ne.g.:\n{name} {EXAMPLE_URL}\n")
}
