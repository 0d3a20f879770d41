//! api-trace command line — trace a page's API calls with headless Chromium.

pub mod browser;
pub mod cli;
pub mod config;
pub mod run;

pub use cli::{parse_args, Invocation, TraceArgs};
pub use config::{credential, load_config, resolve_config_path};
pub use run::trace_to_file;
