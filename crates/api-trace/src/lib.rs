//! api-trace — record the HTTP API traffic a web page generates while it loads.
//!
//! The [`Tracer`] drives any [`Browser`] implementation, classifies every
//! request URL, aborts tracking requests, and collects a [`TraceLog`] of the
//! remaining responses with pretty-printed JSON bodies.

pub mod browser;
pub mod classify;
pub mod config;
pub mod driver;
pub mod format;
pub mod quiescence;
pub mod recorder;
pub mod trace_log;
pub mod types;

pub use browser::{Browser, BrowserPage};
pub use classify::{Classifier, UrlClass};
pub use config::{CookieConfig, TraceConfig, DEFAULT_OUTPUT};
pub use driver::Tracer;
pub use format::pretty_json;
pub use quiescence::Quiescence;
pub use recorder::ResponseRecorder;
pub use trace_log::{TraceLog, TraceRecord, SEPARATOR};
pub use types::*;
