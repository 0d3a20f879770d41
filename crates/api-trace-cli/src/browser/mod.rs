//! Browser backends for the tracer.
//!
//! Only Chromium (via chromiumoxide) is supported.

pub mod chromium;

pub use chromium::{find_chromium, ChromiumBrowser};
