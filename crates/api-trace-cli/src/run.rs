//! One complete tracing run: trace the page, write the file, confirm.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use api_trace::{Browser, TraceConfig, Tracer};

/// Trace `url` with `browser` and write the trace to `config.output`.
///
/// Returns the path written.
pub async fn trace_to_file<W: Write>(
    config: &TraceConfig,
    browser: &mut dyn Browser,
    url: &str,
    credential: Option<&str>,
    console: &mut W,
) -> Result<PathBuf> {
    let tracer = Tracer::new(config.clone());
    let log = tracer
        .run(browser, url, credential, console)
        .await
        .with_context(|| format!("failed to trace {url}"))?;

    let path = config.output.clone();
    log.write_to_file(&path)
        .with_context(|| format!("failed to write trace to {}", path.display()))?;
    writeln!(console, "Wrote api trace to {}", path.display())?;
    Ok(path)
}
