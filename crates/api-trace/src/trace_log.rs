//! The in-memory trace log and its one-shot file writer.

use std::io::Write;
use std::path::Path;

use crate::types::TraceResult;

/// Closes every API record.
pub const SEPARATOR: &str = "-------------------------------";

/// One entry in the trace log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    /// Ordinary traffic: `METHOD status url`.
    Summary(String),
    /// API traffic with formatted bodies.
    Api {
        summary: String,
        request: String,
        response: String,
    },
}

impl TraceRecord {
    /// The lines this record contributes to the rendered log.
    pub fn lines(&self) -> Vec<&str> {
        match self {
            TraceRecord::Summary(line) => vec![line.as_str()],
            TraceRecord::Api {
                summary,
                request,
                response,
            } => vec![summary.as_str(), request.as_str(), response.as_str(), SEPARATOR],
        }
    }
}

/// Ordered, append-only record of observed traffic.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    records: Vec<TraceRecord>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of API records.
    pub fn api_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, TraceRecord::Api { .. }))
            .count()
    }

    /// All record lines joined with `\n`.
    pub fn render(&self) -> String {
        self.records
            .iter()
            .flat_map(|r| r.lines())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write the rendered log to `path`, replacing any previous trace.
    ///
    /// Goes through a sibling temp file and a rename so readers never see a
    /// partial trace.
    pub fn write_to_file(&self, path: &Path) -> TraceResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = Path::new(&tmp_name);

        let mut file = std::fs::File::create(tmp_path)?;
        file.write_all(self.render().as_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(tmp_path, path)?;
        tracing::debug!(path = %path.display(), records = self.len(), "trace written");
        Ok(())
    }
}
