//! JSON-lines deployment report: one line per config outcome, appended as
//! the run progresses so a killed process still leaves a usable partial
//! report.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::coordinate::Coordinate;
use crate::error::{DeployerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportState {
    Success,
    Error,
    Excluded,
    Skipped,
}

/// One line of the report: `{type, time, config_coordinate, state, details, error?}`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    #[serde(rename = "type")]
    pub config_type: String,
    pub time: u64,
    pub config_coordinate: Coordinate,
    pub environment: String,
    pub state: ReportState,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportEntry {
    pub fn new(
        config_type: impl Into<String>,
        coordinate: Coordinate,
        environment: impl Into<String>,
        state: ReportState,
        details: impl Into<String>,
    ) -> Self {
        Self {
            config_type: config_type.into(),
            time: now_ts(),
            config_coordinate: coordinate,
            environment: environment.into(),
            state,
            details: details.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

fn now_ts() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Appends every entry to `path` as newline-delimited JSON, one `write`
/// call per entry so a report in progress is always valid up to its last
/// completed line.
pub fn append(path: &Path, entries: &[ReportEntry]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| DeployerError::Load(format!("failed to open report file {}: {err}", path.display())))?;

    for entry in entries {
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}").map_err(|err| DeployerError::Load(format!("failed to write report line: {err}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::Coordinate;

    #[test]
    fn append_writes_one_json_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.jsonl");
        let coordinate = Coordinate::new("p", "bucket", "b1").unwrap();
        let entries = vec![
            ReportEntry::new("bucket", coordinate.clone(), "prod", ReportState::Success, "deployed"),
            ReportEntry::new("bucket", coordinate, "prod", ReportState::Error, "deploy failed").with_error("boom"),
        ];
        append(&path, &entries).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["state"], "SUCCESS");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["error"], "boom");
    }
}
