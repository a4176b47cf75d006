use std::io::BufRead;

use ledger_core::StatusReading;

use crate::types::IngestIssue;

/// Parses newline-delimited JSON readings. Blank lines are ignored; lines that
/// fail to parse are reported as issues and skipped.
pub fn readings_from_reader<R: BufRead>(reader: R) -> (Vec<StatusReading>, Vec<IngestIssue>) {
    let mut readings = Vec::new();
    let mut issues = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                issues.push(IngestIssue {
                    resource_id: format!("line {}", idx + 1),
                    message: err.to_string(),
                });
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<StatusReading>(trimmed) {
            Ok(reading) => readings.push(reading),
            Err(err) => issues.push(IngestIssue {
                resource_id: format!("line {}", idx + 1),
                message: err.to_string(),
            }),
        }
    }
    (readings, issues)
}
