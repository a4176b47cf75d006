mod pipeline;
mod readings;
mod resolver;
mod types;

pub use pipeline::{ingest_readings, ingest_readings_file};
pub use readings::readings_from_reader;
pub use resolver::{Observed, StatusResolver, resource_input};
pub use types::{IngestError, IngestIssue, IngestStats, Result, RetryPolicy};
