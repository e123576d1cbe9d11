mod log;
mod report;

pub use log::{ParsedRecord, RejectReason, RunStatistics, ValidationOutcome};
pub use report::{prepare_output, Report, ReportBuilder, Seconds};
