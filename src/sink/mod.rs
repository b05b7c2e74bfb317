pub mod excel;
pub mod sheets;

use crate::error::Result;
use crate::report::Report;

/// Destination adapter. Sinks run sequentially and a failing sink must
/// not prevent the remaining ones from receiving the same report.
pub trait ReportSink {
    fn name(&self) -> &'static str;

    fn write(&self, report: &Report) -> Result<()>;
}

/// Hands the report to every sink in order, logging each failure with
/// its destination, and returns the number of sinks that failed.
pub fn run_sinks(sinks: &[Box<dyn ReportSink>], report: &Report) -> usize {
    let mut failed = 0;
    for sink in sinks {
        if let Err(err) = sink.write(report) {
            tracing::error!(sink = sink.name(), %err, "report sink failed");
            failed += 1;
        }
    }
    failed
}
