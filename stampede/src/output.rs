use stampede_core::runner::ProgressFn;
use stampede_core::{LoadProfile, RunReport, Session};

use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) use human::describe_shape;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, profile: &LoadProfile, session: &Session);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
