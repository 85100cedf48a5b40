//! Terminal progress sink.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use rangepurge_engine::{ProgressReport, ProgressSink, SinkError};

/// Renders progress reports as a bar plus one line per report.
pub struct TerminalSink {
    bar: ProgressBar,
}

impl TerminalSink {
    /// Sink for a run expected to delete about `expected` messages.
    pub fn new(expected: u64) -> Self {
        let bar = ProgressBar::new(expected);
        let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} purged")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    /// Sink that swallows every report.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

#[async_trait]
impl ProgressSink for TerminalSink {
    async fn report(&self, report: ProgressReport) -> Result<(), SinkError> {
        match &report {
            ProgressReport::Batch { total, .. } => {
                self.bar.set_position(*total as u64);
                self.bar.println(report.to_string());
            }
            ProgressReport::Completed { total } => {
                self.bar.set_position(*total as u64);
                self.bar.finish_and_clear();
                if !self.bar.is_hidden() {
                    println!("{report}");
                }
            }
            ProgressReport::Failed { .. } | ProgressReport::Cancelled { .. } => {
                self.bar.abandon();
                if !self.bar.is_hidden() {
                    eprintln!("{report}");
                }
            }
        }
        Ok(())
    }
}
