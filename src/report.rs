//! Reporting layer
//!
//! The engine never prints. A [`ConsoleReporter`] subscribes to the ledger
//! and narrates the run as it happens; [`write_json`] persists the final
//! [`RunReport`] for automation.

use colored::Colorize;
use std::io::{self, Write};
use std::path::Path;

use crate::common::{Error, Result};
use crate::ledger::{Outcome, OutcomeSink, RunReport, Status};

const RULE_WIDTH: usize = 70;

/// Live console narration of the outcome stream
pub struct ConsoleReporter<W: Write + Send = io::Stdout> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Title lines printed before the first section
    pub fn banner(&mut self, title: &str, address: &str, family: &str) {
        let _ = writeln!(self.out, "\n{}", title.cyan().bold());
        let _ = writeln!(self.out, "{}", format!("Device IP: {}", address).cyan());
        let _ = writeln!(self.out, "{}", format!("Device Type: {}", family.to_uppercase()).cyan());
    }

    fn header(&mut self, title: &str) {
        let rule = "=".repeat(RULE_WIDTH);
        let _ = writeln!(self.out, "\n{}", rule.blue().bold());
        let _ = writeln!(self.out, "{}", title.blue().bold());
        let _ = writeln!(self.out, "{}\n", rule.blue().bold());
    }
}

// padded before colouring so escape codes do not eat the column width
fn status_label(status: Status) -> colored::ColoredString {
    match status {
        Status::Pass => format!("{:<8}", format!("✓ {}", status)).green(),
        Status::Fail => format!("{:<8}", format!("✗ {}", status)).red(),
        Status::Skip => format!("{:<8}", format!("○ {}", status)).yellow(),
    }
}

impl<W: Write + Send> OutcomeSink for ConsoleReporter<W> {
    fn section(&mut self, title: &str) {
        self.header(title);
    }

    fn note(&mut self, text: &str) {
        let _ = writeln!(self.out, "\n  {}\n", text.yellow());
    }

    fn outcome(&mut self, outcome: &Outcome) {
        let _ = writeln!(self.out, "  {} {}", status_label(outcome.status()), outcome.name());
        if !outcome.message().is_empty() {
            let _ = writeln!(self.out, "    {} {}", "→".cyan(), outcome.message());
        }
    }

    fn finish(&mut self, report: &RunReport) {
        if report.interrupted {
            let _ = writeln!(self.out, "\n\n{}\n", "Tests interrupted by user".yellow());
        }
        self.header("Test Summary");

        let summary = &report.summary;
        let _ = writeln!(self.out, "  Total Tests:  {}", summary.total.to_string().bold());
        let _ = writeln!(self.out, "  {}       {}", "Passed:".green(), summary.passed);
        let _ = writeln!(self.out, "  {}       {}", "Failed:".red(), summary.failed);
        if summary.skipped > 0 {
            let _ = writeln!(self.out, "  {}      {}", "Skipped:".yellow(), summary.skipped);
        }
        let rate = format!("{:.1}%", summary.success_rate());
        let _ = writeln!(self.out, "\n  Success Rate: {}", rate.bold());

        if summary.all_passed() {
            let _ = writeln!(self.out, "\n  {}", "✓ All tests passed!".green().bold());
        } else {
            let _ = writeln!(self.out, "\n  {}", "✗ Some tests failed!".red().bold());
        }
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}

/// Write the run report as pretty JSON
pub fn write_json(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).map_err(|e| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("writing report to {}: {}", path.display(), e),
        ))
    })?;
    tracing::info!(path = %path.display(), "Report written");
    Ok(())
}
