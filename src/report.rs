use anyhow::{Context, Result};
use colored::*;
use log::info;
use reqwest::StatusCode;
use std::io::Write;

use crate::cachebuster;
use crate::dispatch::Attempt;
use crate::oracle::Oracle;

/// Line written for every confirmed detection, newline excluded.
pub fn detection_line(header: &str) -> String {
    format!("Potential XSS detected with header: {}", header)
}

/// Turns attempts and detections into console lines.
pub trait Formatter: Send {
    fn summary(&self, attempt: &Attempt) -> String;
    fn detection(&self, line: &str) -> String;
}

/// ANSI coloured output.
pub struct ColorFormatter;

impl Formatter for ColorFormatter {
    fn summary(&self, attempt: &Attempt) -> String {
        let status = format!("[{}]", attempt.status.as_u16());
        let status = if attempt.status == StatusCode::OK {
            status.green()
        } else {
            status.red()
        };
        format!(
            "{} {} {} {}",
            status,
            format!("[CL: {}]", attempt.content_length).magenta(),
            format!("[{}]", attempt.header).cyan(),
            format!("[{}]", cachebuster::strip(&attempt.url)).yellow()
        )
    }

    fn detection(&self, line: &str) -> String {
        line.red().bold().to_string()
    }
}

/// Uncoloured output for logs and pipes.
pub struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn summary(&self, attempt: &Attempt) -> String {
        format!(
            "[{}] [CL: {}] [{}] [{}]",
            attempt.status.as_u16(),
            attempt.content_length,
            attempt.header,
            cachebuster::strip(&attempt.url)
        )
    }

    fn detection(&self, line: &str) -> String {
        line.to_string()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub attempts: usize,
    pub detections: usize,
}

/// Prints each attempt, asks the oracle, and records detections.
pub struct Reporter<W: Write, F: Write> {
    formatter: Box<dyn Formatter>,
    oracle: Box<dyn Oracle>,
    console: W,
    findings: F,
    summary: RunSummary,
}

impl<W: Write, F: Write> Reporter<W, F> {
    pub fn new(formatter: Box<dyn Formatter>, oracle: Box<dyn Oracle>, console: W, findings: F) -> Self {
        Self {
            formatter,
            oracle,
            console,
            findings,
            summary: RunSummary::default(),
        }
    }

    pub fn report(&mut self, attempt: &Attempt) -> Result<()> {
        self.summary.attempts += 1;
        writeln!(self.console, "{}", self.formatter.summary(attempt))
            .context("Failed to write result")?;

        if self.oracle.detected() {
            self.summary.detections += 1;
            let line = detection_line(&attempt.header);
            writeln!(self.console, "{}", self.formatter.detection(&line))
                .context("Failed to write result")?;
            writeln!(self.findings, "{}", line).context("Failed to write output file")?;
        }
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Flushes both sinks and hands them back with the totals.
    pub fn finish(mut self) -> Result<(RunSummary, W, F)> {
        self.console.flush().context("Failed to flush results")?;
        self.findings.flush().context("Failed to flush output file")?;
        info!(
            "{} attempts reported, {} detections",
            self.summary.attempts, self.summary.detections
        );
        Ok((self.summary, self.console, self.findings))
    }
}
