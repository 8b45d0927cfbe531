//! Header-based XSS probing with out-of-band confirmation.
//!
//! Base header lines are expanded into escaped variants, sent to the target
//! on a bounded worker pool, and every completed attempt is followed by a poll
//! of the request catcher.

pub mod cachebuster;
pub mod config;
pub mod dispatch;
pub mod oracle;
pub mod payload;
pub mod pipeline;
pub mod report;

use anyhow::Result;
use log::info;
use std::io::Write;

use cachebuster::CacheBuster;
use config::Config;
use dispatch::{Dispatcher, Probe};
use oracle::Catcher;
use pipeline::Pipeline;
use report::{ColorFormatter, Formatter, PlainFormatter, Reporter, RunSummary};

/// Runs a full scan of `base_headers` against the configured target.
///
/// Summaries go to `console`, detection lines to `findings`.
pub fn scan<W: Write, F: Write>(
    config: &Config,
    base_headers: &[String],
    console: W,
    findings: F,
) -> Result<RunSummary> {
    let variants = payload::expand_variants(base_headers);
    info!("{} base headers expanded to {} variants", base_headers.len(), variants.len());

    let mut buster = CacheBuster::new();
    let probes: Vec<Probe> = variants
        .into_iter()
        .map(|variant| {
            let token = buster.token();
            Probe::new(variant, token)
        })
        .collect();

    let dispatcher = Dispatcher::new(
        config.url.clone(),
        config.proxy.as_deref(),
        config.timeout,
        config.insecure,
    )?;
    let catcher = Catcher::new(&config.catcher, config.timeout)?;
    let formatter: Box<dyn Formatter> = if config.color {
        Box::new(ColorFormatter)
    } else {
        Box::new(PlainFormatter)
    };

    let mut reporter = Reporter::new(formatter, Box::new(catcher), console, findings);
    Pipeline::new(dispatcher, config.threads, config.mode).run(probes, &mut reporter)?;
    let (summary, _, _) = reporter.finish()?;
    Ok(summary)
}
