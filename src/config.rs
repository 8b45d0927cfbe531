use anyhow::{bail, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::pipeline::Mode;

pub const DEFAULT_OUTPUT: &str = "xss_results.txt";
pub const DEFAULT_THREADS: usize = 20;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub url: Url,
    pub headers_file: PathBuf,
    pub proxy: Option<String>,
    pub catcher: String,
    pub output: PathBuf,
    pub threads: usize,
    pub timeout: Duration,
    pub insecure: bool,
    pub mode: Mode,
    pub color: bool,
}

pub fn command() -> Command {
    Command::new("headerpwn")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Header-based XSS probing with out-of-band confirmation")
        .arg(Arg::new("url").short('u').long("url").value_name("URL").help("URL to make requests to"))
        .arg(Arg::new("headers").short('H').long("headers").value_name("FILE").help("File containing headers for requests, one per line"))
        .arg(Arg::new("proxy").short('p').long("proxy").value_name("IP:PORT").help("Proxy server (e.g., 127.0.0.1:8080)"))
        .arg(Arg::new("catcher").short('c').long("catcher").value_name("URL").help("URL of the Request Catcher to verify XSS execution"))
        .arg(Arg::new("output").short('o').long("output").value_name("FILE").default_value(DEFAULT_OUTPUT).help("File to append XSS detection results to"))
        .arg(Arg::new("quiet").short('q').long("quiet").help("Suppress banner").action(ArgAction::SetTrue))
        .arg(Arg::new("threads").short('t').long("threads").value_name("N").default_value("20").value_parser(value_parser!(usize)).help("Number of concurrent requests"))
        .arg(Arg::new("timeout").short('T').long("timeout").value_name("SECS").default_value("10").value_parser(value_parser!(u64)).help("Per-request timeout in seconds"))
        .arg(Arg::new("insecure").short('k').long("insecure").help("Allow insecure SSL connections").action(ArgAction::SetTrue))
        .arg(Arg::new("serial").long("serial").help("Send and check one variant at a time so detections map to a single header").action(ArgAction::SetTrue))
        .arg(Arg::new("no-color").long("no-color").help("Disable coloured output").action(ArgAction::SetTrue))
        .arg(Arg::new("verbose").short('v').long("verbose").help("Enable debug logging").action(ArgAction::SetTrue))
}

fn non_empty(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Config {
    /// Validates parsed arguments. Errors carry the usage message to print.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let url = match non_empty(matches, "url").map(|u| Url::parse(&u)) {
            Some(Ok(url)) => url,
            _ => bail!("Please provide a valid URL using the --url flag"),
        };
        let Some(headers_file) = non_empty(matches, "headers") else {
            bail!("Please provide a valid headers file using the --headers flag");
        };
        let Some(catcher) = non_empty(matches, "catcher") else {
            bail!("Please provide a valid Request Catcher URL using the --catcher flag");
        };

        let threads = matches.get_one::<usize>("threads").copied().unwrap_or(DEFAULT_THREADS);
        if threads == 0 {
            bail!("Please provide at least one thread using the --threads flag");
        }
        let timeout = matches.get_one::<u64>("timeout").copied().unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout == 0 {
            bail!("Please provide a timeout of at least one second using the --timeout flag");
        }

        Ok(Self {
            url,
            headers_file: PathBuf::from(headers_file),
            proxy: non_empty(matches, "proxy"),
            catcher,
            output: matches
                .get_one::<String>("output")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            threads,
            timeout: Duration::from_secs(timeout),
            insecure: matches.get_flag("insecure"),
            mode: if matches.get_flag("serial") { Mode::Serial } else { Mode::Concurrent },
            color: !matches.get_flag("no-color"),
        })
    }
}
