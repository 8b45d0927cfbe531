use anyhow::Result;
use colored::*;
use env_logger::Env;
use headerpwn::config::{self, Config};
use headerpwn::payload;
use std::fs::OpenOptions;
use std::io::{self, BufWriter};

const BANNER: &str = r#"
    __                   __
   / /  ___ ___ ____/ /__ _______ _    _____
  / _ \/ -_) _ `/ _  / -_) __/ _ \ |/|/ / _ \
 /_//_/\__/\_,_/\_,_/\__/_/ / .__/__,__/_//_/
                           /_/
"#;

fn print_banner() {
    println!("{}", BANNER.yellow());
}

fn main() -> Result<()> {
    let matches = config::command().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if matches.get_flag("no-color") {
        colored::control::set_override(false);
    }
    if !matches.get_flag("quiet") {
        print_banner();
    }

    // Usage and setup problems are printed and end the run normally.
    let config = match Config::from_matches(&matches) {
        Ok(config) => config,
        Err(e) => {
            println!("{}", e);
            return Ok(());
        }
    };

    let headers = match payload::read_headers(&config.headers_file) {
        Ok(headers) => headers,
        Err(e) => {
            println!("Error reading headers: {:#}", e);
            return Ok(());
        }
    };

    let output = match OpenOptions::new().append(true).create(true).open(&config.output) {
        Ok(file) => BufWriter::new(file),
        Err(e) => {
            println!("Error creating output file {}: {}", config.output.display(), e);
            return Ok(());
        }
    };

    let summary = headerpwn::scan(&config, &headers, io::stdout().lock(), output)?;
    if summary.detections > 0 {
        println!(
            "{}",
            format!(
                "[+] {} detections written to {}",
                summary.detections,
                config.output.display()
            )
            .green()
        );
    }

    Ok(())
}
