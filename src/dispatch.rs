use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Proxy, StatusCode};
use std::time::Duration;
use url::Url;

use crate::cachebuster;

/// One variant ready to go out, paired with its cache-buster token.
#[derive(Debug, Clone)]
pub struct Probe {
    pub variant: String,
    pub token: String,
}

impl Probe {
    pub fn new(variant: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            token: token.into(),
        }
    }
}

/// Outcome of a completed request.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Request URL, cache-buster included.
    pub url: Url,
    pub header: String,
    pub status: StatusCode,
    pub content_length: u64,
    pub body: String,
}

/// Splits a variant into `(name, value)` pairs. Lines without `": "` are dropped.
pub fn parse_header_lines(variant: &str) -> Vec<(&str, &str)> {
    variant
        .split('\n')
        .filter_map(|line| line.split_once(": "))
        .collect()
}

fn build_headers(variant: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in parse_header_lines(variant) {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name {:?}", name))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid header value {:?}", value))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Sends probes to the target. Cheap to clone, the client is shared.
#[derive(Clone)]
pub struct Dispatcher {
    base: Url,
    // A bad proxy address only fails the requests that would use it.
    client: std::result::Result<Client, String>,
}

impl Dispatcher {
    pub fn new(base: Url, proxy: Option<&str>, timeout: Duration, insecure: bool) -> Result<Self> {
        let builder = ClientBuilder::new()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure);

        let client = match proxy {
            None => Ok(builder.build().context("Failed to build HTTP client")?),
            Some(addr) => Proxy::all(format!("http://{}", addr))
                .and_then(|p| builder.proxy(p).build())
                .map_err(|e| {
                    log::error!("Error parsing proxy URL {}: {}", addr, e);
                    format!("{} ({})", addr, e)
                }),
        };

        Ok(Self { base, client })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Sends one GET carrying the probe's headers and buffers the whole body.
    pub fn dispatch(&self, probe: &Probe) -> Result<Attempt> {
        let client = self
            .client
            .as_ref()
            .map_err(|e| anyhow!("invalid proxy address {}", e))?;

        let url = cachebuster::apply(&self.base, &probe.token);
        let headers = build_headers(&probe.variant)?;

        let resp = client
            .get(url.clone())
            .headers(headers)
            .send()
            .with_context(|| format!("request to {} failed", url))?;

        let status = resp.status();
        let declared = resp.content_length();
        let body = resp
            .text()
            .with_context(|| format!("failed to read body from {}", url))?;

        Ok(Attempt {
            url,
            header: probe.variant.clone(),
            status,
            content_length: declared.unwrap_or(body.len() as u64),
            body,
        })
    }
}
