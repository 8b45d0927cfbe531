use anyhow::{Context, Result};
use log::warn;
use reqwest::blocking::{Client, ClientBuilder};
use std::time::Duration;

/// Path on the catcher that reports whether a payload fired.
pub const DETECTION_PATH: &str = "/__xss_detected__";
/// Body substring meaning a payload fired.
pub const DETECTION_MARKER: &str = "xss_detected";

/// Out-of-band signal telling whether any payload executed.
pub trait Oracle: Send {
    fn detected(&self) -> bool;
}

/// Request catcher polled over HTTP.
pub struct Catcher {
    client: Client,
    endpoint: String,
}

impl Catcher {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .context("Failed to build catcher HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base.trim_end_matches('/'), DETECTION_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn fetch(&self) -> Result<String> {
        self.client
            .get(&self.endpoint)
            .send()
            .context("Error checking Request Catcher")?
            .text()
            .context("Error reading response body")
    }
}

impl Oracle for Catcher {
    fn detected(&self) -> bool {
        match self.fetch() {
            Ok(body) => body.contains(DETECTION_MARKER),
            Err(e) => {
                warn!("{:#}", e);
                false
            }
        }
    }
}
