// src/fetch/http.rs

use anyhow::Context;
use reqwest::{blocking::Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{Announcer, FetchError, Fetcher};
use crate::{
    family::FamilySpec,
    snapshot::{Snapshot, ANP_DELIMITER},
};

/// Transport knobs for the blocking client.
#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(15),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    pub fn build_client(&self) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str())
            .build()
    }
}

/// Downloads a family's CSV with a single GET, optionally announcing it first.
///
/// Anything but `200 OK` is a failed download.
pub struct HttpFetcher {
    client: Client,
    announcer: Option<Announcer>,
    delimiter: u8,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            announcer: None,
            delimiter: ANP_DELIMITER,
        }
    }

    pub fn with_announcer(mut self, announcer: Announcer) -> Self {
        self.announcer = Some(announcer);
        self
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, spec: &FamilySpec) -> Result<Snapshot, FetchError> {
        let announced = self
            .announcer
            .as_ref()
            .and_then(|a| a.announce(&self.client, spec));

        let start = Instant::now();
        let resp = self.client.get(spec.url.clone()).send()?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.bytes()?;
        info!(
            family = spec.family.as_str(),
            bytes = body.len(),
            announced = ?announced,
            elapsed = ?start.elapsed(),
            "downloaded snapshot"
        );

        let snapshot = Snapshot::from_csv(&body, self.delimiter)
            .with_context(|| format!("parsing CSV from {}", spec.url))
            .map_err(FetchError::Malformed)?;
        debug!(
            family = spec.family.as_str(),
            rows = snapshot.num_rows(),
            "parsed snapshot"
        );
        Ok(snapshot)
    }
}
