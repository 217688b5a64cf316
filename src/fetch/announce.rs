// src/fetch/announce.rs

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::family::FamilySpec;

/// Portal endpoint that registers a dataset download.
pub const REGISTER_DOWNLOAD_URL: &str =
    "https://dados.gov.br/api/publico/recurso/registrar-download";

/// Body of a download registration, in the portal's own field names.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRegistration<'a> {
    pub id: &'a str,
    pub id_conjunto_dados: &'a str,
    pub descricao: &'a str,
    pub formato: &'a str,
    pub link: &'a str,
    pub tipo: u8,
    pub titulo: &'a str,
}

impl<'a> DownloadRegistration<'a> {
    pub fn for_spec(spec: &'a FamilySpec) -> Self {
        Self {
            id: &spec.resource.id,
            id_conjunto_dados: &spec.resource.dataset_id,
            descricao: &spec.resource.description,
            formato: "csv",
            link: spec.url.as_str(),
            tipo: 1,
            titulo: &spec.resource.title,
        }
    }
}

/// Posts a download registration before each fetch.
///
/// The answer is only logged; a failed announcement never blocks the download.
#[derive(Clone, Debug)]
pub struct Announcer {
    endpoint: Url,
}

impl Announcer {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    /// Returns the HTTP status, or `None` if the request never completed.
    pub fn announce(&self, client: &Client, spec: &FamilySpec) -> Option<u16> {
        let payload = DownloadRegistration::for_spec(spec);
        match client.post(self.endpoint.clone()).json(&payload).send() {
            Ok(resp) if resp.status().is_success() => {
                info!(family = spec.family.as_str(), status = resp.status().as_u16(), "announced download");
                Some(resp.status().as_u16())
            }
            Ok(resp) => {
                warn!(family = spec.family.as_str(), status = resp.status().as_u16(), "download announcement rejected");
                Some(resp.status().as_u16())
            }
            Err(e) => {
                warn!(family = spec.family.as_str(), error = %e, "download announcement failed");
                None
            }
        }
    }
}
