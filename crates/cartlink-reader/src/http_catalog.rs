use std::time::Duration;

use cartlink_core::catalog::{
    CatalogEntry, CatalogKey, CatalogSource, LookupError, relative_reference,
};
use log::debug;
use reqwest::blocking::Client;

use crate::client::{build_http_client, normalize_base_url};

/// Catalog documents and patch files served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    base: String,
    http: Client,
}

impl HttpCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LookupError> {
        let http = build_http_client(timeout, true).map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok(Self {
            base: normalize_base_url(base_url),
            http,
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base, relative_reference(path))
        }
    }

    fn fetch(&self, path: &str) -> Result<Vec<u8>, LookupError> {
        let url = self.url_for(path);
        debug!("Catalog: GET {url}");
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| LookupError::Transport(e.to_string()))
    }
}

impl CatalogSource for HttpCatalog {
    fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, LookupError> {
        let body = self.fetch(&key.document_path())?;
        let text = String::from_utf8_lossy(&body);
        Ok(CatalogEntry::from_json(&text)?)
    }

    fn fetch_patch(&self, reference: &str) -> Result<Vec<u8>, LookupError> {
        self.fetch(reference)
    }
}
