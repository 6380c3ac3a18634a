use std::time::Duration;

use cartlink_core::descriptor::GameDescriptor;
use cartlink_core::save_type::SaveTypeCode;
use log::{debug, info};
use reqwest::blocking::{Client, RequestBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("reader returned HTTP {status} for /{endpoint}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("reader unreachable: {0}")]
    Transport(String),

    #[error("{0} on the cartridge failed verification")]
    VerifyFailed(&'static str),

    #[error("reader sent a malformed game descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl ReaderError {
    /// Whether the device could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    fn into_verify_failure(self, what: &'static str) -> Self {
        match self {
            Self::Status { .. } => Self::VerifyFailed(what),
            other => other,
        }
    }
}

/// Operations of the cartridge reader device.
pub trait CartReader {
    fn game_info(&self) -> Result<GameDescriptor, ReaderError>;

    fn dump_rom(
        &self,
        is_gba: bool,
        cart_size: u64,
        save_code: SaveTypeCode,
    ) -> Result<Vec<u8>, ReaderError>;

    fn dump_save(&self, save_code: SaveTypeCode) -> Result<Vec<u8>, ReaderError>;

    fn upload_save(&self, data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError>;

    fn verify_save(&self, data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError>;

    /// Uploads a ROM; the cart size sent is the image length.
    fn upload_rom(&self, data: &[u8]) -> Result<(), ReaderError>;

    fn verify_rom(&self, data: &[u8]) -> Result<(), ReaderError>;

    /// Uploads a save and has the device read it back.
    fn write_save(&self, data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError> {
        self.upload_save(data, save_code)?;
        self.verify_save(data, save_code)
            .map_err(|e| e.into_verify_failure("save"))
    }

    /// Flashes a ROM and has the device read it back.
    fn reflash(&self, rom: &[u8]) -> Result<(), ReaderError> {
        self.upload_rom(rom)?;
        self.verify_rom(rom).map_err(|e| e.into_verify_failure("ROM"))
    }
}

impl<T: CartReader + ?Sized> CartReader for &T {
    fn game_info(&self) -> Result<GameDescriptor, ReaderError> {
        (**self).game_info()
    }

    fn dump_rom(
        &self,
        is_gba: bool,
        cart_size: u64,
        save_code: SaveTypeCode,
    ) -> Result<Vec<u8>, ReaderError> {
        (**self).dump_rom(is_gba, cart_size, save_code)
    }

    fn dump_save(&self, save_code: SaveTypeCode) -> Result<Vec<u8>, ReaderError> {
        (**self).dump_save(save_code)
    }

    fn upload_save(&self, data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError> {
        (**self).upload_save(data, save_code)
    }

    fn verify_save(&self, data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError> {
        (**self).verify_save(data, save_code)
    }

    fn upload_rom(&self, data: &[u8]) -> Result<(), ReaderError> {
        (**self).upload_rom(data)
    }

    fn verify_rom(&self, data: &[u8]) -> Result<(), ReaderError> {
        (**self).verify_rom(data)
    }
}

/// Adds `http://` to bare host names and drops trailing slashes.
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

pub(crate) fn build_http_client(timeout: Duration, use_proxy: bool) -> Result<Client, reqwest::Error> {
    let builder = Client::builder().timeout(timeout);
    if use_proxy {
        builder.build()
    } else {
        builder.no_proxy().build()
    }
}

/// Blocking HTTP client for the reader device.
#[derive(Debug, Clone)]
pub struct ReaderClient {
    base: String,
    http: Client,
}

impl ReaderClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ReaderError> {
        // The reader sits on the local network; system proxies never reach it.
        let http =
            build_http_client(timeout, false).map_err(|e| ReaderError::Transport(e.to_string()))?;
        Ok(Self {
            base: normalize_base_url(base_url),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn send(&self, endpoint: &'static str, request: RequestBuilder) -> Result<Vec<u8>, ReaderError> {
        let response = request
            .send()
            .map_err(|e| ReaderError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .map_err(|e| ReaderError::Transport(e.to_string()))?;
        debug!("Reader: /{endpoint} returned {} bytes", body.len());
        Ok(body.to_vec())
    }

    fn get(&self, endpoint: &'static str, query: &str) -> Result<Vec<u8>, ReaderError> {
        let url = format!("{}/{endpoint}{query}", self.base);
        debug!("Reader: GET {url}");
        self.send(endpoint, self.http.get(url))
    }

    fn post(&self, endpoint: &'static str, query: &str, body: &[u8]) -> Result<(), ReaderError> {
        let url = format!("{}/{endpoint}{query}", self.base);
        debug!("Reader: POST {url} ({} bytes)", body.len());
        self.send(endpoint, self.http.post(url).body(body.to_vec()))
            .map(drop)
    }
}

impl CartReader for ReaderClient {
    fn game_info(&self) -> Result<GameDescriptor, ReaderError> {
        let body = self.get("get_game_info", "")?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn dump_rom(
        &self,
        is_gba: bool,
        cart_size: u64,
        save_code: SaveTypeCode,
    ) -> Result<Vec<u8>, ReaderError> {
        let endpoint = if is_gba {
            "get_current_game.gba"
        } else {
            "get_current_game.gb"
        };
        info!("Reader: dumping {cart_size} byte ROM");
        self.get(endpoint, &format!("?cartSize={cart_size}&saveType={save_code}"))
    }

    fn dump_save(&self, save_code: SaveTypeCode) -> Result<Vec<u8>, ReaderError> {
        self.get("get_current_save", &format!("?saveType={save_code}"))
    }

    fn upload_save(&self, data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError> {
        self.post("upload_save_file", &format!("?saveType={save_code}"), data)
    }

    fn verify_save(&self, data: &[u8], save_code: SaveTypeCode) -> Result<(), ReaderError> {
        self.post("verify_save_file", &format!("?saveType={save_code}"), data)
    }

    fn upload_rom(&self, data: &[u8]) -> Result<(), ReaderError> {
        self.post("upload_rom_file", &format!("?cartSize={}", data.len()), data)
    }

    fn verify_rom(&self, data: &[u8]) -> Result<(), ReaderError> {
        self.post("verify_rom_file", &format!("?cartSize={}", data.len()), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_are_normalized() {
        assert_eq!(normalize_base_url("192.168.4.1"), "http://192.168.4.1");
        assert_eq!(normalize_base_url("http://cart.local/"), "http://cart.local");
        assert_eq!(normalize_base_url(" https://x:8080// "), "https://x:8080");
    }

    #[test]
    fn only_status_failures_become_verify_failures() {
        let status = ReaderError::Status {
            endpoint: "verify_rom_file",
            status: 500,
        };
        assert!(matches!(
            status.into_verify_failure("ROM"),
            ReaderError::VerifyFailed("ROM")
        ));
        let transport = ReaderError::Transport("refused".into());
        assert!(transport.into_verify_failure("ROM").is_transport());
    }
}
