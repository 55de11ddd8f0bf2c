//! Source data locations: local paths or HTTP(S) URLs.

use crate::{LandCoverError, Result};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Read the whole content of `location`.
pub(crate) fn read(location: &str) -> Result<Vec<u8>> {
    if !is_url(location) {
        return Ok(std::fs::read(location)?);
    }

    debug!(url = location, "Downloading land-cover data");
    let client = reqwest::blocking::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let response = client.get(location).send()?;
    if !response.status().is_success() {
        return Err(LandCoverError::InvalidSource {
            location: location.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    Ok(response.bytes()?.to_vec())
}

/// Short content digest used as a source version.
pub(crate) fn content_version(bytes: &[u8]) -> String {
    hex::encode(&Sha256::digest(bytes)[..8])
}
