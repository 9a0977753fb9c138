//! Document loading from various sources.
//!
//! Handles loading developer objects, API objects, and saved mappings from
//! files, strings, and HTTP URLs into typed values.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::CollaboratorError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `CollaboratorError::FileNotFound` if the file doesn't exist,
/// or `CollaboratorError::InvalidJson` if the file doesn't match `T`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CollaboratorError> {
    if !path.exists() {
        return Err(CollaboratorError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| CollaboratorError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_json_str(&content)
}

/// Load a JSON document from a string.
///
/// # Errors
///
/// Returns `CollaboratorError::InvalidJson` if the string doesn't match `T`.
pub fn load_json_str<T: DeserializeOwned>(content: &str) -> Result<T, CollaboratorError> {
    serde_json::from_str(content).map_err(|source| CollaboratorError::InvalidJson { source })
}

/// Load a JSON document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `CollaboratorError::Network` if the request fails or the body
/// doesn't match `T`.
#[cfg(feature = "remote")]
pub fn load_json_url<T: DeserializeOwned>(url: &str) -> Result<T, CollaboratorError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| CollaboratorError::Network {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .map_err(|source| CollaboratorError::Network {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(CollaboratorError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.json().map_err(|source| CollaboratorError::Network {
        url: url.to_string(),
        source,
    })
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a JSON document from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_json_auto<T: DeserializeOwned>(source: &str) -> Result<T, CollaboratorError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_json_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(CollaboratorError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_json(Path::new(source))
    }
}
