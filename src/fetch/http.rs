//! HTTP transport for tile downloads.
//!
//! Workers talk to the network only through [`HttpClient`], so tests can
//! inject a canned client and never open a socket.

use crate::error::FetchError;
use bytes::Bytes;

pub trait HttpClient: Send + Sync {
    /// GET `url` and return the body of a successful response.
    fn get(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[cfg(feature = "http")]
pub use self::reqwest_client::ReqwestClient;

#[cfg(feature = "http")]
mod reqwest_client {
    use super::HttpClient;
    use crate::error::FetchError;
    use bytes::Bytes;
    use std::time::Duration;

    /// Blocking `reqwest` client shared by all workers.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::blocking::Client,
    }

    impl ReqwestClient {
        pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .user_agent(user_agent)
                .build()
                .map_err(|e| FetchError::Http(format!("failed to create HTTP client: {}", e)))?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        fn get(&self, url: &str) -> Result<Bytes, FetchError> {
            let response = self
                .client
                .get(url)
                .send()
                .map_err(|e| FetchError::Http(format!("request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(FetchError::Http(format!(
                    "HTTP {} from {}",
                    response.status(),
                    url
                )));
            }

            response
                .bytes()
                .map_err(|e| FetchError::Http(format!("failed to read response: {}", e)))
        }
    }
}

/// Client that refuses every request. Used when the crate is built without
/// the `http` feature and no client is injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineClient;

impl HttpClient for OfflineClient {
    fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        Err(FetchError::Http(format!("offline, not fetching {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_client_fails() {
        let err = OfflineClient.get("https://example.com/0/0/0.png").unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }
}
