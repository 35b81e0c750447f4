//! The remote transfer mechanism behind the cache.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;

use super::error::FetchError;

/// Byte-range access to remote URLs.
///
/// The sole mechanism for fetching remote content; the cache fronts it so
/// repeated reads never hit the network twice for the same range.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Check that the object exists and return its total length in bytes.
    ///
    /// # Arguments
    /// * `url` - Object URL
    ///
    /// # Errors
    /// `NotFound` when the remote has no object at this URL.
    async fn probe(&self, url: &str) -> Result<u64, FetchError>;

    /// Fetch `len` bytes starting at `offset`.
    ///
    /// # Arguments
    /// * `url` - Object URL
    /// * `offset` - Start offset in bytes
    /// * `len` - Exact number of bytes expected
    async fn fetch_range(&self, url: &str, offset: u64, len: u64) -> Result<Vec<u8>, FetchError>;
}

/// HTTP(S) fetcher using ranged GET requests.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a per-request timeout.
    ///
    /// # Arguments
    /// * `timeout` - Bound on each probe or range request
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client: reqwest::Client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Client { source })?;
        Ok(Self { client })
    }

    fn transport_error(url: &str, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source,
            }
        }
    }

    /// Probe via a one-byte ranged GET, for servers that reject HEAD.
    async fn probe_with_get(&self, url: &str) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(|e| Self::transport_error(url, e))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let header = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                parse_total_length(header).ok_or_else(|| FetchError::Malformed {
                    url: url.to_string(),
                    message: format!("unparseable Content-Range {:?}", header),
                })
            }
            status if status.is_success() => {
                response.content_length().ok_or_else(|| FetchError::Malformed {
                    url: url.to_string(),
                    message: "no content length in response".to_string(),
                })
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
            status => Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn probe(&self, url: &str) -> Result<u64, FetchError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| Self::transport_error(url, e))?;

        match response.status() {
            status if status.is_success() => match response.content_length() {
                Some(length) => Ok(length),
                // Some servers omit Content-Length on HEAD; fall back to a
                // ranged GET before giving up on the candidate.
                None => self.probe_with_get(url).await,
            },
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                self.probe_with_get(url).await
            }
            status => Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn fetch_range(&self, url: &str, offset: u64, len: u64) -> Result<Vec<u8>, FetchError> {
        let end: u64 = offset + len - 1;
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-{}", offset, end))
            .send()
            .await
            .map_err(|e| Self::transport_error(url, e))?;

        let status: StatusCode = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT | StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(FetchError::NotFound {
                    url: url.to_string(),
                })
            }
            other => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: other.as_u16(),
                })
            }
        }

        let body: Vec<u8> = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(url, e))?
            .to_vec();

        // A server that ignores Range answers 200 with the whole object.
        let data: Vec<u8> = if status == StatusCode::OK {
            let start: usize = offset as usize;
            let stop: usize = (offset + len).min(body.len() as u64) as usize;
            if start > body.len() {
                Vec::new()
            } else {
                body[start..stop].to_vec()
            }
        } else {
            body
        };

        if data.len() as u64 != len {
            return Err(FetchError::Malformed {
                url: url.to_string(),
                message: format!("expected {} bytes, got {}", len, data.len()),
            });
        }

        Ok(data)
    }
}

/// Extract the total length from a `Content-Range` header value.
///
/// # Arguments
/// * `header` - Header value, e.g. `"bytes 0-0/12345"`
fn parse_total_length(header: &str) -> Option<u64> {
    let total: &str = header.rsplit('/').next()?;
    total.parse().ok()
}
