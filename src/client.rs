//! Client for a running bsc-server
//!
//! Thin wrapper over `reqwest`. Gzip-encoded DECOMPRESS responses are inflated
//! locally.

use std::io::Read;

use flate2::read::MultiGzDecoder;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use tracing::debug;

use crate::config::Coder;
use crate::error::ClientError;

pub struct RemoteCompressor {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteCompressor {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// The service greeting.
    pub async fn ping(&self) -> Result<String, ClientError> {
        let resp = self.client.get(self.url("PING")).send().await?;
        Ok(Self::check(resp).await?.text().await?)
    }

    pub async fn health_check(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// Compress `data` remotely. `None` lets the service pick its defaults.
    pub async fn compress(
        &self,
        data: Vec<u8>,
        coder: Option<Coder>,
        block_size_mb: Option<usize>,
    ) -> Result<Vec<u8>, ClientError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(coder) = coder {
            query.push(("coder", coder.level().to_string()));
        }
        if let Some(mb) = block_size_mb {
            query.push(("blockSize", mb.to_string()));
        }

        let resp = self
            .client
            .post(self.url("COMPRESS"))
            .query(&query)
            .body(data)
            .send()
            .await?;
        let body = Self::check(resp).await?.bytes().await?;
        debug!(bytes = body.len(), "remote compress finished");
        Ok(body.to_vec())
    }

    /// Decompress a `bsc1` container remotely. With `accept_gzip` the response
    /// travels gzip-encoded.
    pub async fn decompress(&self, container: Vec<u8>, accept_gzip: bool) -> Result<Vec<u8>, ClientError> {
        let mut req = self.client.post(self.url("DECOMPRESS")).body(container);
        if accept_gzip {
            req = req.header(ACCEPT_ENCODING, "gzip");
        }
        let resp = Self::check(req.send().await?).await?;
        let gzip_encoded = resp
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |v| v.eq_ignore_ascii_case("gzip"));
        let body = resp.bytes().await?;
        debug!(bytes = body.len(), gzip_encoded, "remote decompress finished");

        if gzip_encoded {
            let mut out = Vec::new();
            MultiGzDecoder::new(body.as_ref()).read_to_end(&mut out)?;
            Ok(out)
        } else {
            Ok(body.to_vec())
        }
    }
}
