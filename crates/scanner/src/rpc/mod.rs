use std::time::Duration;

use async_trait::async_trait;
use block_delta_domain::{Block, BlockHeight};
use reqwest::StatusCode;
use strum_macros::IntoStaticStr;
use thiserror::Error;

mod types;

pub use types::{
    decode_block, parse_block_response, parse_height_response, BlockResult, Envelope,
    WireTransaction,
};

/// Where blocks come from. Every error is classified so callers can label
/// logs and metrics, even though the pipeline retries all kinds alike.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn latest_height(&self) -> Result<BlockHeight, FetchError>;
    async fn block(&self, height: BlockHeight) -> Result<Block, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FetchErrorKind {
    Network,
    Decode,
    Upstream,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Network(_) => FetchErrorKind::Network,
            FetchError::Decode(_) => FetchErrorKind::Decode,
            FetchError::Upstream(_) => FetchErrorKind::Upstream,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// [`BlockSource`] backed by the Etherscan proxy module.
pub struct EtherscanSource {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl EtherscanSource {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn proxy_call(&self, params: &[(&str, &str)]) -> Result<Vec<u8>, FetchError> {
        let mut request = self
            .client
            .get(&self.api_url)
            .query(&[("module", "proxy")])
            .query(params);
        if let Some(key) = &self.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let response = request.send().await?;
        ensure_ok(response.status())?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// The proxy answers every call with `200 OK`; any other status, including
/// other 2xx codes, carries no usable envelope.
fn ensure_ok(status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(FetchError::Upstream(format!("http status {status}")))
    }
}

#[async_trait]
impl BlockSource for EtherscanSource {
    async fn latest_height(&self) -> Result<BlockHeight, FetchError> {
        let body = self.proxy_call(&[("action", "eth_blockNumber")]).await?;
        parse_height_response(&body)
    }

    async fn block(&self, height: BlockHeight) -> Result<Block, FetchError> {
        let tag = format!("{height:#x}");
        let body = self
            .proxy_call(&[
                ("action", "eth_getBlockByNumber"),
                ("tag", tag.as_str()),
                ("boolean", "true"),
            ])
            .await?;
        parse_block_response(height, &body)
    }
}
