//! Upload-token broker client.
use std::time::Duration;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::{APP_USER_AGENT, config::BrokerConfig};

/// Issues opaque tokens that let a client push an artifact straight to the file server.
#[async_trait]
pub trait UploadBroker: Send + Sync {
    /// Obtain an upload token for the storage `path`.
    async fn upload_token(&self, path: &str) -> anyhow::Result<String>;
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
}

/// Broker reached over HTTP at `GET {url}/create/upload?path=...`.
#[derive(Debug, Clone)]
pub struct HttpBroker {
    client: reqwest::Client,
    url: Url,
}

impl HttpBroker {
    pub fn new(config: &BrokerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build broker client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    fn endpoint(&self) -> anyhow::Result<Url> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("broker url {} cannot be a base", self.url))?
            .pop_if_empty()
            .extend(["create", "upload"]);
        Ok(url)
    }
}

#[async_trait]
impl UploadBroker for HttpBroker {
    async fn upload_token(&self, path: &str) -> anyhow::Result<String> {
        let res = self
            .client
            .get(self.endpoint()?)
            .query(&[("path", path)])
            .send()
            .await
            .context("failed to reach upload broker")?
            .error_for_status()
            .context("upload broker refused the request")?;

        let body: TokenResponse = res
            .json()
            .await
            .context("failed to decode upload broker response")?;
        if body.token.is_empty() {
            bail!("upload broker returned no token for {path}");
        }
        Ok(body.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_extends_the_configured_path() {
        let broker = HttpBroker::new(&BrokerConfig {
            url: Url::parse("http://files.internal/api/").unwrap(),
            timeout_secs: 1,
        })
        .unwrap();
        assert_eq!(
            broker.endpoint().unwrap().as_str(),
            "http://files.internal/api/create/upload"
        );
    }
}
