//! Outbound email delivery.
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::{APP_USER_AGENT, config::MailConfig};

/// Delivers a single message to a single address.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Mail relay accepting one JSON message per `POST`.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: Url,
    sender: String,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build mail client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            sender: config.sender.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let _ = self
            .client
            .post(self.url.clone())
            .json(&RelayMessage {
                from: &self.sender,
                to,
                subject,
                html: body,
            })
            .send()
            .await
            .context("failed to reach mail relay")?
            .error_for_status()
            .with_context(|| format!("mail relay refused message to {to}"))?;
        Ok(())
    }
}
