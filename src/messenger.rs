//! Outbound messaging used by `broadcast`.
//!
//! The chat transport proper (receiving updates, replying) lives outside
//! this crate. Broadcasts, however, must reach actors who did not write to
//! us, so the desk owns this thin send-only client.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{resolve_token, MessengerConfig};
use crate::traits::Messenger;

/// Sends through the bot API `sendMessage` method.
pub struct TelegramMessenger {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramMessenger {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build messenger HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, recipient_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": recipient_id, "text": text }))
            .send()
            .await
            // The URL embeds the token; keep it out of error messages.
            .map_err(|e| anyhow::anyhow!("sendMessage failed: {}", e.without_url()))?;

        if !resp.status().is_success() {
            bail!("sendMessage returned status {}", resp.status().as_u16());
        }
        Ok(())
    }
}

/// Logs instead of sending. Used for dry runs and when no bot token is set.
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, recipient_id: &str, text: &str) -> Result<()> {
        tracing::info!(recipient = recipient_id, chars = text.chars().count(), "broadcast (log only)");
        Ok(())
    }
}

/// Build the messenger selected by `[messenger].provider`.
pub fn from_config(config: &MessengerConfig) -> Result<Arc<dyn Messenger>> {
    match config.provider.as_str() {
        "telegram" => match resolve_token("messenger", &config.token_env) {
            Some(token) => Ok(Arc::new(TelegramMessenger::new(&config.base_url, token)?)),
            None => {
                tracing::warn!("messenger.provider is telegram but no token is set; broadcasts will only be logged");
                Ok(Arc::new(LogMessenger))
            }
        },
        "log" => Ok(Arc::new(LogMessenger)),
        other => bail!("Unknown messenger provider: '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults_to_log() {
        let m = from_config(&MessengerConfig::default()).unwrap();
        assert_eq!(m.name(), "log");
    }

    #[test]
    fn test_telegram_without_token_falls_back_to_log() {
        let cfg = MessengerConfig {
            provider: "telegram".into(),
            token_env: Some("RECORD_DESK_TEST_UNSET_TOKEN".into()),
            ..MessengerConfig::default()
        };
        assert_eq!(from_config(&cfg).unwrap().name(), "log");
    }
}
