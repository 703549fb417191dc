use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use orcabot_core::RetryPolicy;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("chat gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl GatewayError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
        }
    }
}

/// Outbound edge of the conversation. The agent runtime only ever talks to
/// this trait; production wires in [`EvolutionClient`].
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_text(&self, phone: &str, message: &str) -> Result<(), GatewayError>;

    async fn send_document(
        &self,
        phone: &str,
        document_url: &str,
        caption: &str,
        filename: &str,
    ) -> Result<(), GatewayError>;

    /// Best effort; a missed typing indicator never fails a reply.
    async fn send_typing(&self, phone: &str, duration: Duration);

    /// Shows a typing indicator proportional to the reply length before
    /// sending, so the conversation reads like a person on the other end.
    async fn deliver_humanized(&self, phone: &str, message: &str) -> Result<(), GatewayError> {
        let delay = typing_delay(message);
        self.send_typing(phone, delay).await;
        tokio::time::sleep(delay).await;
        self.send_text(phone, message).await
    }
}

/// Reading-speed simulation: 30ms per character, clamped to 1-4 seconds.
pub fn typing_delay(message: &str) -> Duration {
    let millis = (message.chars().count() as u64 * 30).clamp(1_000, 4_000);
    Duration::from_millis(millis)
}

/// Truncated phone for log lines; full numbers stay out of the logs.
pub fn mask_phone(phone: &str) -> String {
    let prefix: String = phone.chars().take(8).collect();
    format!("{prefix}***")
}

pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    instance: String,
    retry: RetryPolicy,
}

impl EvolutionClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: SecretString,
        instance: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            instance: instance.into(),
            retry,
        }
    }

    async fn post_once(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(url)
            .header("apikey", self.api_key.expose_secret())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }

        Ok(())
    }

    async fn post_with_retry(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let mut attempt = 0;
        loop {
            match self.post_once(url, payload).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        event_name = "whatsapp.send_retry",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "gateway call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl ChatGateway for EvolutionClient {
    async fn send_text(&self, phone: &str, message: &str) -> Result<(), GatewayError> {
        let url = format!("{}/message/sendText/{}", self.base_url, self.instance);
        let payload = json!({ "number": phone, "text": message });

        self.post_with_retry(&url, &payload).await?;
        info!(event_name = "whatsapp.text_sent", phone = %mask_phone(phone));
        Ok(())
    }

    async fn send_document(
        &self,
        phone: &str,
        document_url: &str,
        caption: &str,
        filename: &str,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/message/sendMedia/{}", self.base_url, self.instance);
        let payload = json!({
            "number": phone,
            "mediatype": "document",
            "mimetype": "application/pdf",
            "caption": caption,
            "media": document_url,
            "fileName": filename,
        });

        self.post_with_retry(&url, &payload).await?;
        info!(event_name = "whatsapp.document_sent", phone = %mask_phone(phone));
        Ok(())
    }

    async fn send_typing(&self, phone: &str, duration: Duration) {
        let url = format!("{}/chat/sendPresence/{}", self.base_url, self.instance);
        let payload = json!({
            "number": phone,
            "options": { "presence": "composing", "delay": duration.as_millis() as u64 },
        });

        if let Err(error) = self.post_once(&url, &payload).await {
            debug!(
                event_name = "whatsapp.typing_failed",
                phone = %mask_phone(phone),
                error = %error,
                "typing indicator dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{mask_phone, typing_delay};

    #[test]
    fn typing_delay_scales_with_length_within_bounds() {
        assert_eq!(typing_delay("oi"), Duration::from_millis(1_000));
        assert_eq!(typing_delay(&"a".repeat(60)), Duration::from_millis(1_800));
        assert_eq!(typing_delay(&"a".repeat(500)), Duration::from_millis(4_000));
    }

    #[test]
    fn typing_delay_counts_characters_not_bytes() {
        // 60 multibyte chars should behave like 60 ascii chars.
        assert_eq!(typing_delay(&"ç".repeat(60)), Duration::from_millis(1_800));
    }

    #[test]
    fn masked_phone_keeps_only_a_prefix() {
        assert_eq!(mask_phone("5511999990000"), "55119999***");
        assert_eq!(mask_phone("5511"), "5511***");
    }
}
