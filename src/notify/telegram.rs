//! Telegram Bot API notifier
//!
//! ## API Reference
//!
//! Endpoint: POST https://api.telegram.org/bot{token}/sendMessage
//! Body: `{chat_id, text, parse_mode: "MarkdownV2", disable_web_page_preview}`
//!
//! The batch is rendered once, split into <= 4096 character parts and every
//! part is sent to every chat id. Sends are paced 1s apart to stay below the
//! per-chat rate limit; each send retries with exponential backoff.

use super::backoff::ExponentialBackoff;
use super::render::{render_batch, split_long_message, TELEGRAM_MAX_MESSAGE_LEN};
use super::{DeliveryError, DeliveryReport, Notifier};
use crate::pipeline::aggregator::AlertBatch;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_ids: Vec<i64>,
    send_interval: Duration,
    max_retries: u32,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_ids: Vec<i64>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token: bot_token.into(),
            chat_ids,
            send_interval: Duration::from_secs(1),
            max_retries: 3,
        })
    }

    /// Point at a different Bot API server (local bot API, test double)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base.trim_end_matches('/'), self.bot_token)
    }

    async fn send_once(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "MarkdownV2",
            disable_web_page_preview: true,
        };

        let response = self.client.post(self.endpoint()).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            log::debug!("📨 Telegram rejected message for {}: {}", chat_id, body);
            return Err(DeliveryError::Status(status));
        }

        Ok(())
    }

    async fn send_with_retry(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(8),
            self.max_retries,
        );

        loop {
            match self.send_once(chat_id, text).await {
                Ok(()) => return Ok(()),
                // 400 means the message itself is invalid, retrying cannot help
                Err(DeliveryError::Status(400)) => return Err(DeliveryError::Status(400)),
                Err(e) => {
                    log::warn!("⚠️  Telegram send to {} failed: {}", chat_id, e);
                    if backoff.sleep().await.is_err() {
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn deliver(&self, batch: &AlertBatch) -> Result<DeliveryReport, DeliveryError> {
        let message = render_batch(batch);
        let parts = split_long_message(&message, TELEGRAM_MAX_MESSAGE_LEN);

        let mut sent = 0usize;
        let mut failed = 0usize;
        let mut last_error = None;

        for part in &parts {
            for &chat_id in &self.chat_ids {
                match self.send_with_retry(chat_id, part).await {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        log::error!("❌ Failed to send alert part to {}: {}", chat_id, e);
                        failed += 1;
                        last_error = Some(e);
                    }
                }
                tokio::time::sleep(self.send_interval).await;
            }
        }

        match (failed, last_error) {
            (0, _) => {
                log::info!(
                    "📨 Sent {} message(s) to {} chat(s)",
                    parts.len(),
                    self.chat_ids.len()
                );
                Ok(DeliveryReport {
                    parts: parts.len(),
                    sent,
                })
            }
            (_, Some(e)) if sent == 0 => Err(e),
            _ => Err(DeliveryError::Partial { sent, failed }),
        }
    }
}
