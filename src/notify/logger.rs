//! Log-only notifier, used when no Telegram token is configured

use super::render::render_plain;
use super::{DeliveryError, DeliveryReport, Notifier};
use crate::pipeline::aggregator::AlertBatch;
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, batch: &AlertBatch) -> Result<DeliveryReport, DeliveryError> {
        let lines = render_plain(batch);

        log::info!("🚨 {} alerts", lines.len());
        for line in &lines {
            log::info!("   ├─ {}", line);
        }

        Ok(DeliveryReport {
            parts: 1,
            sent: lines.len(),
        })
    }
}
