//! Alert delivery
//!
//! A `Notifier` receives the aggregated batch once per cycle. Delivery
//! failures never abort the cycle: the scan loop logs them and moves on.
//!
//! - `TelegramNotifier` - MarkdownV2 tables sent to every configured chat
//! - `LogNotifier` - plain-text rendering through the `log` facade
//! - `render` - shared formatting (tables, escaping, message splitting)

pub mod backoff;
pub mod logger;
pub mod render;
pub mod telegram;

pub use logger::LogNotifier;
pub use telegram::TelegramNotifier;

use crate::pipeline::aggregator::AlertBatch;
use async_trait::async_trait;
use std::fmt;

/// Outcome of one successful (possibly partial) delivery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Message parts rendered for the batch
    pub parts: usize,
    /// Sends that succeeded (parts x recipients)
    pub sent: usize,
}

#[derive(Debug)]
pub enum DeliveryError {
    Http(String),
    Status(u16),
    /// Some sends succeeded, some failed after retries
    Partial { sent: usize, failed: usize },
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Http(err.to_string())
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Http(e) => write!(f, "HTTP error: {}", e),
            DeliveryError::Status(code) => write!(f, "Delivery rejected with status {}", code),
            DeliveryError::Partial { sent, failed } => {
                write!(f, "Partial delivery: {} sent, {} failed", sent, failed)
            }
        }
    }
}

impl std::error::Error for DeliveryError {}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifier name for logging
    fn name(&self) -> &'static str;

    async fn deliver(&self, batch: &AlertBatch) -> Result<DeliveryReport, DeliveryError>;
}
