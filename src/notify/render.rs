//! Batch rendering
//!
//! Telegram MarkdownV2 layout:
//!
//! ~~~text
//! 🚨 *CRYPTO ALERT SYSTEM* 🚨
//!
//! *PUMP ALERTS \(24h change\)*
//! ```
//! Coin | Src | Price | Change
//! -|-|-|-
//! PEPE | binance | $0\.000012 | 22\.7%
//! ```
//!
//! ⏱ *Last update:* `2024\-05\-01 12:00:00 UTC`
//! ~~~
//!
//! Empty sections are omitted, except the 1h/24h volume families which
//! always report "No coins found".

use crate::pipeline::aggregator::{AlertBatch, AlertSection};
use crate::pipeline::rules::RuleKind;
use crate::pipeline::types::AlertRecord;

/// Telegram's hard limit for one message
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const HEADER: &str = "🚨 *CRYPTO ALERT SYSTEM* 🚨\n";
const FENCE: &str = "```";

/// Human-readable volume: 1.2B / 3.4M / 5.6K / 7.89
pub fn format_volume(volume: f64) -> String {
    if volume >= 1_000_000_000.0 {
        format!("{:.1}B", volume / 1_000_000_000.0)
    } else if volume >= 1_000_000.0 {
        format!("{:.1}M", volume / 1_000_000.0)
    } else if volume >= 1_000.0 {
        format!("{:.1}K", volume / 1_000.0)
    } else {
        format!("{:.2}", volume)
    }
}

/// Price with enough precision for sub-cent tokens
pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) if p >= 1.0 => format!("${:.2}", p),
        Some(p) => format!("${:.6}", p),
        None => "-".to_string(),
    }
}

/// Escape every MarkdownV2 reserved character
pub fn escape_markdown(text: &str) -> String {
    const RESERVED: &[char] = &[
        '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    ];

    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Title line followed by a fenced table
pub fn alert_table(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut table = format!("*{}*\n{}\n", escape_markdown(title), FENCE);

    let escaped_headers: Vec<String> = headers.iter().map(|h| escape_markdown(h)).collect();
    table.push_str(&escaped_headers.join(" | "));
    table.push('\n');
    table.push_str(&vec!["-"; headers.len()].join("|"));

    for row in rows {
        let cells: Vec<String> = row.iter().map(|cell| escape_markdown(cell)).collect();
        table.push('\n');
        table.push_str(&cells.join(" | "));
    }

    table.push('\n');
    table.push_str(FENCE);
    table
}

fn percent(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}%", precision, v),
        None => "-".to_string(),
    }
}

fn headers_for(kind: RuleKind) -> &'static [&'static str] {
    match kind {
        RuleKind::VolumeMarketCap => &["Coin", "Src", "Price", "Volume", "Ratio"],
        RuleKind::SupportZone => &["Coin", "Src", "Price", "24h Low", "Deviation"],
        RuleKind::Pump => &["Coin", "Src", "Price", "Change"],
        RuleKind::Inflow
        | RuleKind::VolumeSpike
        | RuleKind::VolumeIncrease1h
        | RuleKind::VolumeIncrease24h => &["Coin", "Src", "Price", "Volume", "Change"],
    }
}

fn row_for(kind: RuleKind, record: &AlertRecord) -> Vec<String> {
    let mut row = vec![
        record.symbol.clone(),
        record.source.clone(),
        format_price(record.price),
    ];

    match kind {
        RuleKind::VolumeMarketCap => {
            row.push(format_volume(record.current_value));
            row.push(percent(record.ratio, 1));
        }
        RuleKind::SupportZone => {
            row.push(format_price(record.reference_value));
            row.push(match record.ratio {
                Some(v) => format!("{:+.2}%", v),
                None => "-".to_string(),
            });
        }
        RuleKind::Pump => row.push(percent(record.change_percent, 1)),
        RuleKind::Inflow
        | RuleKind::VolumeSpike
        | RuleKind::VolumeIncrease1h
        | RuleKind::VolumeIncrease24h => {
            row.push(format_volume(record.current_value));
            row.push(percent(record.change_percent, 2));
        }
    }

    row
}

fn render_section(section: &AlertSection) -> Option<String> {
    if section.records.is_empty() {
        if section.kind.reports_empty() {
            return Some(format!("*{}*\nNo coins found", escape_markdown(section.kind.title())));
        }
        return None;
    }

    let rows: Vec<Vec<String>> = section
        .records
        .iter()
        .map(|record| row_for(section.kind, record))
        .collect();

    Some(alert_table(section.kind.title(), headers_for(section.kind), &rows))
}

fn timestamp_label(captured_at: i64) -> String {
    chrono::DateTime::from_timestamp(captured_at, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| captured_at.to_string())
}

/// Full MarkdownV2 message for a batch (unsplit)
pub fn render_batch(batch: &AlertBatch) -> String {
    let mut parts = vec![HEADER.to_string()];
    parts.extend(batch.sections.iter().filter_map(render_section));
    parts.push(format!(
        "\n⏱ *Last update:* `{}`",
        escape_markdown(&timestamp_label(batch.captured_at))
    ));
    parts.join("\n")
}

/// One line per record, for log output
pub fn render_plain(batch: &AlertBatch) -> Vec<String> {
    batch
        .records()
        .map(|record| {
            let mut line = format!("[{}] {} ({})", record.rule_kind, record.symbol, record.source);
            if let Some(horizon) = record.horizon {
                line.push_str(&format!(" {}", horizon));
            }
            if let Some(change) = record.change_percent {
                line.push_str(&format!(" change {:+.2}%", change));
            }
            if let Some(ratio) = record.ratio {
                line.push_str(&format!(" ratio {:.2}%", ratio));
            }
            line.push_str(&format!(" vol {}", format_volume(record.current_value)));
            line
        })
        .collect()
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// Split a message into parts of at most `max_len` characters
///
/// Splits only between lines. A part that ends inside a code block is closed
/// with a fence and the next part re-opens it, so every part renders on its own.
pub fn split_long_message(message: &str, max_len: usize) -> Vec<String> {
    let fence_len = FENCE.chars().count() + 1;
    let mut parts = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;
    let mut in_code_block = false;

    for line in message.split('\n') {
        let line_len = line.chars().count() + 1;
        let in_code_after = in_code_block ^ is_fence(line);
        let reserve = if in_code_after { fence_len } else { 0 };

        if current_len + line_len + reserve > max_len && !current.is_empty() {
            if in_code_block {
                current.push(FENCE.to_string());
            }
            parts.push(current.join("\n"));
            current.clear();
            current_len = 0;

            if in_code_block {
                current.push(FENCE.to_string());
                current_len += fence_len;
            }
        }

        in_code_block = in_code_after;
        current.push(line.to_string());
        current_len += line_len;
    }

    if !current.is_empty() {
        if in_code_block {
            current.push(FENCE.to_string());
        }
        parts.push(current.join("\n"));
    }

    parts
}
