use jiff::Timestamp;
use serde::Serialize;

/// A finished translation from one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// The service that produced the translation.
    pub service_id: String,
    /// All text chunks of the service, concatenated in order.
    pub full_text: String,
    /// When the service finished.
    pub timestamp: Timestamp,
}

/// Receives every translation that finished successfully.
///
/// Called from the task serving the service, once, after its `done` event was delivered.
/// Implementations must not block.
pub trait HistorySink: Send + Sync {
    /// Stores or forwards one record.
    fn record(&self, record: HistoryRecord);
}

/// Logs finished translations without their content.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHistory;

impl HistorySink for LogHistory {
    fn record(&self, record: HistoryRecord) {
        log::debug!(
            "Translation from service '{}' finished at {} ({} characters)",
            record.service_id,
            record.timestamp,
            record.full_text.chars().count()
        );
    }
}
