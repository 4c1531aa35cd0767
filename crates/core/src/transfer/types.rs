//! Types for transfer operations.

use serde::{Deserialize, Serialize};

/// Direction of a transfer, used for logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
        }
    }
}

/// Files and bytes moved by one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub files: usize,
    pub bytes: u64,
}

impl TransferSummary {
    /// Adds another batch's totals to this one.
    pub fn merge(&mut self, other: TransferSummary) {
        self.files += other.files;
        self.bytes += other.bytes;
    }
}
