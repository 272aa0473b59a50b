//! Inbound wire messages.
//!
//! Every text frame from the feed is classified exactly once, here, into a
//! [`WireMessage`]. Downstream code never inspects raw JSON shapes.
//!
//! ```text
//!   {"batch":[..],"batchNumber":2,"totalBatches":5}  -> WireMessage::Batched
//!   [ {..}, {..} ]                                   -> WireMessage::Legacy
//!   anything else that parses as JSON                -> WireMessage::Unrecognized
//!   not JSON                                         -> DecodeError
//! ```

use crate::entity::RawRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One numbered part of a multi-part update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPart {
    /// Records carried by this part
    pub batch: Vec<RawRecord>,

    /// 1-based part index
    pub batch_number: u64,

    /// Number of parts in the whole update
    pub total_batches: u64,
}

impl BatchPart {
    pub fn new(batch: Vec<RawRecord>, batch_number: u64, total_batches: u64) -> Self {
        Self {
            batch,
            batch_number,
            total_batches,
        }
    }
}

/// A classified feed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    /// Numbered part of a multi-part update
    Batched(BatchPart),

    /// Bare array: a complete update in one message
    Legacy(Vec<RawRecord>),

    /// Valid JSON of any other shape
    Unrecognized(Value),
}

impl WireMessage {
    /// Classifies one text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes the message back into its wire text.
    pub fn encode(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short shape description for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Batched(_) => "batched",
            WireMessage::Legacy(_) => "legacy",
            WireMessage::Unrecognized(_) => "unrecognized",
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors decoding a feed frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
