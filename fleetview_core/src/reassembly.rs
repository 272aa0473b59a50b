//! Batch reassembly: turns numbered feed parts into atomic full updates.
//!
//! ```text
//!              part 1/N                  part k/N (k = next)        part N/N
//!   [Idle] ───────────────▶ [Active] ─────────────────▶ [Active] ──────────▶ Completed
//!     ▲                        │  part 1/M: supersede (restart)               │
//!     │                        │  orphan / mismatch / gap: abandon            │
//!     └────────────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! At most one transaction is active. A completed update is the concatenation
//! of its parts in arrival order; nothing partial ever leaves this module.
//!
//! A transaction that superseded another remembers it, so late parts of the
//! superseded update are rejected as stale without disturbing the new one.

use crate::entity::RawRecord;
use crate::wire::{BatchPart, WireMessage};
use tracing::{debug, warn};

// ============================================================================
// UPDATE TRANSACTION
// ============================================================================

/// A multi-part update being accumulated.
#[derive(Debug, Clone)]
pub struct UpdateTransaction {
    /// Monotonic transaction number
    pub sequence: u64,

    /// Expected number of parts
    pub total: u64,

    /// Accumulated parts, in arrival order
    pub parts: Vec<Vec<RawRecord>>,

    /// The unfinished update this one replaced
    pub supersedes: Option<SupersededUpdate>,
}

/// Identity of an update dropped by a newer part 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupersededUpdate {
    pub sequence: u64,
    pub total: u64,
}

impl UpdateTransaction {
    fn start(sequence: u64, total: u64, first: Vec<RawRecord>, supersedes: Option<SupersededUpdate>) -> Self {
        Self {
            sequence,
            total,
            parts: vec![first],
            supersedes,
        }
    }

    /// True if a part claiming `total` belongs to the update this one replaced.
    fn is_superseded_part(&self, total: u64) -> bool {
        self.total != total && self.supersedes.is_some_and(|old| old.total == total)
    }

    /// Index the next accepted part must carry.
    pub fn next_index(&self) -> u64 {
        self.parts.len() as u64 + 1
    }

    pub fn record_count(&self) -> usize {
        self.parts.iter().map(Vec::len).sum()
    }

    fn finalize(self) -> CompletedUpdate {
        let parts = self.parts.len() as u64;
        CompletedUpdate {
            sequence: self.sequence,
            parts,
            legacy: false,
            records: self.parts.into_iter().flatten().collect(),
        }
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// A fully reassembled update, ready to become the next snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedUpdate {
    pub sequence: u64,

    /// Number of parts concatenated (1 for legacy messages)
    pub parts: u64,

    /// Delivered as a bare array rather than numbered parts
    pub legacy: bool,

    pub records: Vec<RawRecord>,
}

/// Result of submitting one message.
#[derive(Debug, Clone, PartialEq)]
pub enum ReassemblyOutcome {
    /// A full update is available
    Completed(CompletedUpdate),

    /// Part buffered; the transaction is still open
    Accepted { sequence: u64, index: u64, total: u64 },

    /// Message dropped; the current snapshot is unaffected
    Rejected(ProtocolAnomaly),
}

impl ReassemblyOutcome {
    pub fn completed(self) -> Option<CompletedUpdate> {
        match self {
            ReassemblyOutcome::Completed(update) => Some(update),
            _ => None,
        }
    }

    pub fn anomaly(&self) -> Option<&ProtocolAnomaly> {
        match self {
            ReassemblyOutcome::Rejected(anomaly) => Some(anomaly),
            _ => None,
        }
    }
}

/// Counters kept across the reassembler's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub completed: u64,
    pub legacy: u64,
    pub superseded: u64,
    pub abandoned: u64,
    pub anomalies: u64,
    pub resets: u64,
}

// ============================================================================
// REASSEMBLER
// ============================================================================

/// Single-slot batch reassembly state machine.
#[derive(Debug, Default)]
pub struct BatchReassembler {
    active: Option<UpdateTransaction>,
    next_sequence: u64,
    stats: ReassemblyStats,
}

impl BatchReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits one classified message.
    pub fn submit(&mut self, message: WireMessage) -> ReassemblyOutcome {
        match message {
            WireMessage::Batched(part) => self.submit_part(part),
            WireMessage::Legacy(records) => {
                let sequence = self.allocate_sequence();
                self.stats.completed += 1;
                self.stats.legacy += 1;
                debug!(sequence, records = records.len(), "Legacy update received");
                ReassemblyOutcome::Completed(CompletedUpdate {
                    sequence,
                    parts: 1,
                    legacy: true,
                    records,
                })
            }
            WireMessage::Unrecognized(value) => {
                let shape = match &value {
                    serde_json::Value::Object(_) => "object",
                    serde_json::Value::Array(_) => "array",
                    serde_json::Value::String(_) => "string",
                    serde_json::Value::Number(_) => "number",
                    serde_json::Value::Bool(_) => "bool",
                    serde_json::Value::Null => "null",
                };
                self.reject(ProtocolAnomaly::UnrecognizedMessage {
                    shape: shape.to_string(),
                })
            }
        }
    }

    fn submit_part(&mut self, part: BatchPart) -> ReassemblyOutcome {
        let BatchPart {
            batch,
            batch_number: index,
            total_batches: total,
        } = part;

        if index == 0 || total == 0 || index > total {
            return self.reject(ProtocolAnomaly::InvalidPart { index, total });
        }

        if index == 1 {
            let supersedes = self.active.take().map(|previous| {
                self.stats.superseded += 1;
                debug!(
                    superseded = previous.sequence,
                    received = previous.parts.len(),
                    expected = previous.total,
                    "Unfinished update superseded by a new one"
                );
                SupersededUpdate {
                    sequence: previous.sequence,
                    total: previous.total,
                }
            });
            let sequence = self.allocate_sequence();
            let tx = UpdateTransaction::start(sequence, total, batch, supersedes);
            debug!(sequence, total, "Update transaction started");

            if total == 1 {
                return self.complete(tx);
            }
            self.active = Some(tx);
            return ReassemblyOutcome::Accepted {
                sequence,
                index,
                total,
            };
        }

        let Some(tx) = self.active.as_mut() else {
            return self.reject(ProtocolAnomaly::OrphanPart { index, total });
        };

        if tx.is_superseded_part(total) {
            let sequence = tx.supersedes.map_or(0, |old| old.sequence);
            return self.reject(ProtocolAnomaly::SupersededPart {
                sequence,
                index,
                total,
            });
        }

        if tx.total != total {
            let expected = tx.total;
            let sequence = tx.sequence;
            self.abandon();
            return self.reject(ProtocolAnomaly::TotalMismatch {
                sequence,
                expected,
                got: total,
            });
        }

        let next = tx.next_index();
        if index < next {
            return self.reject(ProtocolAnomaly::StalePart {
                index,
                expected: next,
            });
        }
        if index > next {
            let sequence = tx.sequence;
            self.abandon();
            return self.reject(ProtocolAnomaly::PartGap {
                sequence,
                expected: next,
                got: index,
            });
        }

        tx.parts.push(batch);
        let sequence = tx.sequence;

        if index == total {
            match self.active.take() {
                Some(tx) => self.complete(tx),
                None => ReassemblyOutcome::Accepted {
                    sequence,
                    index,
                    total,
                },
            }
        } else {
            ReassemblyOutcome::Accepted {
                sequence,
                index,
                total,
            }
        }
    }

    /// Drops any unfinished transaction. Called when a connection opens.
    pub fn reset(&mut self) {
        if let Some(tx) = self.active.take() {
            debug!(
                sequence = tx.sequence,
                received = tx.parts.len(),
                "Unfinished update discarded on reset"
            );
            self.stats.abandoned += 1;
        }
        self.stats.resets += 1;
    }

    /// The transaction currently being accumulated, if any.
    pub fn active(&self) -> Option<&UpdateTransaction> {
        self.active.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }

    fn allocate_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn complete(&mut self, tx: UpdateTransaction) -> ReassemblyOutcome {
        let update = tx.finalize();
        self.stats.completed += 1;
        debug!(
            sequence = update.sequence,
            parts = update.parts,
            records = update.records.len(),
            "Update complete"
        );
        ReassemblyOutcome::Completed(update)
    }

    fn abandon(&mut self) {
        if self.active.take().is_some() {
            self.stats.abandoned += 1;
        }
    }

    fn reject(&mut self, anomaly: ProtocolAnomaly) -> ReassemblyOutcome {
        self.stats.anomalies += 1;
        warn!(kind = anomaly.kind(), "{}", anomaly);
        ReassemblyOutcome::Rejected(anomaly)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Recoverable feed protocol anomalies. None of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolAnomaly {
    #[error("Part {index}/{total} arrived with no active update")]
    OrphanPart { index: u64, total: u64 },

    #[error("Update {sequence} expected {expected} parts, part claims {got}")]
    TotalMismatch { sequence: u64, expected: u64, got: u64 },

    #[error("Part {index} is stale, expected part {expected}")]
    StalePart { index: u64, expected: u64 },

    #[error("Part {index}/{total} belongs to superseded update {sequence}")]
    SupersededPart { sequence: u64, index: u64, total: u64 },

    #[error("Update {sequence} lost a part: expected {expected}, got {got}")]
    PartGap { sequence: u64, expected: u64, got: u64 },

    #[error("Part {index}/{total} is out of range")]
    InvalidPart { index: u64, total: u64 },

    #[error("Unrecognized message shape: {shape}")]
    UnrecognizedMessage { shape: String },
}

impl ProtocolAnomaly {
    /// Stable warning code.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolAnomaly::OrphanPart { .. } => "orphan-part",
            ProtocolAnomaly::TotalMismatch { .. } => "total-mismatch",
            ProtocolAnomaly::StalePart { .. } | ProtocolAnomaly::SupersededPart { .. } => "stale-part",
            ProtocolAnomaly::PartGap { .. } => "part-gap",
            ProtocolAnomaly::InvalidPart { .. } => "invalid-part",
            ProtocolAnomaly::UnrecognizedMessage { .. } => "unrecognized-message",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
