//! Event types for the escrutinio event system
//!
//! Provides the shared domain event enum and the EventBus used to fan
//! events out to interested components (consolidation listener, audit
//! consumers, the web layer's SSE bridge outside the core).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Domain events emitted by the core pipeline.
///
/// Events are broadcast via [`EventBus`] and can be serialized for
/// transmission to external consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScrutinyEvent {
    /// An E-14 capture was created from an upload
    E14Captured {
        capture_id: i64,
        polling_table_id: i64,
        election_type_id: i64,
        needs_manual_entry: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A witness confirmed an E-14 capture; consumed by the consolidation engine
    E14Confirmed {
        capture_id: i64,
        polling_table_id: i64,
        election_type_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A confirmed E-14 capture was administratively superseded
    E14Superseded {
        capture_id: i64,
        polling_table_id: i64,
        election_type_id: i64,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A consolidation was started (or restarted) for a municipality
    ConsolidationStarted {
        consolidation_id: i64,
        municipality_id: i64,
        election_type_id: i64,
        electoral_process_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A consolidation run finished; carries the recomputed totals
    ConsolidationUpdated {
        consolidation_id: i64,
        tables_processed: i64,
        total_tables_expected: i64,
        total_valid_votes: i64,
        total_blank_votes: i64,
        total_null_votes: i64,
        total_ballots: i64,
        completed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A generated E-24 artifact was rendered
    E24Generated {
        consolidation_id: i64,
        artifact_ref: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Verification against the official E-24 completed
    VerificationCompleted {
        consolidation_id: i64,
        discrepancy_count: usize,
        verified: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A formal claim was generated from discrepancies
    ClaimGenerated {
        claim_id: i64,
        consolidation_id: i64,
        claim_number: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A claim moved through its lifecycle
    ClaimStatusChanged {
        claim_id: i64,
        old_status: String,
        new_status: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A witness was assigned to a polling table
    WitnessAssigned {
        assignment_id: i64,
        witness_id: i64,
        polling_table_id: i64,
        electoral_process_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A witness assignment changed status
    WitnessStatusChanged {
        assignment_id: i64,
        old_status: String,
        new_status: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ScrutinyEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScrutinyEvent::E14Captured { .. } => "E14Captured",
            ScrutinyEvent::E14Confirmed { .. } => "E14Confirmed",
            ScrutinyEvent::E14Superseded { .. } => "E14Superseded",
            ScrutinyEvent::ConsolidationStarted { .. } => "ConsolidationStarted",
            ScrutinyEvent::ConsolidationUpdated { .. } => "ConsolidationUpdated",
            ScrutinyEvent::E24Generated { .. } => "E24Generated",
            ScrutinyEvent::VerificationCompleted { .. } => "VerificationCompleted",
            ScrutinyEvent::ClaimGenerated { .. } => "ClaimGenerated",
            ScrutinyEvent::ClaimStatusChanged { .. } => "ClaimStatusChanged",
            ScrutinyEvent::WitnessAssigned { .. } => "WitnessAssigned",
            ScrutinyEvent::WitnessStatusChanged { .. } => "WitnessStatusChanged",
        }
    }
}

/// Central event distribution bus.
///
/// Backed by `tokio::broadcast`: non-blocking publish, multiple
/// concurrent subscribers, automatic cleanup when subscribers drop.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScrutinyEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before
    /// subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScrutinyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` otherwise.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScrutinyEvent,
    ) -> Result<usize, broadcast::error::SendError<ScrutinyEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening.
    pub fn emit_lossy(&self, event: ScrutinyEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
