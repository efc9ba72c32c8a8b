//! Error types surfaced by the core pipeline.
//!
//! Every failure that can cross a component boundary is a [`CoreError`];
//! transport adapters map the variants onto distinct HTTP statuses in
//! `routes`. Failures local to one ingest never affect concurrent ingests.

use thiserror::Error;

use crate::models::TicketStatus;

// ---

/// Errors produced by the store, ingestor and ticket manager.
#[derive(Error, Debug)]
pub enum CoreError {
    /// An operation referenced a sensor that does not exist.
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),

    /// Registration attempted with an already-registered external id.
    #[error("sensor already registered: {0}")]
    DuplicateId(String),

    /// A probe value reached the core as a non-finite number. Out-of-range
    /// values are *not* rejected here; they are stored and judged by the
    /// scorer, which needs the record to exist for cross-checking.
    #[error("invalid reading: {field} is not a finite number")]
    InvalidReading {
        /// Name of the offending probe or context field.
        field: &'static str,
    },

    /// An operation referenced a ticket that does not exist.
    #[error("unknown ticket: {0}")]
    UnknownTicket(i64),

    /// A ticket status change outside the Open → InProgress → Resolved
    /// machine (resolved tickets never reopen).
    #[error("invalid ticket transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the ticket currently holds.
        from: TicketStatus,
        /// Status the caller asked for.
        to: TicketStatus,
    },

    /// The scorer blew up. Cannot happen on valid input (the scorer is a
    /// pure total function); the ingestor's defensive catch-all turns a
    /// scorer panic into this, fatal for that one ingest only.
    #[error("scorer failure: {0}")]
    Scorer(String),

    /// Persistence failure; possibly transient. Neither retried nor
    /// swallowed here; the caller decides.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, CoreError>;
