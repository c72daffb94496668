//! Storage seams used by the recorder and the log reconstructor.
//!
//! The SQLite implementations live in [`crate::db::store`]. Transaction
//! boundaries belong to the caller: the recorder wraps a re-read, an
//! [`TicketStore::apply`], and a [`RecordStore::append`] in one write
//! transaction.

use chrono::{DateTime, Utc};

use super::record::{ChangeRecord, NewRecord};
use crate::error::TrailError;
use crate::model::{Ticket, TicketId, TicketUpdate};

/// Present state of tickets.
pub trait TicketStore {
    /// Read the authoritative current state of a ticket.
    ///
    /// # Errors
    ///
    /// [`TrailError::NotFound`] if the ticket does not exist, or a store
    /// failure.
    fn get_current(&self, id: TicketId) -> Result<Ticket, TrailError>;

    /// Write every supplied value of `update` to the ticket. Many-valued
    /// fields left as `None` are not touched.
    ///
    /// # Errors
    ///
    /// Propagates store failures, including constraint violations.
    fn apply(&self, id: TicketId, update: &TicketUpdate) -> Result<(), TrailError>;
}

/// Append-only change records.
pub trait RecordStore {
    /// Every record for a ticket, ordered by `(authored_on, id)`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn list_for(&self, ticket: TicketId) -> Result<Vec<ChangeRecord>, TrailError>;

    /// Timestamp of the ticket's most recent record, if any.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn latest_authored_on(&self, ticket: TicketId) -> Result<Option<DateTime<Utc>>, TrailError>;

    /// Persist a new record and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn append(&self, record: NewRecord) -> Result<ChangeRecord, TrailError>;
}
