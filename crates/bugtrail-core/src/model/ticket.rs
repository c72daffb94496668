use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use super::{LabelId, TicketId, UserId};

/// Longest accepted ticket title, in characters.
pub const MAX_TITLE_LEN: usize = 280;

/// The present state of a ticket.
///
/// Every field except `id`, `authored_by`, and `created_on` is tracked: it
/// may only change through the change recorder so that history stays
/// reconstructable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub description: String,
    pub authored_by: Option<UserId>,
    pub created_on: DateTime<Utc>,
    /// Whether the ticket is open or closed.
    pub open: bool,
    /// Whether the ticket only accepts edits from staff.
    pub locked: bool,
    pub assignee: Option<UserId>,
    /// The ticket this one duplicates. Never equal to `id`.
    pub dupe_of: Option<TicketId>,
    /// Tickets blocking this one.
    pub blocked_by: BTreeSet<TicketId>,
    pub labels: BTreeSet<LabelId>,
}

impl Ticket {
    /// A compact reference suitable for display in other tickets' history.
    #[must_use]
    pub fn summary(&self) -> TicketSummary {
        TicketSummary {
            id: self.id,
            title: self.title.clone(),
            open: self.open,
        }
    }
}

/// How a ticket is shown when referenced from elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TicketSummary {
    pub id: TicketId,
    pub title: String,
    pub open: bool,
}

impl fmt::Display for TicketSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.title)
    }
}

/// Input for creating a ticket. New tickets start open, unlocked, and
/// unassigned with no relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub authored_by: Option<UserId>,
}

/// The values a caller intends a ticket to hold after an update.
///
/// Scalar and single-reference fields are always supplied. The two
/// many-valued fields are optional: `None` leaves the relation untouched,
/// which is distinct from `Some(empty)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketUpdate {
    pub title: String,
    pub description: String,
    pub open: bool,
    pub locked: bool,
    pub assignee: Option<UserId>,
    pub dupe_of: Option<TicketId>,
    pub blocked_by: Option<BTreeSet<TicketId>>,
    pub labels: Option<BTreeSet<LabelId>>,
}

impl TicketUpdate {
    /// Start from the ticket's values with neither relation set supplied.
    #[must_use]
    pub fn from_ticket(ticket: &Ticket) -> Self {
        Self {
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            open: ticket.open,
            locked: ticket.locked,
            assignee: ticket.assignee,
            dupe_of: ticket.dupe_of,
            blocked_by: None,
            labels: None,
        }
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub const fn open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    #[must_use]
    pub const fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    #[must_use]
    pub const fn assignee(mut self, assignee: Option<UserId>) -> Self {
        self.assignee = assignee;
        self
    }

    #[must_use]
    pub const fn dupe_of(mut self, dupe_of: Option<TicketId>) -> Self {
        self.dupe_of = dupe_of;
        self
    }

    #[must_use]
    pub fn blocked_by(mut self, blocked_by: impl IntoIterator<Item = TicketId>) -> Self {
        self.blocked_by = Some(blocked_by.into_iter().collect());
        self
    }

    #[must_use]
    pub fn labels(mut self, labels: impl IntoIterator<Item = LabelId>) -> Self {
        self.labels = Some(labels.into_iter().collect());
        self
    }
}
