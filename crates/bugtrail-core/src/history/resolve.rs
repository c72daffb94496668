//! Batch resolution of referenced ids into display objects.
//!
//! History may mention users, tickets, and labels that have since been
//! deleted. Resolution never fails for a missing id: the id is simply absent
//! from the result, and replay treats it as a dangling reference.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::field::{Field, RefKind};
use super::payload::Payload;
use super::record::ChangeRecord;
use crate::error::TrailError;
use crate::model::{Label, Ticket, TicketSummary, User};

/// A resolved reference, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DisplayObject {
    User(User),
    Ticket(TicketSummary),
    Label(Label),
}

impl DisplayObject {
    #[must_use]
    pub const fn kind(&self) -> RefKind {
        match self {
            Self::User(_) => RefKind::User,
            Self::Ticket(_) => RefKind::Ticket,
            Self::Label(_) => RefKind::Label,
        }
    }

    /// The raw row id this object was resolved from.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::User(user) => user.id.get(),
            Self::Ticket(ticket) => ticket.id.get(),
            Self::Label(label) => label.id.get(),
        }
    }
}

impl fmt::Display for DisplayObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user) => user.fmt(f),
            Self::Ticket(ticket) => ticket.fmt(f),
            Self::Label(label) => label.fmt(f),
        }
    }
}

/// Read-only batch lookup of one kind of referenced row.
pub trait ReferenceResolver {
    /// Resolve `ids` of `kind`, omitting any id with no backing row.
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying store fails. Missing ids are
    /// never an error.
    fn resolve(
        &self,
        kind: RefKind,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, DisplayObject>, TrailError>;
}

/// The set of ids to resolve, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceRequest {
    ids: BTreeMap<RefKind, BTreeSet<i64>>,
}

impl ReferenceRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every id a ticket's history can mention: present values, every
    /// stored old value, and the authors of the ticket and its records.
    #[must_use]
    pub fn for_history(ticket: &Ticket, records: &[ChangeRecord]) -> Self {
        let mut request = Self::new();

        for field in Field::all() {
            if let Some(kind) = field.kind().ref_kind() {
                request.extend(kind, field.value_of(ticket).ref_ids());
            }
        }
        request.extend(RefKind::User, ticket.authored_by.map(|id| id.get()));

        for record in records {
            request.extend(RefKind::User, record.authored_by.map(|id| id.get()));
            let Payload::Diff(diff) = &record.payload else {
                continue;
            };
            for (field, old) in diff {
                if let Some(kind) = field.kind().ref_kind() {
                    request.extend(kind, old.ref_ids());
                }
            }
        }

        request
    }

    pub fn extend(&mut self, kind: RefKind, ids: impl IntoIterator<Item = i64>) {
        self.ids.entry(kind).or_default().extend(ids);
    }

    /// Ids requested for `kind`.
    pub fn ids(&self, kind: RefKind) -> impl Iterator<Item = i64> + '_ {
        self.ids.get(&kind).into_iter().flatten().copied()
    }

    /// Resolve every kind with one batch lookup each.
    ///
    /// # Errors
    ///
    /// Propagates store failures from `resolver`.
    pub fn resolve<R>(&self, resolver: &R) -> Result<ReferenceTable, TrailError>
    where
        R: ReferenceResolver + ?Sized,
    {
        let mut table = ReferenceTable::default();
        for (kind, ids) in &self.ids {
            if ids.is_empty() {
                continue;
            }
            let found = resolver.resolve(*kind, ids)?;
            tracing::trace!(
                kind = %kind,
                requested = ids.len(),
                resolved = found.len(),
                "resolved reference batch"
            );
            table.resolved.insert(*kind, found);
        }
        Ok(table)
    }
}

/// Resolved display objects, keyed by kind and raw id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    resolved: BTreeMap<RefKind, BTreeMap<i64, DisplayObject>>,
}

impl ReferenceTable {
    /// Look up a resolved object. `None` means the referent no longer exists.
    #[must_use]
    pub fn lookup(&self, kind: RefKind, id: i64) -> Option<&DisplayObject> {
        self.resolved.get(&kind)?.get(&id)
    }

    #[must_use]
    pub fn user(&self, id: i64) -> Option<&User> {
        match self.lookup(RefKind::User, id)? {
            DisplayObject::User(user) => Some(user),
            DisplayObject::Ticket(_) | DisplayObject::Label(_) => None,
        }
    }

    /// Add an already-resolved object.
    pub fn insert(&mut self, object: DisplayObject) {
        self.resolved
            .entry(object.kind())
            .or_default()
            .insert(object.id(), object);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<DisplayObject> for ReferenceTable {
    fn from_iter<I: IntoIterator<Item = DisplayObject>>(iter: I) -> Self {
        let mut table = Self::default();
        for object in iter {
            table.insert(object);
        }
        table
    }
}
