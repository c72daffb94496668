use std::fmt;

use crate::history::field::RefKind;
use crate::model::TicketId;

/// Machine-readable error codes for scripts and JSON consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    TicketNotFound,
    UserNotFound,
    LabelNotFound,
    InvalidField,
    ConcurrentModification,
    StoreUnavailable,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::TicketNotFound => "E2001",
            Self::UserNotFound => "E2002",
            Self::LabelNotFound => "E2003",
            Self::InvalidField => "E2004",
            Self::ConcurrentModification => "E3001",
            Self::StoreUnavailable => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::TicketNotFound => "Ticket not found",
            Self::UserNotFound => "User not found",
            Self::LabelNotFound => "Label not found",
            Self::InvalidField => "Invalid field value",
            Self::ConcurrentModification => "Concurrent modification",
            Self::StoreUnavailable => "Ticket store unavailable",
        }
    }

    /// Optional remediation hint that can be surfaced to users.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `bt init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .bugtrail/config.toml and retry."),
            Self::TicketNotFound => Some("Run `bt list` to see existing tickets."),
            Self::UserNotFound => Some("Create the user with `bt user add <name>` first."),
            Self::LabelNotFound => Some("Run `bt label list` to see existing labels."),
            Self::InvalidField => None,
            Self::ConcurrentModification => {
                Some("Retry after the other writer releases the ticket store.")
            }
            Self::StoreUnavailable => Some("Check disk space and write permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the ticket store and the change recorder.
#[derive(Debug, thiserror::Error)]
pub enum TrailError {
    /// A proposed value was rejected before anything was written.
    #[error("invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },

    /// A referenced row does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: RefKind, id: i64 },

    /// Another writer held the store for longer than the busy timeout.
    ///
    /// The whole operation can be retried from scratch.
    #[error("ticket {ticket} is being modified concurrently: {source}")]
    Conflict {
        ticket: TicketId,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other storage failure, propagated unchanged.
    #[error("ticket store: {0}")]
    Store(#[from] rusqlite::Error),
}

impl TrailError {
    /// Shorthand for a [`TrailError::Validation`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::InvalidField,
            Self::NotFound { kind, .. } => match kind {
                RefKind::Ticket => ErrorCode::TicketNotFound,
                RefKind::User => ErrorCode::UserNotFound,
                RefKind::Label => ErrorCode::LabelNotFound,
            },
            Self::Conflict { .. } => ErrorCode::ConcurrentModification,
            Self::Store(_) => ErrorCode::StoreUnavailable,
        }
    }

    /// Whether re-running the whole operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Reclassify lock contention on `ticket` as a [`TrailError::Conflict`].
    #[must_use]
    pub fn for_ticket(self, ticket: TicketId) -> Self {
        match self {
            Self::Store(source) if is_busy(&source) => Self::Conflict { ticket, source },
            other => other,
        }
    }
}

/// Returns true when SQLite reported lock contention.
#[must_use]
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if matches!(
                inner.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, TrailError, is_busy};
    use crate::model::TicketId;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::ConfigParseError,
            ErrorCode::TicketNotFound,
            ErrorCode::UserNotFound,
            ErrorCode::LabelNotFound,
            ErrorCode::InvalidField,
            ErrorCode::ConcurrentModification,
            ErrorCode::StoreUnavailable,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::ConcurrentModification.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn every_store_error_maps_to_its_code() {
        use crate::history::field::RefKind;

        let cases = [
            (TrailError::invalid("title", "empty"), "E2004"),
            (TrailError::NotFound { kind: RefKind::Ticket, id: 1 }, "E2001"),
            (TrailError::NotFound { kind: RefKind::User, id: 1 }, "E2002"),
            (TrailError::NotFound { kind: RefKind::Label, id: 1 }, "E2003"),
            (TrailError::Store(busy_error()).for_ticket(TicketId(1)), "E3001"),
            (TrailError::Store(rusqlite::Error::InvalidQuery), "E5001"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code().code(), code, "{err}");
        }
    }

    fn busy_error() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        )
    }

    #[test]
    fn busy_store_errors_become_conflicts() {
        assert!(is_busy(&busy_error()));

        let err = TrailError::Store(busy_error()).for_ticket(TicketId(7));
        assert!(err.is_retryable());
        assert_eq!(err.code(), ErrorCode::ConcurrentModification);
    }

    #[test]
    fn other_store_errors_are_not_retryable() {
        let err = TrailError::Store(rusqlite::Error::QueryReturnedNoRows).for_ticket(TicketId(7));
        assert!(!err.is_retryable());
        assert_eq!(err.code(), ErrorCode::StoreUnavailable);
    }
}
