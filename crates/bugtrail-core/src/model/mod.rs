//! Row types for tickets, users, and labels.

pub mod label;
pub mod ticket;
pub mod user;

pub use label::Label;
pub use ticket::{NewTicket, Ticket, TicketSummary, TicketUpdate};
pub use user::User;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// The raw integer primary key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().trim_start_matches('#').parse().map(Self)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Primary key of a ticket.
    TicketId
);
row_id!(
    /// Primary key of a user.
    UserId
);
row_id!(
    /// Primary key of a label.
    LabelId
);
row_id!(
    /// Primary key of a change record. Increases with insertion order.
    RecordId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_with_or_without_hash() {
        assert_eq!("42".parse::<TicketId>().ok(), Some(TicketId(42)));
        assert_eq!("#42".parse::<TicketId>().ok(), Some(TicketId(42)));
        assert_eq!(" 7 ".parse::<LabelId>().ok(), Some(LabelId(7)));
        assert!("bug".parse::<UserId>().is_err());
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&TicketId(3)).expect("serialize");
        assert_eq!(json, "3");
        let back: UserId = serde_json::from_str("9").expect("deserialize");
        assert_eq!(back, UserId(9));
    }
}
