use chrono::{DateTime, Utc};

use super::payload::Payload;
use crate::model::{RecordId, TicketId, UserId};

/// An immutable, append-only entry in a ticket's history.
///
/// Exactly one record is written per update or comment. Records for a
/// ticket are ordered by `authored_on`, ties broken by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub id: RecordId,
    pub ticket_id: TicketId,
    pub authored_by: Option<UserId>,
    pub authored_on: DateTime<Utc>,
    pub payload: Payload,
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub ticket_id: TicketId,
    pub authored_by: Option<UserId>,
    pub authored_on: DateTime<Utc>,
    pub payload: Payload,
}

impl NewRecord {
    #[must_use]
    pub fn with_id(self, id: RecordId) -> ChangeRecord {
        ChangeRecord {
            id,
            ticket_id: self.ticket_id,
            authored_by: self.authored_by,
            authored_on: self.authored_on,
            payload: self.payload,
        }
    }
}

/// Pick the timestamp for a new record so a ticket's records never go
/// backwards in time, even if the wall clock does.
#[must_use]
pub fn monotonic_timestamp(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    latest.map_or(now, |latest| now.max(latest))
}

#[cfg(test)]
mod tests {
    use super::monotonic_timestamp;
    use chrono::{Duration, Utc};

    #[test]
    fn timestamp_never_precedes_latest_record() {
        let now = Utc::now();
        let ahead = now + Duration::seconds(30);
        assert_eq!(monotonic_timestamp(now, None), now);
        assert_eq!(monotonic_timestamp(now, Some(ahead)), ahead);
        assert_eq!(monotonic_timestamp(ahead, Some(now)), ahead);
    }
}
