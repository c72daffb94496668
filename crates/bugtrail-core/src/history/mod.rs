//! Reverse-diff ticket history.
//!
//! Writes go through the [`recorder`], which stores for each update only the
//! values fields held *before* it. Reads go through [`replay`], which walks
//! those records backward from the ticket's present state to reconstruct a
//! displayable event log.

pub mod event;
pub mod field;
pub mod payload;
pub mod record;
pub mod recorder;
pub mod replay;
pub mod resolve;
pub mod store;

pub use event::{Event, EventField, EventValue, change_anchor, comment_anchor, opening_anchor};
pub use field::{FIELDS, Field, FieldKind, FieldValue, RefKind};
pub use payload::{Diff, Payload};
pub use record::{ChangeRecord, NewRecord};
pub use recorder::{Recorder, compute_diff};
pub use replay::{LogOrder, TicketHistory, build_log, comment_count, reconcile, replay};
pub use resolve::{DisplayObject, ReferenceRequest, ReferenceResolver, ReferenceTable};
pub use store::{RecordStore, TicketStore};
