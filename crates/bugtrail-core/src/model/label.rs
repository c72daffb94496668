use serde::Serialize;
use std::fmt;

use super::LabelId;

/// Longest accepted label name, in characters.
pub const MAX_LABEL_NAME_LEN: usize = 64;

/// Default label color when none is given.
pub const DEFAULT_LABEL_COLOR: &str = "#ffffff";

/// A tag that can be attached to any number of tickets.
///
/// `color` is stored verbatim; it is never parsed by the core.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
    pub description: String,
    pub color: String,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
