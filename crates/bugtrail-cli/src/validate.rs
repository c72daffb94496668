use crate::output::CliError;
use bugtrail_core::model::TicketId;
use bugtrail_core::model::ticket::MAX_TITLE_LEN;

pub const MAX_COMMENT_CHARS: usize = 8_192;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
    pub suggestion: String,
    pub code: &'static str,
}

impl ValidationError {
    pub fn new(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
        suggestion: impl Into<String>,
        code: &'static str,
    ) -> Self {
        Self {
            field,
            value: value.into(),
            reason: reason.into(),
            suggestion: suggestion.into(),
            code,
        }
    }

    pub fn to_cli_error(&self) -> CliError {
        CliError::with_details(
            format!("invalid {} '{}': {}", self.field, self.value, self.reason),
            self.suggestion.clone(),
            self.code,
        )
    }
}

/// Accepts `12` or `#12`.
pub fn parse_ticket_id(s: &str) -> Result<TicketId, ValidationError> {
    let value = s.trim();
    let digits = value.strip_prefix('#').unwrap_or(value);
    match digits.parse::<i64>() {
        Ok(id) if id > 0 => Ok(TicketId(id)),
        _ => Err(ValidationError::new(
            "ticket_id",
            s,
            "must be a positive ticket number",
            "use a ticket number like 12 or #12; `bt list` shows them",
            "invalid_ticket_id",
        )),
    }
}

pub fn validate_title(s: &str) -> Result<(), ValidationError> {
    if s.trim().is_empty() {
        return Err(ValidationError::new(
            "title",
            s,
            "must not be empty",
            "provide a non-empty --title",
            "invalid_title",
        ));
    }
    if s.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::new(
            "title",
            s,
            format!("must be <= {MAX_TITLE_LEN} characters"),
            "shorten the title",
            "invalid_title",
        ));
    }
    if s.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "title",
            s,
            "must not contain control characters",
            "remove control characters from the title",
            "invalid_title",
        ));
    }
    Ok(())
}

pub fn validate_comment(s: &str) -> Result<(), ValidationError> {
    if s.trim().is_empty() {
        return Err(ValidationError::new(
            "comment",
            s,
            "must not be empty",
            "write something in the comment body",
            "invalid_comment",
        ));
    }
    if s.chars().count() > MAX_COMMENT_CHARS {
        return Err(ValidationError::new(
            "comment",
            format!("{}...", s.chars().take(32).collect::<String>()),
            format!("must be <= {MAX_COMMENT_CHARS} characters"),
            "split the comment into several",
            "invalid_comment",
        ));
    }
    if s.chars().any(|ch| ch.is_control() && ch != '\n' && ch != '\t') {
        return Err(ValidationError::new(
            "comment",
            s,
            "must not contain control characters",
            "remove control characters from the comment",
            "invalid_comment",
        ));
    }
    Ok(())
}
