//! Shared data model and backend contract for `Taskboard`.

pub mod api;
pub mod codec;
pub mod member;
pub mod task;

/// Error returned when parsing an enumeration from its string form fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseError {
    /// Which enumeration was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseError {
    /// Creates a parse error for `value` of the given `kind`.
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
