//! Naming rules for everything a session refers to by name.
//!
//! Agent ids, session ids, tool names and state keys each have a
//! [`NameKind`] that fixes the allowed characters and length. Errors name
//! the kind, so a bad roster entry reads differently from a bad state key.

use std::fmt;
use thiserror::Error;

/// The kinds of names conclave validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    AgentId,
    SessionId,
    ToolName,
    StateKey,
}

impl NameKind {
    /// Longest accepted name, in bytes.
    pub const fn max_length(self) -> usize {
        match self {
            NameKind::ToolName => 64,
            NameKind::AgentId | NameKind::SessionId | NameKind::StateKey => 128,
        }
    }

    /// Separators a name of this kind may use between segments.
    ///
    /// State keys namespace with dots and colons (`blog.title`,
    /// `review:round:2`); ids only with dots; tool names not at all.
    pub const fn separators(self) -> &'static [char] {
        match self {
            NameKind::StateKey => &['.', ':'],
            NameKind::AgentId | NameKind::SessionId => &['.'],
            NameKind::ToolName => &[],
        }
    }

    /// Keys and tool names come from config files and are trimmed; ids must
    /// arrive exact because they are compared verbatim in transcripts.
    const fn trims_whitespace(self) -> bool {
        matches!(self, NameKind::ToolName | NameKind::StateKey)
    }

    /// Validate `input`, returning the stored form of the name.
    pub fn validate(self, input: &str) -> Result<String, ValidationError> {
        let name = if self.trims_whitespace() {
            input.trim()
        } else if input.trim() != input {
            return Err(ValidationError::SurroundingWhitespace { kind: self });
        } else {
            input
        };

        if name.is_empty() {
            return Err(ValidationError::Empty { kind: self });
        }
        if name.len() > self.max_length() {
            return Err(ValidationError::TooLong {
                kind: self,
                length: name.len(),
                max: self.max_length(),
            });
        }

        let separators = self.separators();
        if let Some(ch) = name
            .chars()
            .find(|&ch| !(ch.is_alphanumeric() || ch == '_' || ch == '-' || separators.contains(&ch)))
        {
            return Err(ValidationError::InvalidChar {
                kind: self,
                name: name.to_string(),
                ch,
            });
        }
        if !separators.is_empty() && name.split(separators).any(str::is_empty) {
            return Err(ValidationError::EmptySegment {
                kind: self,
                name: name.to_string(),
            });
        }

        Ok(name.to_string())
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NameKind::AgentId => "agent id",
            NameKind::SessionId => "session id",
            NameKind::ToolName => "tool name",
            NameKind::StateKey => "state key",
        })
    }
}

/// A name that does not follow the rules of its [`NameKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{kind} cannot be empty")]
    Empty { kind: NameKind },

    #[error("{kind} cannot have leading or trailing whitespace")]
    SurroundingWhitespace { kind: NameKind },

    #[error("{kind} is {length} bytes long (max {max})")]
    TooLong {
        kind: NameKind,
        length: usize,
        max: usize,
    },

    #[error("{kind} '{name}' contains invalid character '{ch}'")]
    InvalidChar { kind: NameKind, name: String, ch: char },

    /// A separator at either end, or two in a row.
    #[error("{kind} '{name}' has an empty segment")]
    EmptySegment { kind: NameKind, name: String },
}

impl ValidationError {
    pub fn kind(&self) -> NameKind {
        match self {
            ValidationError::Empty { kind }
            | ValidationError::SurroundingWhitespace { kind }
            | ValidationError::TooLong { kind, .. }
            | ValidationError::InvalidChar { kind, .. }
            | ValidationError::EmptySegment { kind, .. } => *kind,
        }
    }
}
