use std::fmt;

use crate::{exception::Exception, parse::ParseError};

/// Error type for REPL execution, separating failures by pipeline stage.
///
/// Keeping parse and runtime failures distinct lets callers pick the right
/// exception class for client display without string matching.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplError {
    /// The snippet failed to parse.
    Parse(ParseError),
    /// The snippet raised while executing.
    Runtime(Exception),
}

impl fmt::Display for ReplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "syntax error, {error}"),
            Self::Runtime(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ReplError {}

impl From<ParseError> for ReplError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<Exception> for ReplError {
    fn from(error: Exception) -> Self {
        Self::Runtime(error)
    }
}
