use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

/// Exception classes the snippet language can raise.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations; the string form matches the class
/// name exactly (`RuntimeError` -> "RuntimeError"). The set is closed:
/// snippets cannot define new exception classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ExcClass {
    /// Default class for bare `raise "message"`.
    RuntimeError,
    /// Reference to an undefined variable.
    NameError,
    /// Operation applied to incompatible operand types.
    TypeError,
    /// Builtin called with a bad argument count or argument kind.
    ArgumentError,
    /// Integer division or modulo by zero.
    ZeroDivisionError,
    /// Snippet failed to parse; surfaced at evaluation time.
    SyntaxError,
}

/// A raised exception: class, message, and the backtrace captured when it
/// was raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    class: ExcClass,
    message: String,
    backtrace: Vec<String>,
}

impl Exception {
    /// Creates an exception with an empty backtrace.
    ///
    /// The evaluator attaches a frame at the statement that raised before
    /// the exception leaves the evaluation.
    #[must_use]
    pub fn new(class: ExcClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    /// Bare `raise "message"` produces a `RuntimeError`.
    #[must_use]
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new(ExcClass::RuntimeError, message)
    }

    /// An undefined variable reference.
    #[must_use]
    pub fn name_error(name: &str) -> Self {
        Self::new(
            ExcClass::NameError,
            format!("undefined local variable or method '{name}'"),
        )
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExcClass::TypeError, message)
    }

    #[must_use]
    pub fn argument_error(message: impl Into<String>) -> Self {
        Self::new(ExcClass::ArgumentError, message)
    }

    /// Integer division/modulo by zero, with the host language's message.
    #[must_use]
    pub fn zero_division() -> Self {
        Self::new(ExcClass::ZeroDivisionError, "divided by 0")
    }

    #[must_use]
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(ExcClass::SyntaxError, message)
    }

    /// Returns the exception class.
    #[must_use]
    pub fn class(&self) -> ExcClass {
        self.class
    }

    /// Returns the printable class name (`"RuntimeError"`).
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        self.class.into()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn backtrace(&self) -> &[String] {
        &self.backtrace
    }

    /// Appends one backtrace frame (innermost first).
    pub fn push_frame(&mut self, frame: String) {
        self.backtrace.push(frame);
    }

    /// Consumes the exception into its parts: class name, message, backtrace.
    #[must_use]
    pub fn into_parts(self) -> (&'static str, String, Vec<String>) {
        (self.class.into(), self.message, self.backtrace)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.class)
        } else {
            write!(f, "{}: {}", self.class, self.message)
        }
    }
}

impl std::error::Error for Exception {}
