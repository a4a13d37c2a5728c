//! Persistent REPL session support.
//!
//! [`ReplSession`] keeps the variable bindings of one console session across
//! `execute()` calls so interactive snippets can build on each other.

use ahash::AHashMap;

use crate::{eval::Interp, io::ConsoleWriter, parse, repl_error::ReplError, value::Value};

/// A persistent session that executes snippets against accumulated bindings.
///
/// Each `execute()` call parses and runs a new snippet; assignments made by
/// one call are visible to the next. Parse failures leave the bindings
/// unchanged. Runtime failures keep any assignments made before the raise,
/// matching interactive-console expectations.
#[derive(Debug)]
pub struct ReplSession {
    /// Variable bindings accumulated across snippets.
    bindings: AHashMap<String, Value>,
    /// Name used in backtrace frames, e.g. `(konsol)`.
    script_name: String,
}

impl ReplSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(script_name: &str) -> Self {
        Self {
            bindings: AHashMap::new(),
            script_name: script_name.to_owned(),
        }
    }

    /// Parses and executes one snippet, routing output to `console`.
    ///
    /// Returns the value of the snippet's last statement (nil for an empty
    /// snippet).
    ///
    /// # Errors
    ///
    /// Returns `ReplError::Parse` when the snippet does not parse and
    /// `ReplError::Runtime` when it raises.
    pub fn execute(&mut self, code: &str, console: &mut impl ConsoleWriter) -> Result<Value, ReplError> {
        let program = parse::parse(code)?;
        Interp::new(&mut self.bindings, console, &self.script_name)
            .run(&program)
            .map_err(ReplError::Runtime)
    }

    /// Returns the current value of a named variable.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Lists defined variables and their type names, sorted by name.
    #[must_use]
    pub fn list_variables(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = self
            .bindings
            .iter()
            .map(|(name, value)| (name.clone(), value.type_name().to_owned()))
            .collect();
        vars.sort_unstable_by(|lhs, rhs| lhs.0.cmp(&rhs.0));
        vars
    }

    /// Returns the number of defined variables.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.bindings.len()
    }

    /// Returns the script name used in backtrace frames.
    #[must_use]
    pub fn script_name(&self) -> &str {
        &self.script_name
    }
}
