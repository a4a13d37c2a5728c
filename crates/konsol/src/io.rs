use std::io::{self, Write as _};

/// Trait for the output streams visible to evaluated snippets.
///
/// `puts`/`print`/`p` route through [`write_stdout`](Self::write_stdout) and
/// `warn` routes through [`write_stderr`](Self::write_stderr). Implement
/// this trait to capture or redirect snippet output; the evaluation wrapper
/// installs a [`CollectConsole`] for the duration of each evaluation so the
/// process-global streams are never touched.
pub trait ConsoleWriter {
    /// Writes already-formatted text to the snippet's standard output.
    fn write_stdout(&mut self, text: &str);

    /// Writes already-formatted text to the snippet's standard error.
    fn write_stderr(&mut self, text: &str);
}

/// Default `ConsoleWriter` that writes through to the process streams.
///
/// Write errors are ignored; an interactive console has nowhere better to
/// report them.
#[derive(Debug, Default)]
pub struct StdConsole;

impl ConsoleWriter for StdConsole {
    fn write_stdout(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn write_stderr(&mut self, text: &str) {
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }
}

/// A `ConsoleWriter` that collects both streams into growing buffers.
#[derive(Debug, Default)]
pub struct CollectConsole {
    stdout: String,
    stderr: String,
}

impl CollectConsole {
    /// Creates a collector with empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected standard output.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Returns the collected standard error.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Consumes the collector and returns `(stdout, stderr)`.
    #[must_use]
    pub fn into_parts(self) -> (String, String) {
        (self.stdout, self.stderr)
    }
}

impl ConsoleWriter for CollectConsole {
    fn write_stdout(&mut self, text: &str) {
        self.stdout.push_str(text);
    }

    fn write_stderr(&mut self, text: &str) {
        self.stderr.push_str(text);
    }
}

/// `ConsoleWriter` that discards all output.
#[derive(Debug, Default)]
pub struct NoConsole;

impl ConsoleWriter for NoConsole {
    fn write_stdout(&mut self, _text: &str) {}

    fn write_stderr(&mut self, _text: &str) {}
}
