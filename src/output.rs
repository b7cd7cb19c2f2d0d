use std::io::{self, IsTerminal, Write};

use tracing::{debug, warn};

use crate::chat::OutputSink;
use crate::render::MarkdownFormatter;

/// Output sink. Each emitted block ends with a newline. Blocks are rendered
/// as markdown only when a formatter is attached.
pub struct TerminalOutput<W> {
    out: W,
    formatter: Option<MarkdownFormatter>,
}

impl TerminalOutput<io::Stdout> {
    /// Renders markdown when stdout is a terminal, plain text otherwise.
    pub fn stdout() -> Self {
        let stdout = io::stdout();
        let is_terminal = stdout.is_terminal();
        Self::for_terminal(stdout, is_terminal)
    }
}

impl<W: Write> TerminalOutput<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            formatter: None,
        }
    }

    pub fn for_terminal(out: W, is_terminal: bool) -> Self {
        debug!(markdown = is_terminal, "configured terminal output");
        Self {
            out,
            formatter: is_terminal.then(MarkdownFormatter::new),
        }
    }

    pub fn write_block(&mut self, text: &str) -> io::Result<()> {
        match &self.formatter {
            Some(formatter) => self.out.write_all(formatter.render(text).as_bytes())?,
            None => self.out.write_all(text.as_bytes())?,
        }
        if !text.ends_with('\n') {
            self.out.write_all(b"\n")?;
        }
        self.out.flush()
    }
}

impl<W: Write> OutputSink for TerminalOutput<W> {
    fn emit(&mut self, text: &str) {
        if let Err(err) = self.write_block(text) {
            warn!(error = %err, "failed to write output");
        }
    }
}
