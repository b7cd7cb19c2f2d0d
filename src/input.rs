use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::chat::{LineSource, NextLine};

const TTY_PATH: &str = "/dev/tty";
const PROMPT: &str = "> ";

/// Reads the whole piped input. Every line, including the last, ends with
/// `\n` in the result. Invalid UTF-8 is replaced rather than rejected.
pub fn read_piped_input(reader: impl BufRead) -> io::Result<String> {
    let mut input = String::new();
    for line in reader.split(b'\n') {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        input.push_str(&String::from_utf8_lossy(&line));
        input.push('\n');
    }
    Ok(input)
}

/// Interactive lines read from the controlling terminal, since stdin is
/// usually the pipe that carried the input.
pub struct TerminalLines<R, W> {
    reader: R,
    prompt_out: W,
}

impl TerminalLines<BufReader<File>, io::Stderr> {
    pub fn open() -> io::Result<Self> {
        Self::open_path(Path::new(TTY_PATH))
    }

    fn open_path(path: &Path) -> io::Result<Self> {
        let tty = File::open(path)?;
        Ok(Self::new(BufReader::new(tty), io::stderr()))
    }
}

impl<R, W> TerminalLines<R, W>
where
    R: BufRead,
    W: Write,
{
    pub fn new(reader: R, prompt_out: W) -> Self {
        Self { reader, prompt_out }
    }
}

impl<R, W> LineSource for TerminalLines<R, W>
where
    R: BufRead,
    W: Write,
{
    fn next_line(&mut self) -> NextLine {
        if let Err(err) = write!(self.prompt_out, "{PROMPT}").and_then(|_| self.prompt_out.flush()) {
            return NextLine::Failed(err);
        }

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => NextLine::Failed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "interactive input closed before /quit",
            )),
            Ok(_) => NextLine::from_text(&line),
            Err(err) => NextLine::Failed(err),
        }
    }
}
