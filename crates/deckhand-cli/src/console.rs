use std::{
    io::{self, BufRead, Write},
    path::Path,
};

use deckhand_acquire::ConfirmCleanup;
use deckhand_util::parse_confirmation;

/// Line-oriented operator I/O. `None` from a prompt means end of input.
pub(crate) struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, io::Stdout> {
    pub(crate) fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    pub(crate) fn into_output(self) -> W {
        self.output
    }

    pub(crate) fn say(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.output, "{}", text.as_ref());
    }

    pub(crate) fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label} ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Yes-by-default question; end of input also counts as yes.
    pub(crate) fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.prompt(&format!("{question} [Y/n]:"))?;
        Ok(answer.map_or(true, |a| parse_confirmation(&a)))
    }
}

impl<R: BufRead, W: Write> ConfirmCleanup for Console<R, W> {
    fn confirm_cleanup(&mut self, archive: &Path) -> bool {
        let question = format!("Delete {}?", archive.display());
        match self.confirm(&question) {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!("cleanup prompt failed, keeping archive: {err}");
                false
            }
        }
    }
}
