use std::io::Write;

use crate::stream::Renderer;

/// Streams the response to a terminal by writing only the part of the
/// accumulated text that has not been shown yet.
///
/// Each turn starts from nothing (`begin`). Within a turn, a render
/// whose text does not extend what was shown starts a new block.
pub struct TerminalRenderer<W: Write + Send> {
    out: W,
    shown: String,
}

impl TerminalRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shown: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_unseen(&mut self, accumulated: &str) -> std::io::Result<()> {
        if !accumulated.starts_with(self.shown.as_str()) {
            self.shown.clear();
            writeln!(self.out)?;
        }
        let unseen = &accumulated[self.shown.len()..];
        if unseen.is_empty() {
            return Ok(());
        }
        self.out.write_all(unseen.as_bytes())?;
        self.out.flush()?;
        self.shown.push_str(unseen);
        Ok(())
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn begin(&mut self) {
        self.shown.clear();
    }

    fn render(&mut self, accumulated: &str) {
        if let Err(e) = self.write_unseen(accumulated) {
            tracing::warn!(error = %e, "failed to write response text");
        }
    }
}
