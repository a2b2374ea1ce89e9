//! Rendering targets for display frames.
use std::io::Write;

use crate::screen::Frame;

pub trait Panel: Send {
    fn draw(&mut self, frame: &Frame) -> std::io::Result<()>;
}

/// Writes one line per frame, e.g. to stdout.
pub struct ConsolePanel<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> ConsolePanel<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Panel for ConsolePanel<W> {
    fn draw(&mut self, frame: &Frame) -> std::io::Result<()> {
        writeln!(self.out, "{frame}")?;
        self.out.flush()
    }
}
