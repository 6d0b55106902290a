//! Diagnostics context
//!
//! `Diag` carries the verbosity level and the output stream that runner
//! diagnostics (traced commands, captured stderr, diffs) are written to.
//! It is passed in at construction instead of living in a global, so two
//! script scopes running on different workers never share a sink.

use std::fmt;
use std::io::{self, Write};

pub struct Diag {
    verbosity: u8,
    sink: Box<dyn Write + Send>,
}

impl Diag {
    pub fn new(verbosity: u8, sink: Box<dyn Write + Send>) -> Self {
        Self { verbosity, sink }
    }

    /// Diagnostics to standard error, the usual configuration.
    pub fn stderr(verbosity: u8) -> Self {
        Self::new(verbosity, Box::new(io::stderr()))
    }

    /// Discards everything; verbosity 0.
    pub fn silent() -> Self {
        Self::new(0, Box::new(io::sink()))
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Write a line when the verbosity is at least `level`.
    pub fn text(&mut self, level: u8, msg: &str) {
        if self.verbosity >= level {
            let _ = writeln!(self.sink, "{}", msg);
            let _ = self.sink.flush();
        }
    }

    /// Write raw bytes unconditionally (captured stderr, diff output).
    pub fn raw(&mut self, bytes: &[u8]) {
        let _ = self.sink.write_all(bytes);
        let _ = self.sink.flush();
    }

    pub(crate) fn writer(&mut self) -> &mut dyn Write {
        &mut *self.sink
    }
}

impl Default for Diag {
    fn default() -> Self {
        Self::stderr(1)
    }
}

impl fmt::Debug for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diag")
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_text_gated_by_verbosity() {
        let buf = Shared::default();
        let mut d = Diag::new(1, Box::new(buf.clone()));
        d.text(1, "shown");
        d.text(2, "hidden");
        d.raw(b"raw");
        assert_eq!(&*buf.0.lock().unwrap(), b"shown\nraw");
    }
}
