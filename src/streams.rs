//! Output streams for an interpreter session.
//!
//! Printed values and echoes go to `out`; runtime errors, syntax errors and
//! trace lines go to `diag`. Tests swap both for in-memory buffers.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// The standard output and diagnostic streams of a session
pub struct Streams {
    pub out: Box<dyn Write>,
    pub diag: Box<dyn Write>,
}

impl Streams {
    /// Process stdout and stderr
    pub fn stdio() -> Self {
        Streams {
            out: Box::new(io::stdout()),
            diag: Box::new(io::stderr()),
        }
    }

    /// In-memory streams, plus a handle for reading back what was written
    pub fn captured() -> (Self, Capture) {
        let out = SharedBuffer::default();
        let diag = SharedBuffer::default();
        let capture = Capture {
            out: out.clone(),
            diag: diag.clone(),
        };
        (
            Streams {
                out: Box::new(out),
                diag: Box::new(diag),
            },
            capture,
        )
    }

    /// Flush standard output before a diagnostic so the two interleave in order
    pub fn flush_out(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl std::fmt::Debug for Streams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Streams(..)")
    }
}

/// A clonable in-memory writer
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read side of [`Streams::captured`]
#[derive(Clone)]
pub struct Capture {
    out: SharedBuffer,
    diag: SharedBuffer,
}

impl Capture {
    pub fn out(&self) -> String {
        self.out.contents()
    }

    pub fn diag(&self) -> String {
        self.diag.contents()
    }

    /// Take both buffers' contents, leaving them empty
    pub fn take(&self) -> (String, String) {
        let taken = (self.out.contents(), self.diag.contents());
        self.out.clear();
        self.diag.clear();
        taken
    }
}
