//! Operator-facing output.
//!
//! A [`Console`] is created once by the binary and handed to each engine. It
//! owns the output sink and the verbosity setting, so nothing reads a global
//! flag.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

pub struct Console {
  verbose: bool,
  out: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for Console {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Console")
      .field("verbose", &self.verbose)
      .finish_non_exhaustive()
  }
}

impl Console {
  pub fn stdout(verbose: bool) -> Self {
    Self::with_writer(verbose, io::stdout())
  }

  pub fn with_writer(verbose: bool, writer: impl Write + Send + 'static) -> Self {
    Self {
      verbose,
      out: Mutex::new(Box::new(writer)),
    }
  }

  /// A console writing into memory, plus a handle to read what was written.
  pub fn captured(verbose: bool) -> (Self, Transcript) {
    let transcript = Transcript::default();
    (Self::with_writer(verbose, transcript.clone()), transcript)
  }

  pub fn is_verbose(&self) -> bool {
    self.verbose
  }

  /// Writes a line regardless of verbosity.
  pub fn line(&self, message: impl Display) {
    let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
    // Output is best effort; a closed stdout must not fail the batch.
    let _ = writeln!(out, "{message}");
    let _ = out.flush();
  }

  /// Writes `text` exactly as given.
  pub fn raw(&self, text: &str) {
    let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = out.write_all(text.as_bytes());
    let _ = out.flush();
  }

  /// Writes a line only in verbose mode.
  pub fn detail(&self, message: impl Display) {
    if self.verbose {
      self.line(message);
    }
  }

  pub fn success(&self, path: &str) {
    self.line(format_args!("  ✓ {path}"));
  }

  pub fn failure(&self, path: &str, error: impl Display) {
    self.line(format_args!("  ✗ {path}: {error}"));
  }
}

/// Shared in-memory buffer behind [`Console::captured`].
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<u8>>>);

impl Transcript {
  pub fn contents(&self) -> String {
    let buffer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&buffer).into_owned()
  }
}

impl Write for Transcript {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self
      .0
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}
