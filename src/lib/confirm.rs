//! Interactive confirmation.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::{Mutex, PoisonError};

/// Asks the operator a question and reads one line of answer.
pub trait Confirmer: Send + Sync {
  fn ask(&self, prompt: &str) -> io::Result<String>;

  /// True when the trimmed answer is exactly `expected`.
  fn confirm(&self, prompt: &str, expected: &str) -> io::Result<bool> {
    Ok(self.ask(prompt)?.trim() == expected)
  }
}

/// Prompts on stderr and reads answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
  fn ask(&self, prompt: &str) -> io::Result<String> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    // Blocking read on the runtime thread; prompts run before any batch is in flight.
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer)
  }
}

/// Replays canned answers; runs out as an empty answer.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
  answers: Mutex<VecDeque<String>>,
  prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
  pub fn new<I, S>(answers: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
      prompts: Mutex::default(),
    }
  }

  /// Prompts shown so far.
  pub fn prompts(&self) -> Vec<String> {
    self
      .prompts
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}

impl Confirmer for ScriptedConfirmer {
  fn ask(&self, prompt: &str) -> io::Result<String> {
    self
      .prompts
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(prompt.to_string());

    Ok(
      self
        .answers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
        .unwrap_or_default(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_confirm_trims_answer() {
    let confirmer = ScriptedConfirmer::new(["yes\n", "  /ns/app  ", "Yes"]);

    assert!(confirmer.confirm("first? ", "yes").unwrap());
    assert!(confirmer.confirm("second? ", "/ns/app").unwrap());
    assert!(!confirmer.confirm("third? ", "yes").unwrap());
    assert_eq!(confirmer.prompts(), vec!["first? ", "second? ", "third? "]);
  }

  #[test]
  fn test_exhausted_script_declines() {
    let confirmer = ScriptedConfirmer::new(Vec::<String>::new());
    assert!(!confirmer.confirm("continue? ", "yes").unwrap());
  }
}
