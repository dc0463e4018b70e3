//! Pulling a namespace back into `.env` form.
//!
//! Every parameter under the namespace becomes one `KEY=VALUE` line, keyed by
//! the last segment of its path. Values are written bare when the parser would
//! read them back unchanged and double-quoted with escapes otherwise, so
//! `parse(&render(map)) == map`.

use std::borrow::Cow;
use std::path::PathBuf;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use crate::console::Console;
use crate::parse::{EnvMap, is_valid_key};
use crate::path::key_from_path;
use crate::store::{FatalError, ParameterStore, StoreError, list_all};

/// Configuration options for an export.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
  /// Namespace to read.
  pub namespace: Option<String>,
  /// File to write. Without one the content goes to the console.
  pub output: Option<PathBuf>,
}

impl ExportOptions {
  pub fn validate(&self) -> Result<(), ExportError> {
    match self.namespace.as_deref() {
      Some(ns) if !ns.trim().is_empty() => Ok(()),
      _ => Err(ExportError::NamespaceRequired),
    }
  }
}

/// Reads namespaces out of a [`ParameterStore`].
pub struct ExportEngine<'a> {
  store: &'a dyn ParameterStore,
  console: &'a Console,
}

impl<'a> ExportEngine<'a> {
  pub fn new(store: &'a dyn ParameterStore, console: &'a Console) -> Self {
    Self { store, console }
  }

  /// Lists the namespace, writes it out, and returns what was written.
  pub async fn export(&self, options: ExportOptions) -> Result<EnvMap, ExportError> {
    options.validate()?;
    let ExportOptions { namespace, output } = options;
    let namespace = namespace.unwrap_or_default();

    let prefix = match namespace.trim_end_matches('/') {
      "" => "/",
      trimmed => trimmed,
    };
    let parameters = match list_all(self.store, prefix).await {
      Ok(parameters) => parameters,
      Err(error) => return Err(ExportError::List(FatalError::triage(error)?)),
    };

    #[cfg(feature = "tracing")]
    debug!(count = parameters.len(), %namespace, "Listed parameters for export");

    let mut entries = EnvMap::with_capacity(parameters.len());
    for parameter in parameters {
      let key = key_from_path(&parameter.name);
      if !is_valid_key(key) {
        #[cfg(feature = "tracing")]
        warn!(path = %parameter.name, "Skipping parameter with unusable key");

        self.console.line(format_args!(
          "Skipping {}: {key:?} is not a valid variable name",
          parameter.name
        ));
        continue;
      }
      entries.insert(key.to_string(), parameter.value);
    }

    let content = render(&entries);
    match output {
      Some(path) => {
        std::fs::write(&path, &content).map_err(|e| ExportError::Write(path.clone(), e))?;
        self.console.line(format_args!(
          "Wrote {} variables from {namespace} to {}",
          entries.len(),
          path.display()
        ));
      }
      None => self.console.raw(&content),
    }

    Ok(entries)
  }
}

/// Renders variables as `.env` content, one line per variable.
pub fn render(entries: &EnvMap) -> String {
  let mut content = String::new();
  for (key, value) in entries {
    content.push_str(key);
    content.push('=');
    content.push_str(&quote(value));
    content.push('\n');
  }
  content
}

fn quote(value: &str) -> Cow<'_, str> {
  let bare = value.trim() == value
    && !value.starts_with(['"', '\'', '`'])
    && !value.contains(['\n', '\r', '\t']);
  if bare {
    return Cow::Borrowed(value);
  }

  let mut quoted = String::with_capacity(value.len() + 2);
  quoted.push('"');
  for c in value.chars() {
    match c {
      '\\' => quoted.push_str(r"\\"),
      '"' => quoted.push_str("\\\""),
      '\n' => quoted.push_str(r"\n"),
      '\r' => quoted.push_str(r"\r"),
      '\t' => quoted.push_str(r"\t"),
      c => quoted.push(c),
    }
  }
  quoted.push('"');
  Cow::Owned(quoted)
}

/// Errors that end an export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
  /// No namespace was given
  #[error("A namespace is required")]
  NamespaceRequired,
  /// Listing the namespace failed
  #[error("Failed to list parameters: {0}")]
  List(StoreError),
  /// Error writing the output file
  #[error("Failed to write {0:?}: {1}")]
  Write(PathBuf, std::io::Error),
  /// The store rejected the run as a whole
  #[error(transparent)]
  Fatal(#[from] FatalError),
}
