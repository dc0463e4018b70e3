//! Deleting every parameter under a namespace.
//!
//! The paranoid lock is checked before anything touches the store. The
//! namespace is then listed in full, and unless forced the operator must type
//! `yes` and then the namespace itself before any delete is dispatched.
//! Deletes share the sync pool: three in flight, staggered, and failures are
//! collected per parameter.

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

use crate::confirm::Confirmer;
use crate::console::Console;
use crate::pool::{BoundedPool, ItemResult, tally};
use crate::store::{FatalError, ParameterStore, StoreError, list_all};

const AFFIRMATIVE: &str = "yes";

/// Outcome of one parameter delete.
pub type DeleteResult = ItemResult;

/// Configuration options for a purge.
#[derive(Debug, Clone, Default)]
pub struct PurgeOptions {
  /// Namespace to empty.
  pub namespace: Option<String>,
  /// Standing lock that refuses every purge.
  pub paranoid: bool,
  /// Skip the confirmation prompts.
  pub force: bool,
}

impl PurgeOptions {
  /// Checks the paranoid lock and the namespace without touching a store.
  pub fn validate(&self) -> Result<(), PurgeError> {
    if self.paranoid {
      #[cfg(feature = "tracing")]
      warn!("Purge refused by paranoid lock");
      return Err(PurgeError::Paranoid);
    }
    match self.namespace.as_deref() {
      Some(ns) if !ns.trim().is_empty() => Ok(()),
      _ => Err(PurgeError::NamespaceRequired),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
  /// One result per listed parameter, in listing order.
  pub results: Vec<DeleteResult>,
}

impl PurgeReport {
  pub fn deleted(&self) -> usize {
    tally(&self.results).0
  }

  pub fn failed(&self) -> usize {
    tally(&self.results).1
  }

  pub fn has_failures(&self) -> bool {
    self.failed() > 0
  }

  pub fn failures(&self) -> impl Iterator<Item = &DeleteResult> {
    self.results.iter().filter(|r| !r.success)
  }
}

/// How a purge ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeOutcome {
  /// The namespace was already empty.
  NothingToDelete,
  /// The operator declined a confirmation.
  Cancelled,
  Completed(PurgeReport),
}

impl PurgeOutcome {
  pub fn has_failures(&self) -> bool {
    matches!(self, PurgeOutcome::Completed(report) if report.has_failures())
  }
}

/// Empties namespaces in a [`ParameterStore`].
pub struct PurgeEngine<'a> {
  store: &'a dyn ParameterStore,
  confirmer: &'a dyn Confirmer,
  console: &'a Console,
  pool: BoundedPool,
}

impl<'a> PurgeEngine<'a> {
  pub fn new(
    store: &'a dyn ParameterStore,
    confirmer: &'a dyn Confirmer,
    console: &'a Console,
  ) -> Self {
    Self {
      store,
      confirmer,
      console,
      pool: BoundedPool::default(),
    }
  }

  pub async fn purge(&self, options: PurgeOptions) -> Result<PurgeOutcome, PurgeError> {
    options.validate()?;
    let PurgeOptions { namespace, force, .. } = options;
    let namespace = namespace.unwrap_or_default();

    #[cfg(feature = "tracing")]
    info!(%namespace, force, "Starting purge");

    let prefix = match namespace.trim_end_matches('/') {
      "" => "/",
      trimmed => trimmed,
    };
    let parameters = match list_all(self.store, prefix).await {
      Ok(parameters) => parameters,
      Err(error) => return Err(PurgeError::List(FatalError::triage(error)?)),
    };

    if parameters.is_empty() {
      self
        .console
        .line(format_args!("No parameters found under {namespace}"));
      return Ok(PurgeOutcome::NothingToDelete);
    }

    self.console.line(format_args!(
      "Found {} parameters under {namespace}:",
      parameters.len()
    ));
    for parameter in &parameters {
      self.console.line(format_args!("  {}", parameter.name));
    }

    if !force && !self.confirmed(&namespace, parameters.len())? {
      self.console.line("Purge cancelled, nothing was deleted");
      return Ok(PurgeOutcome::Cancelled);
    }

    #[cfg(feature = "tracing")]
    debug!(count = parameters.len(), "Dispatching deletes");

    let names: Vec<&str> = parameters.iter().map(|p| p.name.as_str()).collect();
    let results = self.pool.run(names, |name| self.delete(name)).await?;

    let report = PurgeReport { results };
    self.summarize(&report);

    Ok(PurgeOutcome::Completed(report))
  }

  fn confirmed(&self, namespace: &str, count: usize) -> Result<bool, PurgeError> {
    let first = format!(
      "This permanently deletes {count} parameters under {namespace}. Type '{AFFIRMATIVE}' to continue: "
    );
    if !self.confirmer.confirm(&first, AFFIRMATIVE).map_err(PurgeError::Prompt)? {
      return Ok(false);
    }

    self
      .confirmer
      .confirm("Type the namespace to confirm: ", namespace)
      .map_err(PurgeError::Prompt)
  }

  async fn delete(&self, name: &str) -> Result<DeleteResult, FatalError> {
    self.console.detail(format_args!("  delete {name}"));

    match self.store.delete(name).await {
      Ok(()) => {
        self.console.success(name);
        Ok(DeleteResult::succeeded(name))
      }
      Err(error) => {
        let error = FatalError::triage(error)?;

        #[cfg(feature = "tracing")]
        warn!(path = %name, %error, "Parameter delete failed");

        self.console.failure(name, &error);
        Ok(DeleteResult::failed(name, error.to_string()))
      }
    }
  }

  fn summarize(&self, report: &PurgeReport) {
    let (deleted, failed) = tally(&report.results);
    if failed == 0 {
      self
        .console
        .line(format_args!("Deleted {deleted} parameters"));
      return;
    }

    self.console.line(format_args!(
      "Deleted {deleted} of {} parameters, {failed} failed:",
      report.results.len()
    ));
    for failure in report.failures() {
      self.console.failure(
        &failure.parameter,
        failure.error.as_deref().unwrap_or("unknown error"),
      );
    }
  }
}

/// Errors that end a purge.
#[derive(Debug, thiserror::Error)]
pub enum PurgeError {
  /// The paranoid lock is set
  #[error("Purge refused: paranoid mode is enabled")]
  Paranoid,
  /// No namespace was given
  #[error("A namespace is required")]
  NamespaceRequired,
  /// Listing the namespace failed
  #[error("Failed to list parameters: {0}")]
  List(StoreError),
  /// Reading a confirmation failed
  #[error("Failed to read confirmation: {0}")]
  Prompt(std::io::Error),
  /// The store rejected the run as a whole
  #[error(transparent)]
  Fatal(#[from] FatalError),
}
