//! Pushing env values into a namespace.
//!
//! # Sync Logic
//!
//! A sync run moves through these phases:
//! 1. Validate the options: a namespace and exactly one value source.
//! 2. Parse the source. No variables means there is nothing to do.
//! 3. Plan one [`ParameterRecord`] per variable: classify it with
//!    [`is_secret`], map it with [`to_path`], and always overwrite.
//! 4. In dry-run mode, print the plan and stop.
//! 5. Otherwise dispatch the writes through a [`BoundedPool`]. Ordinary
//!    failures are recorded per record; a fatal failure ends the run with
//!    [`SyncError::Fatal`].
//!
//! Failed writes are not retried. Writes are upserts, so running the same
//! sync again is the retry.
//!
//! # Examples
//!
//! ```rust,no_run
//! use paramsync::console::Console;
//! use paramsync::memory::MemoryStore;
//! use paramsync::sync::{SyncEngine, SyncOptions};
//!
//! # async fn run() -> Result<(), paramsync::sync::SyncError> {
//! let store = MemoryStore::new();
//! let console = Console::stdout(false);
//! let options = SyncOptions {
//!     namespace: Some("/prod/api".to_string()),
//!     text: Some("NODE_ENV=production".to_string()),
//!     ..SyncOptions::default()
//! };
//!
//! let report = SyncEngine::new(&store, &console).sync(options).await?;
//! assert!(!report.has_failures());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

use crate::classify::is_secret;
use crate::console::Console;
use crate::parse::{EnvMap, parse};
use crate::path::to_path;
use crate::pool::{BoundedPool, ItemResult, tally};
use crate::store::{FatalError, ParameterRecord, ParameterStore, ParameterType};

/// Description attached to every written parameter.
pub const DESCRIPTION: &str = "Managed by paramsync";

const MASK: &str = "********";

/// Outcome of one parameter write.
pub type SyncResult = ItemResult;

/// Configuration options for a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
  /// Namespace the parameters are written under.
  pub namespace: Option<String>,
  /// Path to the `.env` file to push.
  pub file: Option<PathBuf>,
  /// Raw `.env` content to push instead of a file.
  pub text: Option<String>,
  /// Store every value encrypted.
  pub force_all_secret: bool,
  /// Print the plan without writing anything.
  pub dry_run: bool,
}

/// Where the env content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
  File(PathBuf),
  Text(String),
}

impl SyncOptions {
  /// Checks the options that need no I/O: a namespace and exactly one source.
  pub fn validate(&self) -> Result<(), SyncError> {
    if !self.namespace.as_deref().is_some_and(|ns| !ns.trim().is_empty()) {
      return Err(SyncError::NamespaceRequired);
    }
    match (&self.file, &self.text) {
      (Some(_), None) | (None, Some(_)) => Ok(()),
      (None, None) => Err(SyncError::SourceRequired),
      (Some(_), Some(_)) => Err(SyncError::ConflictingSources),
    }
  }
}

impl ValueSource {
  /// Accepts exactly one of `file` and `text`.
  pub fn from_parts(file: Option<PathBuf>, text: Option<String>) -> Result<Self, SyncError> {
    match (file, text) {
      (Some(path), None) => Ok(ValueSource::File(path)),
      (None, Some(text)) => Ok(ValueSource::Text(text)),
      (None, None) => Err(SyncError::SourceRequired),
      (Some(_), Some(_)) => Err(SyncError::ConflictingSources),
    }
  }

  fn read(self) -> Result<String, SyncError> {
    match self {
      ValueSource::File(path) => {
        std::fs::read_to_string(&path).map_err(|e| SyncError::ReadSource(path, e))
      }
      ValueSource::Text(text) => Ok(text),
    }
  }
}

impl fmt::Display for ValueSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValueSource::File(path) => write!(f, "{}", path.display()),
      ValueSource::Text(_) => write!(f, "input"),
    }
  }
}

/// What a sync run did, or would do in dry-run mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Planned writes, in file order.
  pub records: Vec<ParameterRecord>,
  /// One result per record, in the same order. Empty for dry runs.
  pub results: Vec<SyncResult>,
  pub dry_run: bool,
}

impl SyncReport {
  pub fn succeeded(&self) -> usize {
    tally(&self.results).0
  }

  pub fn failed(&self) -> usize {
    tally(&self.results).1
  }

  pub fn has_failures(&self) -> bool {
    self.failed() > 0
  }

  pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
    self.results.iter().filter(|r| !r.success)
  }
}

/// Builds the write plan for parsed variables.
pub fn plan(namespace: &str, entries: &EnvMap, force_all_secret: bool) -> Vec<ParameterRecord> {
  entries
    .iter()
    .map(|(key, value)| ParameterRecord {
      path: to_path(namespace, key),
      value: value.clone(),
      kind: ParameterType::from_secret(is_secret(key, value, force_all_secret)),
      overwrite: true,
      description: DESCRIPTION.to_string(),
    })
    .collect()
}

/// Writes env files into a [`ParameterStore`].
pub struct SyncEngine<'a> {
  store: &'a dyn ParameterStore,
  console: &'a Console,
  pool: BoundedPool,
}

impl<'a> SyncEngine<'a> {
  pub fn new(store: &'a dyn ParameterStore, console: &'a Console) -> Self {
    Self {
      store,
      console,
      pool: BoundedPool::default(),
    }
  }

  /// Runs a sync with the given options.
  ///
  /// Per-record failures are reported in the returned [`SyncReport`]; only
  /// validation problems and fatal store failures are errors.
  pub async fn sync(&self, options: SyncOptions) -> Result<SyncReport, SyncError> {
    #[cfg(feature = "tracing")]
    info!("Starting sync");

    options.validate()?;
    let SyncOptions {
      namespace,
      file,
      text,
      force_all_secret,
      dry_run,
    } = options;

    let namespace = namespace.unwrap_or_default();
    let source = ValueSource::from_parts(file, text)?;

    #[cfg(feature = "tracing")]
    debug!(%namespace, %source, force_all_secret, dry_run, "Resolved sync options");

    let source_name = source.to_string();
    let entries = parse(&source.read()?);
    if entries.is_empty() {
      self
        .console
        .line(format_args!("No variables found in {source_name}, nothing to sync"));
      return Ok(SyncReport {
        dry_run,
        ..SyncReport::default()
      });
    }

    let records = plan(&namespace, &entries, force_all_secret);

    if dry_run {
      self.preview(&namespace, &records);
      return Ok(SyncReport {
        records,
        results: Vec::new(),
        dry_run: true,
      });
    }

    self.console.line(format_args!(
      "Syncing {} parameters from {source_name} to {namespace}",
      records.len()
    ));

    let results = self
      .pool
      .run(records.iter().collect(), |record| self.put(record))
      .await?;

    let report = SyncReport {
      records,
      results,
      dry_run: false,
    };
    self.summarize(&report);

    #[cfg(feature = "tracing")]
    info!(
      succeeded = report.succeeded(),
      failed = report.failed(),
      "Sync completed"
    );

    Ok(report)
  }

  async fn put(&self, record: &ParameterRecord) -> Result<SyncResult, FatalError> {
    let value = if record.kind.is_secret() {
      MASK
    } else {
      record.value.as_str()
    };
    self
      .console
      .detail(format_args!("  put {} ({}) = {value}", record.path, record.kind));

    match self.store.put(record).await {
      Ok(()) => {
        self.console.success(&record.path);
        Ok(SyncResult::succeeded(&record.path))
      }
      Err(error) => {
        let error = FatalError::triage(error)?;

        #[cfg(feature = "tracing")]
        warn!(path = %record.path, %error, "Parameter write failed");

        self.console.failure(&record.path, &error);
        Ok(SyncResult::failed(&record.path, error.to_string()))
      }
    }
  }

  fn preview(&self, namespace: &str, records: &[ParameterRecord]) {
    self.console.line(format_args!(
      "Dry run: {} parameters would be written to {namespace}",
      records.len()
    ));
    for record in records {
      let value = if record.kind.is_secret() && !self.console.is_verbose() {
        MASK
      } else {
        record.value.as_str()
      };
      self
        .console
        .line(format_args!("  {} ({}) = {value}", record.path, record.kind));
    }
  }

  fn summarize(&self, report: &SyncReport) {
    let (succeeded, failed) = tally(&report.results);
    if failed == 0 {
      self
        .console
        .line(format_args!("Synced {succeeded} parameters"));
      return;
    }

    self.console.line(format_args!(
      "Synced {succeeded} of {} parameters, {failed} failed:",
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

/// Errors that end a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  /// No namespace was given
  #[error("A namespace is required")]
  NamespaceRequired,
  /// Neither a file nor input text was given
  #[error("A value source is required: pass a file or input text")]
  SourceRequired,
  /// Both a file and input text were given
  #[error("Pass either a file or input text, not both")]
  ConflictingSources,
  /// Error reading the env file
  #[error("Failed to read {0:?}: {1}")]
  ReadSource(PathBuf, std::io::Error),
  /// The store rejected the run as a whole
  #[error(transparent)]
  Fatal(#[from] FatalError),
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::MemoryStore;
  use crate::store::{FatalKind, StoreError};
  use std::time::Duration;

  fn text_options(namespace: &str, text: &str) -> SyncOptions {
    SyncOptions {
      namespace: Some(namespace.to_string()),
      text: Some(text.to_string()),
      ..SyncOptions::default()
    }
  }

  #[test]
  fn test_plan_classifies_and_maps() {
    let entries = parse("NODE_ENV=production\nAPI_SECRET=\"abc123def456ghi789jkl\"");
    let records = plan("/test/app", &entries, false);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].path, "/test/app/NODE_ENV");
    assert_eq!(records[0].kind, ParameterType::Plain);
    assert_eq!(records[1].path, "/test/app/API_SECRET");
    assert_eq!(records[1].value, "abc123def456ghi789jkl");
    assert_eq!(records[1].kind, ParameterType::Secret);
    assert!(records.iter().all(|r| r.overwrite));
    assert!(records.iter().all(|r| r.description == DESCRIPTION));
  }

  #[test]
  fn test_plan_force_all_secret() {
    let entries = parse("NODE_ENV=production\nPORT=80");
    let records = plan("/ns/", &entries, true);

    assert!(records.iter().all(|r| r.kind == ParameterType::Secret));
    assert_eq!(records[1].path, "/ns/PORT");
  }

  #[test]
  fn test_value_source_requires_exactly_one() {
    assert!(matches!(
      ValueSource::from_parts(None, None),
      Err(SyncError::SourceRequired)
    ));
    assert!(matches!(
      ValueSource::from_parts(Some(PathBuf::from(".env")), Some("A=1".into())),
      Err(SyncError::ConflictingSources)
    ));
    assert_eq!(
      ValueSource::from_parts(None, Some("A=1".into())).unwrap(),
      ValueSource::Text("A=1".into())
    );
  }

  #[tokio::test]
  async fn test_namespace_required() {
    let store = MemoryStore::new();
    let (console, _) = Console::captured(false);
    let engine = SyncEngine::new(&store, &console);

    for namespace in [None, Some("   ".to_string())] {
      let options = SyncOptions {
        namespace,
        text: Some("A=1".to_string()),
        ..SyncOptions::default()
      };
      let result = engine.sync(options).await;
      assert!(matches!(result, Err(SyncError::NamespaceRequired)));
    }
    assert_eq!(store.put_calls(), 0);
  }

  #[tokio::test]
  async fn test_missing_file() {
    let store = MemoryStore::new();
    let (console, _) = Console::captured(false);
    let options = SyncOptions {
      namespace: Some("/ns".to_string()),
      file: Some(PathBuf::from("definitely/not/here/.env")),
      ..SyncOptions::default()
    };

    let result = SyncEngine::new(&store, &console).sync(options).await;

    match result.unwrap_err() {
      SyncError::ReadSource(path, _) => {
        assert_eq!(path, PathBuf::from("definitely/not/here/.env"));
      }
      other => panic!("Expected ReadSource error, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_empty_input_is_a_no_op() {
    let store = MemoryStore::new();
    let (console, out) = Console::captured(false);

    let report = SyncEngine::new(&store, &console)
      .sync(text_options("/ns", "# only a comment\n\n"))
      .await
      .unwrap();

    assert!(report.records.is_empty());
    assert!(!report.has_failures());
    assert_eq!(store.put_calls(), 0);
    assert!(out.contents().contains("nothing to sync"));
  }

  #[tokio::test]
  async fn test_dry_run_writes_nothing() {
    let store = MemoryStore::new();
    let (console, out) = Console::captured(false);
    let mut options = text_options("/test/app", "NODE_ENV=production\nAPI_SECRET=hunter2");
    options.dry_run = true;

    let report = SyncEngine::new(&store, &console)
      .sync(options)
      .await
      .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.records.len(), 2);
    assert!(report.results.is_empty());
    assert_eq!(store.put_calls(), 0);

    let printed = out.contents();
    assert!(printed.contains("/test/app/NODE_ENV (String) = production"));
    assert!(printed.contains("/test/app/API_SECRET (SecureString) = ********"));
    assert!(!printed.contains("hunter2"));
  }

  #[tokio::test]
  async fn test_verbose_dry_run_shows_secret_values() {
    let store = MemoryStore::new();
    let (console, out) = Console::captured(true);
    let mut options = text_options("/ns", "API_SECRET=hunter2");
    options.dry_run = true;

    SyncEngine::new(&store, &console)
      .sync(options)
      .await
      .unwrap();

    assert!(out.contents().contains("/ns/API_SECRET (SecureString) = hunter2"));
  }

  #[test]
  fn test_validate_needs_no_store() {
    assert!(text_options("/ns", "A=1").validate().is_ok());
    assert!(matches!(
      text_options(" ", "A=1").validate(),
      Err(SyncError::NamespaceRequired)
    ));

    let mut options = text_options("/ns", "A=1");
    options.text = None;
    assert!(matches!(options.validate(), Err(SyncError::SourceRequired)));
    options.text = Some("A=1".to_string());
    options.file = Some(PathBuf::from(".env"));
    assert!(matches!(
      options.validate(),
      Err(SyncError::ConflictingSources)
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_verbose_writes_print_detail_lines() {
    let text = "NODE_ENV=production\nAPI_SECRET=hunter2";

    let store = MemoryStore::new();
    let (console, out) = Console::captured(true);
    SyncEngine::new(&store, &console)
      .sync(text_options("/ns", text))
      .await
      .unwrap();
    let printed = out.contents();
    assert!(printed.contains("  put /ns/NODE_ENV (String) = production"));
    assert!(printed.contains("  put /ns/API_SECRET (SecureString) = ********"));
    assert!(!printed.contains("hunter2"));

    let store = MemoryStore::new();
    let (console, out) = Console::captured(false);
    SyncEngine::new(&store, &console)
      .sync(text_options("/ns", text))
      .await
      .unwrap();
    let printed = out.contents();
    assert!(!printed.contains("  put "));
    assert!(printed.contains("  ✓ /ns/NODE_ENV"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_writes_all_records() {
    let store = MemoryStore::new();
    let (console, _) = Console::captured(false);

    let report = SyncEngine::new(&store, &console)
      .sync(text_options(
        "/test/app/",
        "NODE_ENV=production\nAPI_SECRET=\"abc123def456ghi789jkl\"",
      ))
      .await
      .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert_eq!(store.get("/test/app/NODE_ENV").as_deref(), Some("production"));
    assert_eq!(store.kind("/test/app/NODE_ENV"), Some(ParameterType::Plain));
    assert_eq!(store.kind("/test/app/API_SECRET"), Some(ParameterType::Secret));
  }

  #[tokio::test(start_paused = true)]
  async fn test_per_item_failures_do_not_stop_the_batch() {
    let store = MemoryStore::new();
    store.fail_on(
      "/ns/B",
      StoreError::with_code("ValidationException", "value too long"),
    );
    let (console, out) = Console::captured(false);

    let report = SyncEngine::new(&store, &console)
      .sync(text_options("/ns", "A=1\nB=2\nC=3\nD=4"))
      .await
      .unwrap();

    assert_eq!(store.put_calls(), 4);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 1);
    assert_eq!(
      report.results[1],
      SyncResult::failed("/ns/B", "value too long")
    );
    assert!(report.results[0].success && report.results[2].success);
    assert!(out.contents().contains("Synced 3 of 4 parameters, 1 failed:"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_fatal_failure_aborts() {
    let store = MemoryStore::new();
    store.fail_on(
      "/ns/K0",
      StoreError::with_code("ExpiredTokenException", "The security token is expired"),
    );
    let (console, _) = Console::captured(false);
    let text: String = (0..10).map(|i| format!("K{i}=v\n")).collect();

    let result = SyncEngine::new(&store, &console)
      .sync(text_options("/ns", &text))
      .await;

    match result.unwrap_err() {
      SyncError::Fatal(fatal) => assert_eq!(fatal.kind, FatalKind::TokenExpired),
      other => panic!("Expected fatal error, got {other:?}"),
    }
    assert_eq!(store.put_calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrency_bound() {
    let store = MemoryStore::new().with_latency(Duration::from_millis(200));
    let (console, _) = Console::captured(false);
    let text: String = (0..25).map(|i| format!("K{i}=v{i}\n")).collect();

    let report = SyncEngine::new(&store, &console)
      .sync(text_options("/ns", &text))
      .await
      .unwrap();

    assert_eq!(report.succeeded(), 25);
    assert_eq!(store.max_in_flight(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_sync_is_idempotent() {
    let store = MemoryStore::new();
    let (console, _) = Console::captured(false);
    let engine = SyncEngine::new(&store, &console);
    let text = "A=1\nDB_PASSWORD=secret\nC=3";

    engine.sync(text_options("/ns", text)).await.unwrap();
    let first: Vec<_> = store
      .names()
      .into_iter()
      .map(|n| (store.get(&n), store.kind(&n), n))
      .collect();

    engine.sync(text_options("/ns", text)).await.unwrap();
    let second: Vec<_> = store
      .names()
      .into_iter()
      .map(|n| (store.get(&n), store.kind(&n), n))
      .collect();

    assert_eq!(first, second);
    assert_eq!(store.len(), 3);
  }
}
