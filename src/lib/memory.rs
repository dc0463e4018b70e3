//! In-memory [`ParameterStore`].
//!
//! Useful for tests and local experiments: it paginates like the real store,
//! can be told to fail on specific paths, and counts how many calls are in
//! flight at once.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::store::{
  ParameterPage, ParameterRecord, ParameterStore, ParameterType, StoreError, StoredParameter,
};

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Default)]
struct State {
  parameters: BTreeMap<String, (String, ParameterType)>,
  failures: HashMap<String, StoreError>,
  list_failure: Option<StoreError>,
}

#[derive(Debug)]
pub struct MemoryStore {
  state: Mutex<State>,
  page_size: usize,
  latency: Duration,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
  put_calls: AtomicUsize,
  delete_calls: AtomicUsize,
  list_calls: AtomicUsize,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(State::default()),
      page_size: DEFAULT_PAGE_SIZE,
      latency: Duration::ZERO,
      in_flight: AtomicUsize::new(0),
      max_in_flight: AtomicUsize::new(0),
      put_calls: AtomicUsize::new(0),
      delete_calls: AtomicUsize::new(0),
      list_calls: AtomicUsize::new(0),
    }
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  /// Every put and delete sleeps this long before completing.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
    self
      .state()
      .parameters
      .insert(name.into(), (value.into(), ParameterType::Plain));
  }

  /// Makes every put or delete of `name` fail with `error`.
  pub fn fail_on(&self, name: impl Into<String>, error: StoreError) {
    self.state().failures.insert(name.into(), error);
  }

  /// Makes every listing fail with `error`.
  pub fn fail_listing(&self, error: StoreError) {
    self.state().list_failure = Some(error);
  }

  pub fn get(&self, name: &str) -> Option<String> {
    self
      .state()
      .parameters
      .get(name)
      .map(|(value, _)| value.clone())
  }

  pub fn kind(&self, name: &str) -> Option<ParameterType> {
    self.state().parameters.get(name).map(|(_, kind)| *kind)
  }

  pub fn names(&self) -> Vec<String> {
    self.state().parameters.keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.state().parameters.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn put_calls(&self) -> usize {
    self.put_calls.load(Ordering::SeqCst)
  }

  pub fn delete_calls(&self) -> usize {
    self.delete_calls.load(Ordering::SeqCst)
  }

  pub fn list_calls(&self) -> usize {
    self.list_calls.load(Ordering::SeqCst)
  }

  /// Highest number of puts and deletes observed running at once.
  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  async fn call(&self, name: &str) -> Result<(), StoreError> {
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    let _guard = InFlight(&self.in_flight);

    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }

    match self.state().failures.get(name) {
      Some(error) => Err(error.clone()),
      None => Ok(()),
    }
  }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

#[async_trait]
impl ParameterStore for MemoryStore {
  async fn list(
    &self,
    prefix: &str,
    next_token: Option<String>,
  ) -> Result<ParameterPage, StoreError> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);

    let state = self.state();
    if let Some(error) = &state.list_failure {
      return Err(error.clone());
    }

    let offset = match next_token {
      Some(token) => token
        .parse::<usize>()
        .map_err(|_| StoreError::with_code("InvalidNextToken", "The next token is invalid"))?,
      None => 0,
    };

    let scope = format!("{}/", prefix.trim_end_matches('/'));
    let matching: Vec<_> = state
      .parameters
      .iter()
      .filter(|(name, _)| name.starts_with(&scope))
      .collect();

    let parameters = matching
      .iter()
      .skip(offset)
      .take(self.page_size)
      .map(|(name, (value, _))| StoredParameter {
        name: name.to_string(),
        value: value.clone(),
      })
      .collect();
    let end = offset + self.page_size;
    let next_token = (end < matching.len()).then(|| end.to_string());

    Ok(ParameterPage {
      parameters,
      next_token,
    })
  }

  async fn put(&self, record: &ParameterRecord) -> Result<(), StoreError> {
    self.put_calls.fetch_add(1, Ordering::SeqCst);
    self.call(&record.path).await?;

    let mut state = self.state();
    if !record.overwrite && state.parameters.contains_key(&record.path) {
      return Err(StoreError::with_code(
        "ParameterAlreadyExists",
        format!("The parameter {} already exists.", record.path),
      ));
    }
    state
      .parameters
      .insert(record.path.clone(), (record.value.clone(), record.kind));
    Ok(())
  }

  async fn delete(&self, name: &str) -> Result<(), StoreError> {
    self.delete_calls.fetch_add(1, Ordering::SeqCst);
    self.call(name).await?;

    match self.state().parameters.remove(name) {
      Some(_) => Ok(()),
      None => Err(StoreError::with_code(
        "ParameterNotFound",
        format!("Parameter {name} not found."),
      )),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(path: &str, value: &str) -> ParameterRecord {
    ParameterRecord {
      path: path.to_string(),
      value: value.to_string(),
      kind: ParameterType::Secret,
      overwrite: true,
      description: String::new(),
    }
  }

  #[tokio::test]
  async fn test_put_and_delete() {
    let store = MemoryStore::new();

    store.put(&record("/ns/A", "1")).await.unwrap();
    assert_eq!(store.get("/ns/A").as_deref(), Some("1"));
    assert_eq!(store.kind("/ns/A"), Some(ParameterType::Secret));

    store.delete("/ns/A").await.unwrap();
    assert!(store.is_empty());

    let missing = store.delete("/ns/A").await.unwrap_err();
    assert_eq!(missing.code.as_deref(), Some("ParameterNotFound"));
  }

  #[tokio::test]
  async fn test_put_without_overwrite_rejects_existing() {
    let store = MemoryStore::new();
    store.insert("/ns/A", "old");

    let mut create_only = record("/ns/A", "new");
    create_only.overwrite = false;
    let error = store.put(&create_only).await.unwrap_err();

    assert_eq!(error.code.as_deref(), Some("ParameterAlreadyExists"));
    assert_eq!(store.get("/ns/A").as_deref(), Some("old"));
  }

  #[tokio::test]
  async fn test_listing_is_scoped_and_paginated() {
    let store = MemoryStore::new().with_page_size(2);
    store.insert("/ns/A", "1");
    store.insert("/ns/nested/B", "2");
    store.insert("/ns/C", "3");
    store.insert("/nsx/D", "4");

    let first = store.list("/ns/", None).await.unwrap();
    assert_eq!(first.parameters.len(), 2);
    assert_eq!(first.next_token.as_deref(), Some("2"));

    let second = store.list("/ns", first.next_token).await.unwrap();
    assert_eq!(second.parameters.len(), 1);
    assert!(second.next_token.is_none());
  }

  #[tokio::test]
  async fn test_injected_failures() {
    let store = MemoryStore::new();
    store.fail_on("/ns/A", StoreError::new("boom"));

    assert!(store.put(&record("/ns/A", "1")).await.is_err());
    assert!(store.put(&record("/ns/B", "1")).await.is_ok());
    assert_eq!(store.put_calls(), 2);
    assert_eq!(store.names(), vec!["/ns/B".to_string()]);
  }
}
