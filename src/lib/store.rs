//! The remote parameter store seam.
//!
//! Engines talk to a [`ParameterStore`]; the store reports failures as raw
//! [`StoreError`] signals, and [`classify`] decides which of those make every
//! further call pointless.

use async_trait::async_trait;
use std::fmt;

#[cfg(feature = "tracing")]
use tracing::trace;

/// How a parameter value is stored remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
  /// Stored as written.
  Plain,
  /// Encrypted at rest by the store.
  Secret,
}

impl ParameterType {
  pub fn from_secret(is_secret: bool) -> Self {
    if is_secret {
      ParameterType::Secret
    } else {
      ParameterType::Plain
    }
  }

  pub fn is_secret(self) -> bool {
    self == ParameterType::Secret
  }
}

impl fmt::Display for ParameterType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParameterType::Plain => write!(f, "String"),
      ParameterType::Secret => write!(f, "SecureString"),
    }
  }
}

/// One write sent to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRecord {
  pub path: String,
  pub value: String,
  pub kind: ParameterType,
  pub overwrite: bool,
  pub description: String,
}

/// One record read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParameter {
  pub name: String,
  pub value: String,
}

/// A single page of a listing. `next_token` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterPage {
  pub parameters: Vec<StoredParameter>,
  pub next_token: Option<String>,
}

/// Remote key/value store addressed by path.
#[async_trait]
pub trait ParameterStore: Send + Sync {
  /// Lists one page of records under `prefix`, recursively and decrypted.
  async fn list(
    &self,
    prefix: &str,
    next_token: Option<String>,
  ) -> Result<ParameterPage, StoreError>;

  /// Creates or replaces a record.
  async fn put(&self, record: &ParameterRecord) -> Result<(), StoreError>;

  /// Removes a record by its full path.
  async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Collects every page of a listing.
pub async fn list_all(
  store: &dyn ParameterStore,
  prefix: &str,
) -> Result<Vec<StoredParameter>, StoreError> {
  let mut parameters = Vec::new();
  let mut next_token = None;

  loop {
    let page = store.list(prefix, next_token).await?;

    #[cfg(feature = "tracing")]
    trace!(count = page.parameters.len(), "Fetched listing page");

    parameters.extend(page.parameters);
    match page.next_token {
      Some(token) => next_token = Some(token),
      None => break,
    }
  }

  Ok(parameters)
}

/// A failure reported by the store, as raw as the store gave it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
  /// Service error code, e.g. `AccessDeniedException`.
  pub code: Option<String>,
  pub message: String,
}

impl StoreError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      code: None,
      message: message.into(),
    }
  }

  pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      code: Some(code.into()),
      message: message.into(),
    }
  }
}

/// Failures after which every further call would fail the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatalKind {
  AuthInvalid,
  TokenExpired,
  AccessDenied,
}

impl FatalKind {
  /// What the operator should do about it.
  pub fn remediation(self) -> &'static str {
    match self {
      FatalKind::AuthInvalid => {
        "The credentials were rejected. Check the selected AWS profile or access keys (`aws configure list`) and try again."
      }
      FatalKind::TokenExpired => {
        "The session has expired. Refresh it (for example `aws sso login`) and run the command again."
      }
      FatalKind::AccessDenied => {
        "Access was denied. Make sure the identity may call ssm:PutParameter, ssm:DeleteParameter and ssm:GetParametersByPath on this namespace."
      }
    }
  }
}

impl fmt::Display for FatalKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FatalKind::AuthInvalid => write!(f, "invalid credentials"),
      FatalKind::TokenExpired => write!(f, "expired session"),
      FatalKind::AccessDenied => write!(f, "access denied"),
    }
  }
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  Fatal(FatalKind),
  Other,
}

/// A store failure that aborts the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {source}")]
pub struct FatalError {
  pub kind: FatalKind,
  pub source: StoreError,
}

impl FatalError {
  /// Escalates `error` when [`classify`] finds it fatal and hands it back
  /// unchanged otherwise, so `?` only propagates fatal failures.
  pub fn triage(error: StoreError) -> Result<StoreError, Self> {
    match classify(&error) {
      ErrorClass::Fatal(kind) => Err(Self {
        kind,
        source: error,
      }),
      ErrorClass::Other => Ok(error),
    }
  }
}

const EXPIRED_CODES: &[&str] = &[
  "ExpiredToken",
  "ExpiredTokenException",
  "RequestExpired",
  "TokenRefreshRequired",
];
const EXPIRED_MESSAGES: &[&str] = &["expired"];

const AUTH_CODES: &[&str] = &[
  "UnrecognizedClientException",
  "InvalidClientTokenId",
  "InvalidSignatureException",
  "SignatureDoesNotMatch",
  "IncompleteSignature",
  "MissingAuthenticationToken",
  "CredentialsError",
];
const AUTH_MESSAGES: &[&str] = &[
  "security token included in the request is invalid",
  "could not load credentials",
  "loading credentials",
  "no credentials",
];

const DENIED_CODES: &[&str] = &[
  "AccessDeniedException",
  "AccessDenied",
  "UnauthorizedOperation",
  "AuthorizationError",
];
const DENIED_MESSAGES: &[&str] = &["not authorized", "access denied"];

/// Sorts a store failure into fatal kinds or an ordinary per-item failure.
///
/// Expiry is checked first because expired-token messages also mention the
/// security token.
pub fn classify(error: &StoreError) -> ErrorClass {
  let code = error.code.as_deref().unwrap_or_default();
  let message = error.message.to_lowercase();
  let matches = |codes: &[&str], messages: &[&str]| {
    codes.iter().any(|c| c.eq_ignore_ascii_case(code))
      || messages.iter().any(|m| message.contains(m))
  };

  if matches(EXPIRED_CODES, EXPIRED_MESSAGES) {
    ErrorClass::Fatal(FatalKind::TokenExpired)
  } else if matches(AUTH_CODES, AUTH_MESSAGES) {
    ErrorClass::Fatal(FatalKind::AuthInvalid)
  } else if matches(DENIED_CODES, DENIED_MESSAGES) {
    ErrorClass::Fatal(FatalKind::AccessDenied)
  } else {
    ErrorClass::Other
  }
}
