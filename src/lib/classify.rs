//! Secret detection for env values.
//!
//! A value is stored encrypted when its key looks sensitive, or when the value
//! itself looks like an opaque token (a long base64-ish run that is neither a
//! URL nor a plain number).

use regex::Regex;
use std::sync::LazyLock;

/// Case-insensitive fragments that mark a key as sensitive.
pub const SENSITIVE_KEY_PATTERNS: &[&str] = &[
  "password",
  "secret",
  "key",
  "token",
  "auth",
  "credential",
  "pass",
  "pwd",
  "private",
  "cert",
  "ssl",
  "tls",
  "encrypt",
  "hash",
  "salt",
];

const MIN_OPAQUE_VALUE_LEN: usize = 20;

static OPAQUE_RUN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/=]{20,}").expect("valid opaque-run pattern"));
static URL: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^https?://").expect("valid url pattern"));
static DIGITS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d+$").expect("valid digits pattern"));

/// Decides whether `value` should be stored as an encrypted parameter.
///
/// `force_all` short-circuits to `true`. The result depends on nothing but
/// the arguments.
pub fn is_secret(key: &str, value: &str, force_all: bool) -> bool {
  force_all || has_sensitive_key(key) || looks_opaque(value)
}

fn has_sensitive_key(key: &str) -> bool {
  let key = key.to_lowercase();
  SENSITIVE_KEY_PATTERNS
    .iter()
    .any(|pattern| key.contains(pattern))
}

fn looks_opaque(value: &str) -> bool {
  value.chars().count() > MIN_OPAQUE_VALUE_LEN
    && OPAQUE_RUN.is_match(value)
    && !URL.is_match(value)
    && !DIGITS.is_match(value)
}
