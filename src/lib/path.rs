//! Mapping between env keys and parameter paths.

const SEPARATOR: char = '/';

/// Builds the parameter path for `key` under `namespace`.
///
/// Trailing separators on the namespace are dropped so `/app/` and `/app`
/// address the same records.
pub fn to_path(namespace: &str, key: &str) -> String {
  format!("{}{SEPARATOR}{key}", namespace.trim_end_matches(SEPARATOR))
}

/// Returns the env key a parameter path maps back to: its last segment.
pub fn key_from_path(path: &str) -> &str {
  path.rsplit(SEPARATOR).next().unwrap_or(path)
}
