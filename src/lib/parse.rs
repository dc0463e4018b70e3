//! `.env` content parsing.
//!
//! The parser is a line-oriented scanner. Each `KEY=VALUE` line yields one
//! [`EnvEntry`]; quoted values may continue over following lines until their
//! closing delimiter is found. Parsing never fails: lines that do not look like
//! an assignment are skipped, and a quoted value whose closing delimiter never
//! shows up is returned exactly as written on its first line.
//!
//! | Opening | Escapes decoded                              | Multi-line |
//! |---------|----------------------------------------------|------------|
//! | none    | none, value is trimmed                       | no         |
//! | `"`     | `\n` `\r` `\t` `\"` `\'` `\\`                | yes        |
//! | `'`     | `\'` only                                    | yes        |
//! | `` ` `` | none                                         | yes        |

use indexmap::IndexMap;
use std::borrow::Cow;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

const COMMENT_PREFIX: &str = "#";
const ASSIGNMENT_OPERATOR: char = '=';
const ESCAPE: char = '\\';

/// How many lines after the opening one are searched for a closing quote.
pub const MAX_CONTINUATION_LINES: usize = 100;

/// Decoded key/value pairs in file order. Duplicate keys keep the last value.
pub type EnvMap = IndexMap<String, String>;

/// Parses `.env` content into an ordered key/value map.
pub fn parse(content: &str) -> EnvMap {
  #[cfg(feature = "tracing")]
  debug!("Parsing env content with {} lines", content.lines().count());

  let map: EnvMap = EnvFileParser::new(content)
    .map(|entry| (entry.key.to_string(), entry.value.into_owned()))
    .collect();

  #[cfg(feature = "tracing")]
  debug!("Parsed {} variables", map.len());

  map
}

/// A single assignment found in the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry<'a> {
  pub key: &'a str,
  pub value: Cow<'a, str>,
}

/// Iterator over the assignments of an `.env` document.
#[derive(Debug, Clone)]
pub struct EnvFileParser<'a> {
  lines: Vec<&'a str>,
  cursor: usize,
}

impl<'a> EnvFileParser<'a> {
  pub fn new(content: &'a str) -> Self {
    Self {
      lines: content.lines().collect(),
      cursor: 0,
    }
  }

  /// Resolves the text after `=` into a value, consuming continuation lines
  /// when a quoted value spans several of them.
  fn value(&mut self, remainder: &'a str) -> Cow<'a, str> {
    let Some(quote) = remainder.chars().next().and_then(Quote::from_opening) else {
      return Cow::Borrowed(remainder);
    };

    if let Some(inner) = quote.closed_inner(remainder) {
      return Cow::Owned(quote.decode(inner));
    }

    let mut joined = remainder.to_string();
    for (offset, line) in self.lines[self.cursor..]
      .iter()
      .take(MAX_CONTINUATION_LINES)
      .enumerate()
    {
      joined.push('\n');

      let trimmed = line.trim_end();
      if quote.ends_unescaped(trimmed) {
        joined.push_str(trimmed);
        self.cursor += offset + 1;

        #[cfg(feature = "tracing")]
        trace!("Quoted value closed after {} continuation lines", offset + 1);

        return Cow::Owned(quote.decode(&joined[1..joined.len() - 1]));
      }
      joined.push_str(line);
    }

    #[cfg(feature = "tracing")]
    trace!("Unterminated quoted value, keeping it verbatim: {:?}", remainder);

    Cow::Borrowed(remainder)
  }
}

impl<'a> Iterator for EnvFileParser<'a> {
  type Item = EnvEntry<'a>;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(line) = self.lines.get(self.cursor).copied() {
      self.cursor += 1;

      let trimmed = line.trim();
      if trimmed.is_empty() || trimmed.starts_with(COMMENT_PREFIX) {
        continue;
      }

      let Some((key, remainder)) = split_assignment(trimmed) else {
        #[cfg(feature = "tracing")]
        trace!("Skipping line that is not an assignment: {:?}", line);
        continue;
      };

      let value = if remainder.is_empty() {
        Cow::Borrowed("")
      } else {
        self.value(remainder)
      };

      #[cfg(feature = "tracing")]
      trace!("Parsed variable: key={}", key);

      return Some(EnvEntry { key, value });
    }

    None
  }
}

/// True when `key` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_key(key: &str) -> bool {
  key_len(key) == key.len() && !key.is_empty()
}

/// Length of the key prefix of `s`, zero when `s` does not start with one.
fn key_len(s: &str) -> usize {
  match s.chars().next() {
    Some(first) if first.is_ascii_alphabetic() || first == '_' => s
      .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
      .unwrap_or(s.len()),
    _ => 0,
  }
}

/// Splits `KEY = rest` into the key and the trimmed rest.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
  let key_end = key_len(line);
  if key_end == 0 {
    return None;
  }

  let (key, rest) = line.split_at(key_end);
  let value = rest.trim_start().strip_prefix(ASSIGNMENT_OPERATOR)?;

  Some((key, value.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
  Double,
  Single,
  Backtick,
}

impl Quote {
  fn from_opening(c: char) -> Option<Self> {
    match c {
      '"' => Some(Quote::Double),
      '\'' => Some(Quote::Single),
      '`' => Some(Quote::Backtick),
      _ => None,
    }
  }

  fn delimiter(self) -> char {
    match self {
      Quote::Double => '"',
      Quote::Single => '\'',
      Quote::Backtick => '`',
    }
  }

  /// True when `s` ends with this delimiter preceded by an even number of
  /// backslashes.
  fn ends_unescaped(self, s: &str) -> bool {
    let Some(body) = s.strip_suffix(self.delimiter()) else {
      return false;
    };
    let escapes = body.chars().rev().take_while(|&c| c == ESCAPE).count();
    escapes % 2 == 0
  }

  /// The text between the quotes when the value opens and closes on one line.
  fn closed_inner(self, remainder: &str) -> Option<&str> {
    let body = &remainder[self.delimiter().len_utf8()..];
    if self.ends_unescaped(body) {
      Some(&body[..body.len() - self.delimiter().len_utf8()])
    } else {
      None
    }
  }

  fn decode(self, inner: &str) -> String {
    match self {
      Quote::Double => decode_escapes(inner, |c| match c {
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '"' => Some('"'),
        '\'' => Some('\''),
        '\\' => Some('\\'),
        _ => None,
      }),
      Quote::Single => decode_escapes(inner, |c| (c == '\'').then_some('\'')),
      Quote::Backtick => inner.to_string(),
    }
  }
}

/// Replaces `\X` with `escape(X)`; unknown sequences stay as written.
fn decode_escapes(inner: &str, escape: impl Fn(char) -> Option<char>) -> String {
  let mut decoded = String::with_capacity(inner.len());
  let mut chars = inner.chars();

  while let Some(c) = chars.next() {
    if c != ESCAPE {
      decoded.push(c);
      continue;
    }
    match chars.next() {
      Some(next) => match escape(next) {
        Some(replacement) => decoded.push(replacement),
        None => {
          decoded.push(ESCAPE);
          decoded.push(next);
        }
      },
      None => decoded.push(ESCAPE),
    }
  }

  decoded
}
