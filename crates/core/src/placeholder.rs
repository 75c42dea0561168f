//! Placeholder keys that shield literal content from later rewrite passes.
//!
//! A key looks like `\u{2}` + namespace letter + 16 hex digits + `\u{3}`.
//! The digits are the head of a SHA-256 over the converter salt, the
//! namespace and the protected content, so equal content in one namespace
//! always maps to the same key and keys from different namespaces can never
//! collide. The normalizer strips both delimiter characters from input.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::{MarksmithError, Result};

/// Opening delimiter of a placeholder key.
pub const KEY_OPEN: char = '\u{2}';
/// Closing delimiter of a placeholder key.
pub const KEY_CLOSE: char = '\u{3}';

/// Upper bound on nested placeholder resolution (a block holding a code span
/// holding an escaped character, and so on).
const MAX_NESTING: usize = 32;

/// Which table a placeholder belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Raw or generated block-level HTML.
    Block,
    /// Inline HTML spans hashed in safe mode.
    Span,
    /// Backslash-escaped and tag-protected single characters.
    Escape,
    /// Encoded code span and code block bodies.
    Code,
}

impl Namespace {
    fn tag(self) -> char {
        match self {
            Namespace::Block => 'B',
            Namespace::Span => 'S',
            Namespace::Escape => 'E',
            Namespace::Code => 'C',
        }
    }
}

/// Per-converter secret mixed into every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt(u64);

impl Salt {
    /// Creates a salt from a seed value.
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Builds the key for `content` in `namespace`.
    pub fn key(&self, namespace: Namespace, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.to_le_bytes());
        hasher.update([namespace.tag() as u8]);
        hasher.update(content.as_bytes());
        let digest = hasher.finalize();

        let mut key = String::with_capacity(19);
        key.push(KEY_OPEN);
        key.push(namespace.tag());
        key.push_str(&hex::encode(&digest[..8]));
        key.push(KEY_CLOSE);
        key
    }
}

/// Append-only mapping from placeholder key to the literal it replaced.
#[derive(Debug, Clone)]
pub struct PlaceholderTable {
    namespace: Namespace,
    salt: Salt,
    entries: HashMap<String, String>,
}

impl PlaceholderTable {
    /// Creates an empty table.
    pub fn new(namespace: Namespace, salt: Salt) -> Self {
        Self {
            namespace,
            salt,
            entries: HashMap::new(),
        }
    }

    /// Stores `content` and returns its key.
    pub fn insert(&mut self, content: impl Into<String>) -> String {
        let content = content.into();
        let key = self.salt.key(self.namespace, &content);
        self.entries.entry(key.clone()).or_insert(content);
        key
    }

    /// Looks up the literal stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns true if `key` is one of this table's keys.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Namespace of this table.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One left-to-right pass replacing this table's keys; other keys stay.
    pub fn restore(&self, text: &str) -> String {
        if self.entries.is_empty() || !text.contains(KEY_OPEN) {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some((before, key, after)) = split_key(rest) {
            out.push_str(before);
            match self.entries.get(key) {
                Some(literal) => out.push_str(literal),
                None => out.push_str(key),
            }
            rest = after;
        }
        out.push_str(rest);
        out
    }
}

/// Character-level escape table: each Markdown-significant character maps to
/// a fixed key in the [`Namespace::Escape`] namespace.
#[derive(Debug, Clone)]
pub struct EscapeTable {
    table: PlaceholderTable,
    by_char: HashMap<char, String>,
}

impl EscapeTable {
    /// Characters that carry Markdown meaning and can be backslash-escaped.
    pub const SPECIAL: &'static str = "\\`*_{}[]()>#+-.!";

    /// Builds a table for [`Self::SPECIAL`] plus `extra` characters.
    pub fn new(salt: Salt, extra: &str) -> Self {
        let mut table = PlaceholderTable::new(Namespace::Escape, salt);
        let mut by_char = HashMap::new();
        for c in Self::SPECIAL.chars().chain(extra.chars()) {
            let key = table.insert(c.to_string());
            by_char.insert(c, key);
        }
        Self { table, by_char }
    }

    /// Key standing in for `c`, if `c` is escapable.
    pub fn key(&self, c: char) -> Option<&str> {
        self.by_char.get(&c).map(String::as_str)
    }

    /// Replace `\c` sequences for every escapable `c` with its key.
    pub fn encode_backslash_escapes(&self, text: &str) -> String {
        if !text.contains('\\') {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\'
                && let Some(&next) = chars.peek()
                && let Some(key) = self.by_char.get(&next)
            {
                chars.next();
                out.push_str(key);
                continue;
            }
            out.push(c);
        }
        out
    }

    /// Replace every occurrence of the listed characters with their keys.
    pub fn hide(&self, text: &str, chars: &[char]) -> String {
        if !text.contains(chars) {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match self.by_char.get(&c) {
                Some(key) if chars.contains(&c) => out.push_str(key),
                _ => out.push(c),
            }
        }
        out
    }

    /// Restore escaped characters in `text`.
    pub fn restore(&self, text: &str) -> String {
        self.table.restore(text)
    }

    /// Underlying placeholder table.
    pub fn table(&self) -> &PlaceholderTable {
        &self.table
    }
}

/// Resolve every placeholder in `text` against `tables`, consulted in order
/// on each round, until none remain.
///
/// A key that belongs to none of the tables is an internal inconsistency and
/// is reported as [`MarksmithError::UnresolvedPlaceholder`].
pub fn unhash(text: &str, tables: &[&PlaceholderTable]) -> Result<String> {
    let mut current = text.to_string();
    for _ in 0..MAX_NESTING {
        if !current.contains(KEY_OPEN) {
            return Ok(current);
        }
        let mut next = current.clone();
        for table in tables {
            next = table.restore(&next);
        }
        if next == current {
            break;
        }
        current = next;
    }

    match split_key(&current) {
        Some((_, key, _)) => Err(MarksmithError::UnresolvedPlaceholder {
            key: key.trim_matches([KEY_OPEN, KEY_CLOSE]).to_string(),
        }),
        None => Ok(current),
    }
}

/// Returns true if `text` holds any placeholder key.
pub fn contains_key(text: &str) -> bool {
    text.contains(KEY_OPEN)
}

/// Returns true if `text` is exactly one key and nothing else.
pub fn is_single_key(text: &str) -> bool {
    text.starts_with(KEY_OPEN)
        && text.ends_with(KEY_CLOSE)
        && text.matches(KEY_OPEN).count() == 1
}

/// Splits `text` around its first key: `(before, key, after)`.
fn split_key(text: &str) -> Option<(&str, &str, &str)> {
    let start = text.find(KEY_OPEN)?;
    let close = text[start..].find(KEY_CLOSE)? + start + KEY_CLOSE.len_utf8();
    Some((&text[..start], &text[start..close], &text[close..]))
}
