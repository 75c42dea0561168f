//! Leading `---`-fenced `key: value` metadata blocks.
//!
//! Grammar (the block must start at offset 0):
//!
//! ```text
//! block := fence entry+ fence
//! fence := "---" [ \t]* ("\n" | EOF)
//! entry := [ \t]* key [ \t]* ":" value "\n"
//! key   := [^ \t:\n]+
//! value := [^\n]*
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Ordered front-matter mapping. Keys keep the position of their first
/// occurrence; a repeated key takes the later value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Outcome of looking for a metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataExtraction {
    /// The document does not start with `---`.
    Absent,
    /// The document starts with `---` but no well-formed block follows.
    Malformed,
    /// A block was found.
    Found {
        /// Parsed entries.
        metadata: Metadata,
        /// Byte offset where the body starts.
        body_start: usize,
    },
}

/// Look for a metadata block at the very start of `input`.
pub fn extract_metadata(input: &str) -> MetadataExtraction {
    if !input.starts_with("---") {
        return MetadataExtraction::Absent;
    }

    let Some((opening, mut cursor)) = next_line(input, 0) else {
        return MetadataExtraction::Malformed;
    };
    if !is_fence(opening) {
        return MetadataExtraction::Malformed;
    }

    let mut metadata = Metadata::new();
    loop {
        let Some((line, next_cursor)) = next_line(input, cursor) else {
            return MetadataExtraction::Malformed;
        };
        if is_fence(line) {
            if metadata.is_empty() {
                return MetadataExtraction::Malformed;
            }
            return MetadataExtraction::Found {
                metadata,
                body_start: next_cursor,
            };
        }
        // An entry line must be newline-terminated.
        if next_cursor == input.len() && !input.ends_with('\n') {
            return MetadataExtraction::Malformed;
        }
        match parse_entry(line) {
            Some((key, value)) => metadata.insert(key, value),
            None => return MetadataExtraction::Malformed,
        }
        cursor = next_cursor;
    }
}

fn parse_entry(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim_matches([' ', '\t']);
    if key.is_empty() || key.contains([' ', '\t']) {
        return None;
    }
    Some((key, value.trim()))
}

fn next_line(input: &str, start: usize) -> Option<(&str, usize)> {
    if start >= input.len() {
        return None;
    }

    let bytes = &input.as_bytes()[start..];
    if let Some(pos) = bytes.iter().position(|b| *b == b'\n') {
        let line_end = start + pos;
        Some((&input[start..line_end], line_end + 1))
    } else {
        Some((&input[start..], input.len()))
    }
}

fn is_fence(line: &str) -> bool {
    line.strip_prefix("---")
        .is_some_and(|rest| rest.bytes().all(|b| b == b' ' || b == b'\t'))
}
