use std::collections::HashMap;

/// Header id generator with per-document de-duplication.
///
/// The first use of a slug is returned as is; later uses get `-2`, `-3`, ...
/// appended. An optional prefix is joined with a hyphen before counting.
#[derive(Debug, Default, Clone)]
pub struct Slugger {
    counts: HashMap<String, usize>,
    prefix: Option<String>,
}

impl Slugger {
    /// Creates a slugger without a prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slugger that prefixes every id with `prefix-`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            counts: HashMap::new(),
            prefix: (!prefix.is_empty()).then_some(prefix),
        }
    }

    /// Generates the id for the given header text, or `None` when the text
    /// has nothing to slug (e.g. only punctuation).
    pub fn next_id(&mut self, text: &str) -> Option<String> {
        let slug = slugify(text);
        if slug.is_empty() {
            return None;
        }
        let base = match &self.prefix {
            Some(prefix) => format!("{}-{}", prefix, slug),
            None => slug,
        };

        // Suffixed ids are registered too, so a later header whose own slug
        // is `example-2` gets a fresh id instead of a duplicate.
        let mut count = self.counts.get(&base).copied().unwrap_or(0);
        let id = loop {
            count += 1;
            if count == 1 {
                break base.clone();
            }
            let candidate = format!("{}-{}", base, count);
            if !self.counts.contains_key(&candidate) {
                break candidate;
            }
        };
        self.counts.insert(base.clone(), count);
        if id != base {
            self.counts.insert(id.clone(), 1);
        }
        Some(id)
    }
}

/// Returns true if the character is a Unicode combining mark (Mn, Mc, Me).
/// These stay attached to their base letter in a slug.
fn is_combining_mark(ch: char) -> bool {
    use std::ops::RangeInclusive;

    const RANGES: &[RangeInclusive<u32>] = &[
        0x0300..=0x036F,
        0x0483..=0x0489,
        0x0591..=0x05BD,
        0x0610..=0x061A,
        0x064B..=0x065F,
        0x0900..=0x0903,
        0x093A..=0x094F,
        0x0951..=0x0957,
        0x0E31..=0x0E3A,
        0x0E47..=0x0E4E,
        0x1AB0..=0x1AFF,
        0x1DC0..=0x1DFF,
        0x3099..=0x309A,
        0xFE20..=0xFE2F,
    ];

    let cp = ch as u32;
    RANGES.iter().any(|r| r.contains(&cp))
}

/// Slugify header text.
///
/// 1. Drop everything that is not a word character, whitespace or `-`
/// 2. Trim surrounding whitespace and lowercase
/// 3. Collapse each run of whitespace and hyphens into one `-`
///
/// Word characters are ASCII alphanumerics, `_`, and Unicode letters and
/// digits (with their combining marks).
pub fn slugify(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|ch| is_word_char(*ch) || ch.is_whitespace() || *ch == '-')
        .collect();

    let mut slug = String::with_capacity(kept.len());
    let mut pending_hyphen = false;
    for ch in kept.trim().chars() {
        if ch.is_whitespace() || ch == '-' {
            pending_hyphen = true;
            continue;
        }
        if pending_hyphen {
            slug.push('-');
            pending_hyphen = false;
        }
        slug.extend(ch.to_lowercase());
    }
    if pending_hyphen {
        slug.push('-');
    }
    slug
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || is_combining_mark(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
    }

    #[test]
    fn punctuation_is_removed() {
        assert_eq!(slugify("What's new?"), "whats-new");
        assert_eq!(slugify("import.meta.glob"), "importmetaglob");
        assert_eq!(slugify("TypeScript & JSX"), "typescript-jsx");
    }

    #[test]
    fn hyphen_and_space_runs_collapse() {
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("  a---b  "), "a-b");
    }

    #[test]
    fn leading_hyphens_survive_trim() {
        // trimming removes whitespace only
        assert_eq!(slugify("-x-"), "-x-");
    }

    #[test]
    fn unicode_is_preserved() {
        assert_eq!(slugify("Héllo Wörld"), "héllo-wörld");
        assert_eq!(slugify("多言語 ガイド"), "多言語-ガイド");
    }

    #[test]
    fn underscores_are_word_chars() {
        assert_eq!(slugify("Using __dirname"), "using-__dirname");
    }

    #[test]
    fn duplicates_are_suffixed_from_two() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.next_id("Example").as_deref(), Some("example"));
        assert_eq!(slugger.next_id("Example").as_deref(), Some("example-2"));
        assert_eq!(slugger.next_id("Example").as_deref(), Some("example-3"));
        assert_eq!(slugger.next_id("Other").as_deref(), Some("other"));
    }

    #[test]
    fn prefix_is_joined_before_counting() {
        let mut slugger = Slugger::with_prefix("doc");
        assert_eq!(slugger.next_id("Intro").as_deref(), Some("doc-intro"));
        assert_eq!(slugger.next_id("Intro").as_deref(), Some("doc-intro-2"));
    }

    #[test]
    fn empty_slug_yields_no_id() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.next_id("?!"), None);
    }

    #[test]
    fn suffixed_ids_never_collide_with_plain_slugs() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.next_id("Example-2").as_deref(), Some("example-2"));
        assert_eq!(slugger.next_id("Example").as_deref(), Some("example"));
        assert_eq!(slugger.next_id("Example").as_deref(), Some("example-3"));
        assert_eq!(slugger.next_id("Example-2").as_deref(), Some("example-2-2"));
    }
}
