//! Strong and emphasis.
//!
//! ```text
//! strong := ("**" | "__") \S  text  [*_]*  \S? ("**" | "__")   (same delimiter)
//! em     := ("*" | "_")   \S  text  \S     ("*" | "_")
//! ```
//!
//! Strong runs over the whole text before emphasis. For each opener the
//! shortest content wins; a strong closer may swallow a run of `*`/`_` just
//! before it, preferring the longest such run. Underscore delimiters never
//! open after or close before a letter or digit, so `snake_case_name` stays
//! literal. With `code-friendly`, underscores are never delimiters.

use super::Conversion;
use crate::options::ExtraKind;

#[derive(Clone, Copy)]
enum Strength {
    Strong,
    Em,
}

impl Strength {
    fn tag(self) -> &'static str {
        match self {
            Strength::Strong => "strong",
            Strength::Em => "em",
        }
    }
}

impl Conversion<'_> {
    pub(crate) fn do_strong_and_em(&self, text: &str) -> String {
        if !text.contains(['*', '_']) {
            return text.to_string();
        }
        let delims: &[char] = if self.has(ExtraKind::CodeFriendly) {
            &['*']
        } else {
            &['*', '_']
        };
        let text = apply(text, delims, Strength::Strong);
        apply(&text, delims, Strength::Em)
    }
}

fn apply(text: &str, delims: &[char], strength: Strength) -> String {
    let mut closers = ClosersByDelim::default();
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;
    let mut pos = 0;
    while pos < text.len() {
        let Some(offset) = text[pos..].find(delims) else {
            break;
        };
        let open = pos + offset;
        let delim_char = text.as_bytes()[open] as char;
        let delim = match strength {
            Strength::Strong if text[open + 1..].starts_with(delim_char) => &text[open..open + 2],
            Strength::Strong => {
                pos = open + 1;
                continue;
            }
            Strength::Em => &text[open..open + 1],
        };
        let content_start = open + delim.len();

        let first = text[content_start..]
            .chars()
            .next()
            .filter(|c| !c.is_whitespace());
        let opens = first.is_some()
            && !(delim_char == '_' && prev_char(text, open).is_some_and(char::is_alphanumeric));

        // Content is at least one character long.
        let closer = first.filter(|_| opens).and_then(|c| {
            closers
                .for_delim(text, delim, strength)
                .first_from(text, content_start + c.len_utf8(), delim)
        });

        match closer {
            Some(close) => {
                let tag = strength.tag();
                out.push_str(&text[last..open]);
                out.push_str(&format!("<{}>{}</{}>", tag, &text[content_start..close], tag));
                last = close + delim.len();
                pos = last;
            }
            None => pos = open + 1,
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Closer tables, built on first use for each delimiter.
#[derive(Default)]
struct ClosersByDelim {
    tables: Vec<(String, Closers)>,
}

impl ClosersByDelim {
    fn for_delim(&mut self, text: &str, delim: &str, strength: Strength) -> &Closers {
        let index = match self.tables.iter().position(|(d, _)| d == delim) {
            Some(index) => index,
            None => {
                let closers = match strength {
                    Strength::Strong => Closers::strong(text, delim),
                    Strength::Em => Closers::em(text, delim),
                };
                self.tables.push((delim.to_string(), closers));
                self.tables.len() - 1
            }
        };
        &self.tables[index].1
    }
}

/// Every place a delimiter can close, found in one scan of the text, so
/// that each opener costs a binary search instead of a rescan.
struct Closers {
    /// Maximal `[*_]` runs as `(start, end)`. Empty for emphasis.
    runs: Vec<(usize, usize)>,
    /// `(earliest content end, close)`, ascending in both.
    closes: Vec<(usize, usize)>,
}

impl Closers {
    /// A single `delim` preceded by a non-space character.
    fn em(text: &str, delim: &str) -> Self {
        let closes = text
            .match_indices(delim)
            .map(|(at, _)| at)
            .filter(|&at| is_closer_at(text, at, delim))
            .map(|at| (at, at))
            .collect();
        Closers {
            runs: Vec::new(),
            closes,
        }
    }

    /// Content ends at the start of a `[*_]` run; the close is the rightmost
    /// `delim` inside that run.
    fn strong(text: &str, delim: &str) -> Self {
        let bytes = text.as_bytes();
        let mut runs = Vec::new();
        let mut closes = Vec::new();
        let mut at = 0;
        while at < bytes.len() {
            if !matches!(bytes[at], b'*' | b'_') {
                at += 1;
                continue;
            }
            let start = at;
            while at < bytes.len() && matches!(bytes[at], b'*' | b'_') {
                at += 1;
            }
            runs.push((start, at));
            if let Some(close) = strong_close_in_run(text, start, at, delim) {
                closes.push((start, close));
            }
        }
        Closers { runs, closes }
    }

    /// Closing offset for content that must reach at least `min`.
    fn first_from(&self, text: &str, min: usize, delim: &str) -> Option<usize> {
        // `min` may fall inside a run; that run is entered part way.
        let run = self.runs.partition_point(|&(_, end)| end <= min);
        if let Some(&(start, end)) = self.runs.get(run)
            && start < min
            && let Some(close) = strong_close_in_run(text, min, end, delim)
        {
            return Some(close);
        }
        let next = self.closes.partition_point(|&(from, _)| from < min);
        self.closes.get(next).map(|&(_, close)| close)
    }
}

/// The longest stretch of `[*_]` swallowed into the content that still
/// leaves a closing `delim` in the run `from..end`.
fn strong_close_in_run(text: &str, from: usize, end: usize, delim: &str) -> Option<usize> {
    (from..end).rev().find(|&close| {
        text[close..].starts_with(delim)
            && (close > from || prev_char(text, from).is_some_and(|c| !c.is_whitespace()))
            && closes_word(text, close, delim)
    })
}

fn is_closer_at(text: &str, at: usize, delim: &str) -> bool {
    text[at..].starts_with(delim)
        && prev_char(text, at).is_some_and(|c| !c.is_whitespace())
        && closes_word(text, at, delim)
}

/// Underscore closers may not be followed by a letter or digit.
fn closes_word(text: &str, close: usize, delim: &str) -> bool {
    !delim.starts_with('_')
        || !text[close + delim.len()..]
            .chars()
            .next()
            .is_some_and(char::is_alphanumeric)
}

fn prev_char(text: &str, at: usize) -> Option<char> {
    text[..at].chars().next_back()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Extra, Options};
    use crate::passes::test_support::with_conversion;

    fn emphasize(options: &Options, text: &str) -> String {
        with_conversion(options, |cx| cx.do_strong_and_em(text))
    }

    fn plain(text: &str) -> String {
        emphasize(&Options::new(), text)
    }

    #[test]
    fn basic_forms() {
        assert_eq!(plain("*boo!*"), "<em>boo!</em>");
        assert_eq!(plain("**boom!**"), "<strong>boom!</strong>");
        assert_eq!(plain("_a_ and __b__"), "<em>a</em> and <strong>b</strong>");
    }

    #[test]
    fn strong_before_em() {
        assert_eq!(plain("***both***"), "<strong><em>both</em></strong>");
        assert_eq!(plain("**a*b**"), "<strong>a*b</strong>");
        assert_eq!(plain("*a**b*"), "<em>a</em><em>b</em>");
    }

    #[test]
    fn whitespace_blocks_delimiters() {
        assert_eq!(plain("a * b * c"), "a * b * c");
        assert_eq!(plain("*a *b"), "*a *b");
        assert_eq!(plain("a ** b"), "a ** b");
    }

    #[test]
    fn intraword_underscores_are_literal() {
        assert_eq!(plain("snake_case_name"), "snake_case_name");
        assert_eq!(plain("2*3*4"), "2<em>3</em>4");
    }

    #[test]
    fn code_friendly_ignores_underscores() {
        let options = Options::new().extra(Extra::CodeFriendly);
        assert_eq!(emphasize(&options, "__init__ and **b**"), "__init__ and <strong>b</strong>");
    }

    #[test]
    fn unmatched_openers_stay_linear() {
        let started = std::time::Instant::now();
        for unit in ["**a ", "__a ", "*a ", "_a "] {
            let text = unit.repeat(20_000);
            assert!(plain(&text).len() >= text.len());
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn closer_inside_opening_run() {
        assert_eq!(plain("****a**"), "<strong>**a</strong>");
    }

    #[test]
    fn spans_lines() {
        assert_eq!(plain("*one\ntwo*"), "<em>one\ntwo</em>");
    }
}
