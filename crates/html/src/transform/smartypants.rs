//! Smart punctuation as numeric entities.
//!
//! | source          | output     |
//! |-----------------|------------|
//! | `---`           | `&#8212;`  |
//! | `--`            | `&#8211;`  |
//! | `...`, `. . .`  | `&#8230;`  |
//! | `"` opening     | `&#8220;`  |
//! | `"` closing     | `&#8221;`  |
//! | `'` opening     | `&#8216;`  |
//! | `'` closing     | `&#8217;`  |
//!
//! A quote opens after whitespace (or at the start of a text run) when a
//! non-space follows it, and closes after a non-space. Abbreviated years
//! (`'80s`) and a few archaic contractions (`'tis`, `'twas`, ...) take an
//! apostrophe instead of an opening quote.

use std::borrow::Cow;
use std::iter::Peekable;
use std::str::CharIndices;

const CONTRACTIONS: &[&str] = &[
    "tis", "twas", "twer", "neath", "o", "n", "round", "bout", "twixt", "nuff", "fraid", "sup",
];

/// Educates the prose in `input`, leaving tags and the contents of
/// `code`, `pre`, `kbd`, `script` and `style` elements untouched.
pub fn educate(input: &str) -> Cow<'_, str> {
    let educable = input.contains(['"', '\''])
        || input.contains("--")
        || input.contains("...")
        || input.contains(". .");
    if !educable {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 16);
    let mut code_depth = 0usize;
    let mut last = 0;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '<' {
            continue;
        }
        let run = &input[last..i];
        if code_depth == 0 {
            educate_text(run, &mut out);
        } else {
            out.push_str(run);
        }
        let end = consume_tag(&mut chars, input.len());
        let tag = &input[i..end];
        track_code_depth(tag, &mut code_depth);
        out.push_str(tag);
        last = end;
    }

    let run = &input[last..];
    if code_depth == 0 {
        educate_text(run, &mut out);
    } else {
        out.push_str(run);
    }
    Cow::Owned(out)
}

/// Advances past the closing `>`; returns the offset after the tag.
fn consume_tag(chars: &mut Peekable<CharIndices<'_>>, len: usize) -> usize {
    for (i, c) in chars.by_ref() {
        if c == '>' {
            return i + 1;
        }
    }
    len
}

fn track_code_depth(tag: &str, code_depth: &mut usize) {
    const RAW: [&str; 5] = ["code", "pre", "kbd", "script", "style"];
    let lower = tag.to_ascii_lowercase();
    let (closing, name) = match lower.strip_prefix("</") {
        Some(rest) => (true, rest),
        None => (false, &lower[1..]),
    };
    let name_len = name
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(name.len());
    if !RAW.contains(&&name[..name_len]) {
        return;
    }
    if closing {
        *code_depth = code_depth.saturating_sub(1);
    } else if !lower.ends_with("/>") {
        *code_depth += 1;
    }
}

fn educate_text(text: &str, out: &mut String) {
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let rest = &text[i..];
        let next = rest[c.len_utf8()..].chars().next();
        match c {
            '-' if rest.starts_with("---") => {
                out.push_str("&#8212;");
                skip(&mut chars, 2);
            }
            '-' if rest.starts_with("--") => {
                out.push_str("&#8211;");
                skip(&mut chars, 1);
            }
            '.' if rest.starts_with("...") => {
                out.push_str("&#8230;");
                skip(&mut chars, 2);
            }
            '.' if rest.starts_with(". . .") => {
                out.push_str("&#8230;");
                skip(&mut chars, 4);
            }
            '\'' => out.push_str(single_quote(prev, &rest[1..])),
            '"' => out.push_str(double_quote(prev, next)),
            _ => out.push(c),
        }
        prev = Some(c);
    }
}

fn skip(chars: &mut Peekable<CharIndices<'_>>, n: usize) {
    for _ in 0..n {
        chars.next();
    }
}

fn single_quote(prev: Option<char>, after: &str) -> &'static str {
    if is_abbreviated_year(after) || is_contraction(after) {
        return "&#8217;";
    }
    let next = after.chars().next();
    if opens(prev, next) {
        "&#8216;"
    } else if prev.is_some_and(|c| !c.is_whitespace()) {
        "&#8217;"
    } else {
        "'"
    }
}

fn double_quote(prev: Option<char>, next: Option<char>) -> &'static str {
    if opens(prev, next) {
        "&#8220;"
    } else if prev.is_some_and(|c| !c.is_whitespace()) && next.is_none_or(ends_word) {
        "&#8221;"
    } else {
        "\""
    }
}

fn opens(prev: Option<char>, next: Option<char>) -> bool {
    prev.is_none_or(char::is_whitespace) && next.is_some_and(|c| !c.is_whitespace())
}

fn ends_word(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ';' | '.' | '?' | '!')
}

/// `80s`, `99 ` and the like after the apostrophe.
fn is_abbreviated_year(after: &str) -> bool {
    let mut chars = after.chars();
    let digits = chars.next().is_some_and(|c| c.is_ascii_digit())
        && chars.next().is_some_and(|c| c.is_ascii_digit());
    digits && chars.next().is_none_or(|c| ends_word(c) || c == 's')
}

fn is_contraction(after: &str) -> bool {
    CONTRACTIONS.iter().any(|word| {
        let matches_word = after.starts_with(word)
            || after
                .strip_prefix(word[..1].to_ascii_uppercase().as_str())
                .is_some_and(|rest| rest.starts_with(&word[1..]));
        matches_word
            && !after[word.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::educate;

    #[test]
    fn quotes_dashes_and_ellipses() {
        assert_eq!(
            educate("He said \"hi\" -- and 'left' --- fast..."),
            "He said &#8220;hi&#8221; &#8211; and &#8216;left&#8217; &#8212; fast&#8230;"
        );
    }

    #[test]
    fn apostrophes() {
        assert_eq!(educate("don't"), "don&#8217;t");
        assert_eq!(educate("the '80s"), "the &#8217;80s");
        assert_eq!(educate("'Twas brillig"), "&#8217;Twas brillig");
        assert_eq!(educate("'nice'"), "&#8216;nice&#8217;");
    }

    #[test]
    fn spaced_ellipsis() {
        assert_eq!(educate("wait. . . ok"), "wait&#8230; ok");
    }

    #[test]
    fn tags_and_code_are_untouched() {
        assert_eq!(
            educate("<a title=\"x\">'q'</a> <code>\"--\"</code> <kbd>...</kbd>"),
            "<a title=\"x\">&#8216;q&#8217;</a> <code>\"--\"</code> <kbd>...</kbd>"
        );
    }

    #[test]
    fn plain_text_is_borrowed() {
        assert!(matches!(educate("nothing to do"), std::borrow::Cow::Borrowed(_)));
    }
}
