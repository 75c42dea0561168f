//! Source normalization: line endings, tab expansion, whitespace-only lines.
//!
//! Everything here is a pure text-to-text function. The converter runs
//! [`normalize`] once on the raw input; [`outdent`], [`dedent`] and [`detab`]
//! are reused by the block passes on nested content.

use crate::placeholder::{KEY_CLOSE, KEY_OPEN};

/// Default tab stop width.
pub const DEFAULT_TAB_WIDTH: usize = 4;

/// Normalize raw source text.
///
/// - `\r\n` and lone `\r` become `\n`
/// - tabs advance to the next multiple of `tab_width` from the line start
/// - lines holding only spaces/tabs become empty
/// - placeholder delimiter characters are dropped so input cannot forge keys
///
/// Running it twice yields the same text as running it once.
pub fn normalize(text: &str, tab_width: usize) -> String {
    let mut unified = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                unified.push('\n');
            }
            KEY_OPEN | KEY_CLOSE => {}
            _ => unified.push(c),
        }
    }

    let detabbed = detab(&unified, tab_width);
    strip_whitespace_only_lines(&detabbed)
}

/// Expand tabs, each one advancing to the next tab stop on its line.
pub fn detab(text: &str, tab_width: usize) -> String {
    if !text.contains('\t') {
        return text.to_string();
    }
    let width = tab_width.max(1);
    let mut out = String::with_capacity(text.len() + 16);
    let mut column = 0usize;
    for c in text.chars() {
        match c {
            '\t' => {
                let pad = width - (column % width);
                out.extend(std::iter::repeat_n(' ', pad));
                column += pad;
            }
            '\n' => {
                out.push('\n');
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

/// Empty out lines made only of spaces and tabs.
pub fn strip_whitespace_only_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if !line.bytes().all(|b| b == b' ' || b == b'\t') {
            out.push_str(line);
        }
    }
    out
}

/// Remove one level of indentation (a tab or up to `tab_width` spaces) from
/// every line.
pub fn outdent(text: &str, tab_width: usize) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let rest = if let Some(stripped) = line.strip_prefix('\t') {
            stripped
        } else {
            let spaces = line
                .bytes()
                .take(tab_width)
                .take_while(|b| *b == b' ')
                .count();
            &line[spaces..]
        };
        out.push_str(rest);
    }
    out
}

/// Remove the indentation common to all non-blank lines.
///
/// With `skip_first_line`, the first line neither counts toward the margin
/// nor gets dedented (a footnote body that starts on the definition line).
pub fn dedent(text: &str, skip_first_line: bool) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let margin = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| !(skip_first_line && *i == 0))
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(_, line)| leading_spaces(line))
        .min()
        .unwrap_or(0);

    if margin == 0 {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if skip_first_line && i == 0 {
            out.push_str(line);
            continue;
        }
        let cut = leading_spaces(line).min(margin);
        out.push_str(&line[cut..]);
    }
    out
}

/// Number of leading ASCII spaces.
pub fn leading_spaces(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b' ').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unifies_line_endings() {
        assert_eq!(normalize("a\r\nb\rc\n", 4), "a\nb\nc\n");
    }

    #[test]
    fn tabs_expand_to_next_stop() {
        assert_eq!(detab("\tx", 4), "    x");
        assert_eq!(detab("ab\tx", 4), "ab  x");
        assert_eq!(detab("abcd\tx", 4), "abcd    x");
        assert_eq!(detab("a\tb\tc", 4), "a   b   c");
        assert_eq!(detab("x\n\ty", 8), "x\n        y");
    }

    #[test]
    fn whitespace_only_lines_become_empty() {
        assert_eq!(normalize("a\n   \n\t\nb", 4), "a\n\n\nb");
    }

    #[test]
    fn placeholder_delimiters_are_dropped() {
        assert_eq!(normalize("a\u{2}b\u{3}c", 4), "abc");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "plain",
            "tab\tinside\r\n  \t \nnext",
            "\t\tcode\n\n\n",
            "mixed\r\r\n\t*x*\t",
        ];
        for input in inputs {
            let once = normalize(input, 4);
            assert_eq!(normalize(&once, 4), once, "input {:?}", input);
        }
    }

    #[test]
    fn outdent_removes_one_level() {
        assert_eq!(outdent("    a\n      b\n  c\nd", 4), "a\n  b\nc\nd");
        assert_eq!(outdent("\ta", 4), "a");
    }

    #[test]
    fn dedent_uses_common_margin() {
        assert_eq!(dedent("    a\n      b\n\n    c", false), "a\n  b\n\nc");
        assert_eq!(dedent("first\n    a\n    b", true), "first\na\nb");
    }
}
