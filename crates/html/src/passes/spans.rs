//! The span gamut: inline rules applied to the text of one block.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use super::Conversion;
use super::hash_html::tokenize_html;
use crate::options::ExtraKind;
use crate::transform::{link_patterns, smartypants};

static HARD_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}\n").expect("valid break pattern"));

impl Conversion<'_> {
    /// Runs every inline rule, in order, over `text`.
    pub(crate) fn run_span_gamut(&mut self, text: &str) -> String {
        let text = self.do_code_spans(text);
        let text = self.escape_special_chars(&text);
        let text = self.do_links(&text);
        let text = self.do_auto_links(&text);
        let text = if self.has(ExtraKind::LinkPatterns) {
            link_patterns::apply(self, &text)
        } else {
            text
        };
        let text = encode_amps_and_angles(&text).into_owned();
        let text = self.do_strong_and_em(&text);
        let text = if self.has(ExtraKind::SmartyPants) {
            smartypants::educate(&text).into_owned()
        } else {
            text
        };
        self.do_hard_breaks(&text)
    }

    /// `` `code` `` spans.
    ///
    /// An opening run of backticks not preceded by a backslash pairs with the
    /// next run of the same length. A run without a partner stays literal.
    pub(crate) fn do_code_spans(&mut self, text: &str) -> String {
        if !text.contains('`') {
            return text.to_string();
        }
        let runs = backtick_runs(text);
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut i = 0;
        while i < runs.len() {
            let (start, len) = runs[i];
            if start < last || (start > 0 && text.as_bytes()[start - 1] == b'\\') {
                i += 1;
                continue;
            }
            let Some(j) = (i + 1..runs.len()).find(|&j| runs[j].1 == len) else {
                i += 1;
                continue;
            };
            let close = runs[j].0;
            let code = text[start + len..close].trim_matches([' ', '\t']);
            out.push_str(&text[last..start]);
            out.push_str(&format!(
                "<code{}>{}</code>",
                self.class_attr("code"),
                self.hash_code(code)
            ));
            last = close + len;
            i = j + 1;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Backslash escapes in prose; `*` and `_` hidden inside tags so the
    /// emphasis rules never see them.
    pub(crate) fn escape_special_chars(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for (token, is_markup) in tokenize_html(text) {
            if is_markup {
                out.push_str(&self.hide_emphasis(token));
            } else {
                out.push_str(&self.escapes.encode_backslash_escapes(token));
            }
        }
        out
    }

    /// Two or more spaces before a newline force a `<br />`.
    fn do_hard_breaks(&self, text: &str) -> String {
        let replacement = format!(" <br{}\n", self.empty_suffix());
        HARD_BREAK
            .replace_all(text, NoExpand(&replacement))
            .into_owned()
    }
}

/// `(offset, length)` of every maximal run of backticks.
fn backtick_runs(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let start = i;
            while i < bytes.len() && bytes[i] == b'`' {
                i += 1;
            }
            runs.push((start, i - start));
        } else {
            i += 1;
        }
    }
    runs
}

/// Encode `&` that does not start an entity, `<` that cannot start a tag and
/// `>` that cannot end one.
///
/// ```text
/// &  unless  &#?\w+;
/// <  unless  followed by [a-zA-Z/?$!]
/// >  unless  preceded by [a-zA-Z0-9?!/'"-] or a placeholder
/// ```
pub(crate) fn encode_amps_and_angles(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    let mut prev: Option<char> = None;
    for (i, c) in text.char_indices() {
        match c {
            '&' if !starts_entity(&text[i + 1..]) => out.push_str("&amp;"),
            '<' if !text[i + 1..]
                .chars()
                .next()
                .is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '?' | '$' | '!')) =>
            {
                out.push_str("&lt;")
            }
            '>' if !prev.is_some_and(|p| {
                p.is_ascii_alphanumeric()
                    || matches!(p, '?' | '!' | '/' | '\'' | '"' | '-' | '\u{3}')
            }) =>
            {
                out.push_str("&gt;")
            }
            _ => out.push(c),
        }
        prev = Some(c);
    }
    Cow::Owned(out)
}

pub(crate) fn starts_entity(rest: &str) -> bool {
    let rest = rest.strip_prefix('#').unwrap_or(rest);
    let name = rest
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(rest.len(), |(i, _)| i);
    name > 0 && rest[name..].starts_with(';')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Extra, Options};
    use crate::passes::test_support::with_conversion;

    fn spans(options: &Options, text: &str) -> String {
        with_conversion(options, |cx| {
            let out = cx.run_span_gamut(text);
            cx.unhash(&out).unwrap()
        })
    }

    #[test]
    fn code_spans_encode_and_trim() {
        assert_eq!(
            spans(&Options::new(), "use `a < b` here"),
            "use <code>a &lt; b</code> here"
        );
        assert_eq!(
            spans(&Options::new(), "``x ` y``"),
            "<code>x ` y</code>"
        );
    }

    #[test]
    fn escaped_backtick_does_not_open_a_span() {
        assert_eq!(spans(&Options::new(), r"\`not code\`"), "`not code`");
    }

    #[test]
    fn code_span_content_is_not_emphasized() {
        assert_eq!(
            spans(&Options::new(), "`*a*` *b*"),
            "<code>*a*</code> <em>b</em>"
        );
    }

    #[test]
    fn html_classes_reach_code_spans() {
        let mut classes = std::collections::BTreeMap::new();
        classes.insert("code".to_string(), "inline".to_string());
        let options = Options::new().extra(Extra::HtmlClasses(classes));
        assert_eq!(spans(&options, "`x`"), "<code class=\"inline\">x</code>");
    }

    #[test]
    fn amps_and_angles() {
        assert_eq!(encode_amps_and_angles("AT&T &amp; &#169; &copy;"), "AT&amp;T &amp; &#169; &copy;");
        assert_eq!(encode_amps_and_angles("1 < 2 > 0"), "1 &lt; 2 &gt; 0");
        assert_eq!(encode_amps_and_angles("<b>x</b>"), "<b>x</b>");
    }

    #[test]
    fn hard_breaks() {
        assert_eq!(spans(&Options::new(), "one  \ntwo"), "one <br />\ntwo");
        assert_eq!(
            spans(&Options::new().html4tags(true), "one   \ntwo"),
            "one <br>\ntwo"
        );
    }

    #[test]
    fn underscores_inside_tags_are_protected() {
        assert_eq!(
            spans(&Options::new(), "<span class=\"a_b\">_x_</span>"),
            "<span class=\"a_b\"><em>x</em></span>"
        );
    }
}
