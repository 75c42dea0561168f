//! Links, images, footnote references and auto-links.
//!
//! ```text
//! inline    := "[" text "](" [ \t]* url ([ \t]+ quote title quote)? ")"
//! reference := "[" text "]" " "? ("\n" " "*)? "[" id "]"
//! image     := "!" (inline | reference)
//! footnote  := "[^" id "]"
//! ```
//!
//! Link text is found by bracket matching, bounded to a few thousand bytes.
//! The generated `<a>` opener is re-scanned so images inside link text still
//! render, but no anchor may start inside another anchor.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::{Captures, Regex};

use marksmith_core::ConversionWarning;

use super::Conversion;
use super::spans::starts_entity;
use crate::options::ExtraKind;

/// Longest link text considered.
const MAX_LINK_TEXT: usize = 3000;

static AUTO_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<((?:https?|ftp):[^'">\s]+)>"#).expect("valid auto-link pattern")
});

static AUTO_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(?:mailto:)?([-.\w\x{2}\x{3}]+@[-\w]+(?:\.[-\w]+)*\.[a-z]+)>")
        .expect("valid auto-email pattern")
});

static URL_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("valid scheme pattern"));

const SAFE_SCHEMES: &[&str] = &["http:", "https:", "ftp:", "mailto:"];

/// Returns true if `token` is a `<scheme:...>` or `<user@host>` auto-link.
pub(crate) fn is_auto_link(token: &str) -> bool {
    let at_start = |re: &Regex| re.find(token).is_some_and(|m| m.start() == 0);
    at_start(&AUTO_LINK) || at_start(&AUTO_EMAIL)
}

/// The parenthesized tail of an inline link.
struct InlineTail<'t> {
    url: &'t str,
    title: Option<&'t str>,
    end: usize,
}

/// The bracketed tail of a reference link.
struct ReferenceTail<'t> {
    id: &'t str,
    end: usize,
}

impl Conversion<'_> {
    /// Inline and reference links and images, plus footnote references.
    pub(crate) fn do_links(&mut self, text: &str) -> String {
        let mut text = text.to_string();
        let mut anchor_allowed_pos = 0;
        let mut curr_pos = 0;

        while let Some(found) = text[curr_pos..].find('[') {
            let mut start = curr_pos + found;
            let Some(close) = matching_bracket(&text, start) else {
                curr_pos = start + 1;
                continue;
            };
            let link_text = text[start + 1..close].to_string();

            if self.has(ExtraKind::Footnotes)
                && let Some(raw_id) = link_text.strip_prefix('^')
            {
                let id = footnote_id(raw_id);
                if self.footnotes.contains_key(&id) {
                    let reference = self.footnote_reference(&id);
                    text.replace_range(start..close + 1, &reference);
                } else {
                    self.warn(ConversionWarning::UndefinedFootnote { id });
                    curr_pos = close + 1;
                }
                continue;
            }

            let tail_start = close + 1;
            if tail_start == text.len() {
                break;
            }

            let is_img = start > 0 && text.as_bytes()[start - 1] == b'!';

            if text.as_bytes()[tail_start] == b'(' {
                if let Some(tail) = inline_tail(&text, tail_start) {
                    if is_img {
                        start -= 1;
                    }
                    let url = match tail.url.strip_prefix('<') {
                        Some(inner) => inner.strip_suffix('>').unwrap_or(inner),
                        None => tail.url,
                    };
                    let url = self.hide_emphasis(url);
                    let title = tail.title.map(|title| self.hide_emphasis(&escape_attr(title)));
                    let end = tail.end;
                    if is_img {
                        let result = self.image_tag(&url, &link_text, title.as_deref());
                        curr_pos = start + result.len();
                        text.replace_range(start..end, &result);
                    } else if start >= anchor_allowed_pos {
                        let (head, result) = self.anchor(&url, &link_text, title.as_deref());
                        curr_pos = start + head;
                        anchor_allowed_pos = start + result.len();
                        text.replace_range(start..end, &result);
                    } else {
                        curr_pos = start + 1;
                    }
                    continue;
                }
            } else if let Some(tail) = reference_tail(&text, tail_start) {
                if is_img {
                    start -= 1;
                }
                let id = if tail.id.is_empty() {
                    link_text.to_lowercase()
                } else {
                    tail.id.to_lowercase()
                };
                let end = tail.end;
                let Some(url) = self.urls.get(&id) else {
                    self.warn(ConversionWarning::UnresolvedReference { label: id });
                    curr_pos = end;
                    continue;
                };
                let url = self.hide_emphasis(url);
                let title = self
                    .titles
                    .get(&id)
                    .map(|title| self.hide_emphasis(&escape_attr(title)));
                if is_img {
                    let result = self.image_tag(&url, &link_text, title.as_deref());
                    curr_pos = start + result.len();
                    text.replace_range(start..end, &result);
                } else if start >= anchor_allowed_pos {
                    let (head, result) = self.anchor(&url, &link_text, title.as_deref());
                    curr_pos = start + head;
                    anchor_allowed_pos = start + result.len();
                    text.replace_range(start..end, &result);
                } else {
                    curr_pos = start + 1;
                }
                continue;
            }

            curr_pos = start + 1;
        }
        text
    }

    /// `<a href>` opener length and the full element.
    fn anchor(&self, url: &str, link_text: &str, title: Option<&str>) -> (usize, String) {
        let title_attr = title.map(|t| format!(" title=\"{}\"", t)).unwrap_or_default();
        let head = format!("<a href=\"{}\"{}>", self.escape_url(url), title_attr);
        let result = self.protect_quotes(format!("{}{}</a>", head, link_text));
        let head_len = self.protect_quotes(head).len();
        (head_len, result)
    }

    fn image_tag(&self, url: &str, alt: &str, title: Option<&str>) -> String {
        let title_attr = title.map(|t| format!(" title=\"{}\"", t)).unwrap_or_default();
        self.protect_quotes(format!(
            "<img src=\"{}\" alt=\"{}\"{}{}{}",
            self.escape_url(url),
            escape_attr(alt),
            title_attr,
            self.class_attr("img"),
            self.empty_suffix()
        ))
    }

    /// With smart punctuation on, quotes in generated markup are hidden.
    fn protect_quotes(&self, html: String) -> String {
        if self.has(ExtraKind::SmartyPants) {
            self.escapes.hide(&html, &['"'])
        } else {
            html
        }
    }

    /// Attribute-escape a URL; in safe mode, unknown schemes become `#`.
    fn escape_url(&self, url: &str) -> String {
        if self.options.safe_mode.is_none() {
            return url.replace('"', "&quot;");
        }
        if let Some(scheme) = URL_SCHEME.find(url)
            && !SAFE_SCHEMES
                .iter()
                .any(|safe| scheme.as_str().eq_ignore_ascii_case(safe))
        {
            return "#".to_string();
        }
        url.replace('"', "&quot;")
            .replace('+', " ")
            .replace('\'', "&#39;")
    }

    /// `<sup>` reference for a defined footnote, numbered by first use.
    fn footnote_reference(&mut self, id: &str) -> String {
        let number = match self.footnote_ids.iter().position(|known| known == id) {
            Some(index) => index + 1,
            None => {
                self.footnote_ids.push(id.to_string());
                self.footnote_ids.len()
            }
        };
        let ref_id = self.footnote_ref_id(id);
        format!(
            "<sup class=\"footnote-ref\" id=\"{}\"><a href=\"#fn-{}\">{}</a></sup>",
            ref_id, id, number
        )
    }

    /// `<http://...>` and `<user@host>` auto-links.
    pub(crate) fn do_auto_links(&mut self, text: &str) -> String {
        if !text.contains('<') {
            return text.to_string();
        }
        let text = AUTO_LINK.replace_all(text, |caps: &Captures<'_>| {
            format!("<a href=\"{0}\">{0}</a>", &caps[1])
        });
        if !AUTO_EMAIL.is_match(&text) {
            return text.into_owned();
        }
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in AUTO_EMAIL.captures_iter(&text) {
            let (Some(whole), Some(addr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            let addr = self.escapes.restore(addr.as_str());
            out.push_str(&self.encode_email_address(&addr));
            last = whole.end();
        }
        out.push_str(&text[last..]);
        out
    }

    /// Obfuscated `mailto:` anchor: each character randomly raw, hex or
    /// decimal entity; `@` and `_` always encoded.
    fn encode_email_address(&mut self, addr: &str) -> String {
        let encoded: Vec<String> = "mailto:"
            .chars()
            .chain(addr.chars())
            .map(|c| {
                let roll: f64 = self.rng.random();
                if roll > 0.9 && c != '@' && c != '_' {
                    c.to_string()
                } else if roll < 0.45 {
                    format!("&#x{:x};", c as u32)
                } else {
                    format!("&#{};", c as u32)
                }
            })
            .collect();
        format!(
            "<a href=\"{}\">{}</a>",
            encoded.concat(),
            encoded[7..].concat()
        )
    }
}

/// Footnote ids: non-word characters become `-`. Case is kept, unlike
/// link labels.
pub(crate) fn footnote_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '-' })
        .collect()
}

/// Position of the `]` closing the `[` at `open`.
fn matching_bracket(text: &str, open: usize) -> Option<usize> {
    let limit = (open + MAX_LINK_TEXT).min(text.len());
    let mut depth = 0usize;
    for (offset, b) in text.as_bytes()[open + 1..limit].iter().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' if depth == 0 => return Some(open + 1 + offset),
            b']' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// `( url "title" )` starting at the `(` at `open`. The URL is the shortest
/// text after which an optional quoted title and `)` follow; a `<...>` URL is
/// tried first.
fn inline_tail(text: &str, open: usize) -> Option<InlineTail<'_>> {
    let rest = &text[open + 1..];
    let url_start = open + 1 + (rest.len() - rest.trim_start_matches([' ', '\t']).len());
    if !text[url_start..].contains(')') {
        return None;
    }

    if text[url_start..].starts_with('<') {
        let mut from = url_start + 1;
        while let Some(gt) = text[from..].find('>') {
            let url_end = from + gt + 1;
            if let Some((title, end)) = title_and_paren(text, url_end) {
                return Some(InlineTail {
                    url: &text[url_start..url_end],
                    title,
                    end,
                });
            }
            from = url_end;
        }
    }

    for (offset, _) in text[url_start..].char_indices() {
        let url_end = url_start + offset;
        if let Some((title, end)) = title_and_paren(text, url_end) {
            return Some(InlineTail {
                url: &text[url_start..url_end],
                title,
                end,
            });
        }
    }
    None
}

/// `([ \t]+ quote title quote)? ")"` at `pos`.
fn title_and_paren(text: &str, pos: usize) -> Option<(Option<&str>, usize)> {
    let rest = &text[pos..];
    let trimmed = rest.trim_start_matches([' ', '\t']);
    let gap = rest.len() - trimmed.len();
    if gap > 0
        && let Some(quote) = trimmed.chars().next().filter(|c| *c == '"' || *c == '\'')
    {
        let body_start = pos + gap + 1;
        let closer = format!("{})", quote);
        if let Some(found) = text[body_start..].find(&closer) {
            let title = &text[body_start..body_start + found];
            return Some((Some(title), body_start + found + 2));
        }
    }
    rest.starts_with(')').then_some((None, pos + 1))
}

/// `" "? ("\n" " "*)? "[" id "]"` at `pos`.
fn reference_tail(text: &str, pos: usize) -> Option<ReferenceTail<'_>> {
    let mut cursor = pos;
    if text[cursor..].starts_with(' ') {
        cursor += 1;
    }
    if text[cursor..].starts_with('\n') {
        cursor += 1;
        cursor += text[cursor..].bytes().take_while(|b| *b == b' ').count();
    }
    let id_start = cursor + 1;
    if !text[cursor..].starts_with('[') {
        return None;
    }
    let close = text[id_start..].find(']')?;
    Some(ReferenceTail {
        id: &text[id_start..id_start + close],
        end: id_start + close + 1,
    })
}

/// Escape a value for a double-quoted attribute, leaving entities alone.
pub(crate) fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.char_indices() {
        match c {
            '&' if !starts_entity(&value[i + 1..]) => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Extra, Options, SafeMode};
    use crate::passes::test_support::with_conversion;

    fn links(options: &Options, text: &str, setup: impl FnOnce(&mut Conversion<'_>)) -> String {
        with_conversion(options, |cx| {
            setup(cx);
            let out = cx.do_links(text);
            cx.unhash(&out).unwrap()
        })
    }

    #[test]
    fn inline_link_with_title() {
        assert_eq!(
            links(&Options::new(), "[x](http://a.b/ \"T\")", |_| {}),
            "<a href=\"http://a.b/\" title=\"T\">x</a>"
        );
    }

    #[test]
    fn angle_bracket_url_and_parens_in_text() {
        assert_eq!(
            links(&Options::new(), "see [a (b)](<http://x.y/a b>).", |_| {}),
            "see <a href=\"http://x.y/a b\">a (b)</a>."
        );
    }

    #[test]
    fn inline_image() {
        assert_eq!(
            links(&Options::new(), "![a \"q\"](/i.png)", |_| {}),
            "<img src=\"/i.png\" alt=\"a &quot;q&quot;\" />"
        );
    }

    #[test]
    fn image_inside_link_text() {
        assert_eq!(
            links(&Options::new(), "[![i](/i.png)](/to)", |_| {}),
            "<a href=\"/to\"><img src=\"/i.png\" alt=\"i\" /></a>"
        );
    }

    #[test]
    fn reference_links_resolve_case_insensitively() {
        let out = links(&Options::new(), "[Go][ID] and [id][]", |cx| {
            cx.urls.insert("id".into(), "http://g.co".into());
            cx.titles.insert("id".into(), "G".into());
        });
        assert_eq!(
            out,
            "<a href=\"http://g.co\" title=\"G\">Go</a> and <a href=\"http://g.co\" title=\"G\">id</a>"
        );
    }

    #[test]
    fn unresolved_reference_stays_literal_and_warns() {
        let (out, warnings) = with_conversion(&Options::new(), |cx| {
            let out = cx.do_links("[a][missing]");
            (out, cx.diagnostics.warnings.clone())
        });
        assert_eq!(out, "[a][missing]");
        assert_eq!(
            warnings,
            vec![ConversionWarning::UnresolvedReference { label: "missing".into() }]
        );
    }

    #[test]
    fn footnote_references_share_numbers() {
        let options = Options::new().extra(Extra::Footnotes);
        let out = links(&options, "a[^n] b[^n]", |cx| {
            cx.footnotes.insert("n".into(), "body".into());
        });
        assert_eq!(
            out,
            "a<sup class=\"footnote-ref\" id=\"fnref-n\"><a href=\"#fn-n\">1</a></sup> \
             b<sup class=\"footnote-ref\" id=\"fnref-n-2\"><a href=\"#fn-n\">1</a></sup>"
        );
    }

    #[test]
    fn undefined_footnote_is_literal() {
        let options = Options::new().extra(Extra::Footnotes);
        assert_eq!(links(&options, "x[^1]", |_| {}), "x[^1]");
    }

    #[test]
    fn footnote_ids_keep_their_case() {
        let options = Options::new().extra(Extra::Footnotes);
        let out = links(&options, "a[^X] b[^x]", |cx| {
            cx.footnotes.insert("x".into(), "body".into());
        });
        assert!(out.starts_with("a[^X] b<sup"));
        assert_eq!(footnote_id("Big Note"), "Big-Note");
    }

    #[test]
    fn safe_mode_neutralizes_scripts_in_urls() {
        let options = Options::new().safe_mode(SafeMode::Escape);
        assert_eq!(
            links(&options, "[x](javascript:alert(1))", |_| {}),
            "<a href=\"#\">x</a>)"
        );
    }

    #[test]
    fn auto_links() {
        let out = with_conversion(&Options::new(), |cx| cx.do_auto_links("<http://a.b/c>"));
        assert_eq!(out, "<a href=\"http://a.b/c\">http://a.b/c</a>");
    }

    #[test]
    fn email_is_obfuscated_but_decodes() {
        let out = with_conversion(&Options::new(), |cx| cx.do_auto_links("<mailto:me@x.org>"));
        assert!(!out.contains("me@x.org"));
        let decoded = html_escape::decode_html_entities(&out);
        assert_eq!(decoded, "<a href=\"mailto:me@x.org\">me@x.org</a>");
    }

    #[test]
    fn auto_link_detection() {
        assert!(is_auto_link("<https://x.y>"));
        assert!(is_auto_link("<a@b.co>"));
        assert!(!is_auto_link("<b>"));
    }
}
