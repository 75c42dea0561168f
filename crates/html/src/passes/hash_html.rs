//! Hiding raw and generated HTML behind block placeholders.
//!
//! Block elements are found by line scanning:
//!
//! ```text
//! strict  := ^ "<" tag \b  line* ^ "</" tag ">" [ \t]*      (closer at column 0)
//! liberal := ^ "<" tag \b  line* .* "</" tag ">" [ \t]*     (closer ends a line)
//! hr      := blank-before [ ]{0,tab-1} "<hr" \b [^<>]* "/"? ">" [ \t]* blank-after
//! comment := blank-before [ ]{0,tab-1} "<!--" .* "-->" [ \t]* blank-after
//! ```
//!
//! where `blank-before` is the start of the text or a preceding blank line and
//! `blank-after` is a following blank line or the end of the text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Conversion;
use crate::options::ExtraKind;

/// Tags hashed by the strict pass.
const STRICT_TAGS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "table", "dl", "ol",
    "ul", "script", "noscript", "form", "fieldset", "iframe", "math", "ins", "del", "address",
    "article", "aside", "audio", "canvas", "details", "figcaption", "figure", "footer", "header",
    "hgroup", "main", "nav", "section", "style", "video",
];

/// Tags hashed by the liberal pass: the strict set minus `ins` and `del`,
/// which also occur inline.
fn liberal_tag(tag: &str) -> bool {
    tag != "ins" && tag != "del" && STRICT_TAGS.contains(&tag)
}

fn strict_tag(tag: &str) -> bool {
    STRICT_TAGS.contains(&tag)
}

static SORTA_HTML: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"</?\w+(?:\s+(?:[\w-]+:)?[\w-]+=(?:".*?"|'.*?'))*\s*/?>|<\w+[^>]*>|<!--.*?-->|<\?.*?\?>"#,
    )
    .expect("valid html token pattern")
});

static MARKDOWN_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\s+markdown=(?:"1"|'1'|1)"#).expect("valid markdown attribute pattern")
});

/// Splits text into alternating prose and markup segments. The flag is true
/// for markup (tags, comments, processing instructions, `<...>` autolinks).
pub(crate) fn tokenize_html(text: &str) -> Vec<(&str, bool)> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for m in SORTA_HTML.find_iter(text) {
        tokens.push((&text[last..m.start()], false));
        tokens.push((m.as_str(), true));
        last = m.end();
    }
    tokens.push((&text[last..], false));
    tokens
}

impl Conversion<'_> {
    /// Safe mode only: hide every inline tag, sanitized, behind a span key.
    /// `<http://...>` and `<user@host>` autolinks are left for the link pass.
    pub(crate) fn hash_html_spans(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for (token, is_markup) in tokenize_html(text) {
            if is_markup && !super::links::is_auto_link(token) {
                let sanitized = self.sanitize(token);
                out.push_str(&self.spans.insert(sanitized));
            } else {
                out.push_str(token);
            }
        }
        out
    }

    /// Hash block-level HTML. `raw` is set for the pass over the source, where
    /// safe mode sanitizes what gets stored.
    pub(crate) fn hash_html_blocks(&mut self, text: &str, raw: bool) -> String {
        if !text.contains('<') {
            return text.to_string();
        }
        let mut text = self.hash_tag_blocks(text, raw, strict_tag, find_strict_close);
        text = self.hash_tag_blocks(&text, raw, liberal_tag, find_liberal_close);
        if text.contains("<hr") {
            text = self.hash_isolated(&text, raw, hr_tag_end);
        }
        if text.contains("<!--") {
            text = self.hash_standalone_comments(text, raw);
        }
        if self.has(ExtraKind::Xml) {
            text = self.hash_isolated(&text, raw, xml_oneliner_end);
        }
        text
    }

    fn hash_tag_blocks(
        &mut self,
        text: &str,
        raw: bool,
        accepts: fn(&str) -> bool,
        find_close: fn(&str, usize, &str) -> Option<usize>,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut line_start = 0;
        while line_start < text.len() {
            let mut next = next_line_start(text, line_start);
            if let Some(tag) = block_tag_at(text, line_start)
                && accepts(tag)
                && let Some(end) = find_close(text, line_start, tag)
            {
                out.push_str(&text[last..line_start]);
                let replacement = self.hash_block(&text[line_start..end], raw);
                out.push_str(&replacement);
                last = end;
                next = next_line_start(text, end);
            }
            line_start = next;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Hash constructs that must sit on their own paragraph.
    fn hash_isolated(
        &mut self,
        text: &str,
        raw: bool,
        match_end: fn(&str, usize, usize) -> Option<usize>,
    ) -> String {
        let max_indent = self.options.tab_width.saturating_sub(1);
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut line_start = 0;
        while line_start < text.len() {
            let mut next = next_line_start(text, line_start);
            if line_start >= last
                && after_blank_line(text, line_start)
                && let Some(end) = match_end(text, line_start, max_indent)
            {
                out.push_str(&text[last..line_start]);
                let replacement = self.hash_block(&text[line_start..end], raw);
                out.push_str(&replacement);
                last = end;
                next = next_line_start(text, end);
            }
            line_start = next;
        }
        out.push_str(&text[last..]);
        out
    }

    fn hash_standalone_comments(&mut self, mut text: String, raw: bool) -> String {
        let max_indent = self.options.tab_width.saturating_sub(1);
        let mut search_from = 0;
        while let Some(found) = text[search_from..].find("<!--") {
            let mut start = search_from + found;
            let Some(close) = text[start..].find("-->") else {
                break;
            };
            let mut end = start + close + 3;
            search_from = end;

            let bytes = text.as_bytes();
            let mut indent = 0;
            while indent < max_indent && start > 0 && bytes[start - 1] == b' ' {
                start -= 1;
                indent += 1;
            }
            let isolated_before = start == 0
                || (start == 1 && bytes[0] == b'\n')
                || text[..start].ends_with("\n\n");
            if !isolated_before {
                continue;
            }
            if start == 1 {
                start = 0;
            }

            while end < bytes.len() && matches!(bytes[end], b' ' | b'\t') {
                end += 1;
            }
            let after = &text[end..];
            if !(after.is_empty() || after == "\n" || after.starts_with("\n\n")) {
                continue;
            }

            let mut html = text[start..end].to_string();
            if raw && self.options.safe_mode.is_some() {
                html = self.sanitize(&html);
            }
            let key = self.blocks.insert(html);
            let replacement = format!("\n\n{}\n\n", key);
            search_from = start + replacement.len();
            text.replace_range(start..end, &replacement);
        }
        text
    }

    /// Store one block and return its replacement text.
    fn hash_block(&mut self, html: &str, raw: bool) -> String {
        if raw && self.options.safe_mode.is_some() {
            let sanitized = self.sanitize(html);
            return format!("\n\n{}\n\n", self.blocks.insert(sanitized));
        }
        if self.has(ExtraKind::MarkdownInHtml)
            && html.contains("markdown=")
            && let Some(split) = self.split_markdown_block(html)
        {
            return split;
        }
        format!("\n\n{}\n\n", self.blocks.insert(html))
    }

    /// `<div markdown="1">` blocks: hash the first and last lines only, so the
    /// body is processed as Markdown.
    fn split_markdown_block(&mut self, html: &str) -> Option<String> {
        let (first_line, rest) = html.split_once('\n')?;
        let attr = MARKDOWN_ATTR.find(first_line)?;
        let (middle, last_line) = rest.rsplit_once('\n').unwrap_or(("", rest));
        let opening = format!("{}{}", &first_line[..attr.start()], &first_line[attr.end()..]);
        let open_key = self.blocks.insert(opening);
        let close_key = self.blocks.insert(last_line);
        Some(format!(
            "\n\n{}\n\n{}\n\n{}\n\n",
            open_key, middle, close_key
        ))
    }
}

/// Name of a block tag opening at `pos`, if the text there is `<name` followed
/// by a non-word character.
fn block_tag_at(text: &str, pos: usize) -> Option<&str> {
    let rest = text[pos..].strip_prefix('<')?;
    let len = rest
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map_or(rest.len(), |(i, _)| i);
    (len > 0).then(|| &rest[..len])
}

/// Column-0 closer that balances the opener. Same-tag elements opened and
/// closed in between are counted, so an inner block closed at column 0
/// does not end the outer one.
fn find_strict_close(text: &str, open: usize, tag: &str) -> Option<usize> {
    let closer = format!("</{}>", tag);
    let first_end = line_end(text, open);
    let (opens, closes) = tag_balance(&text[open + 1 + tag.len()..first_end], tag);
    let mut depth = (1 + opens).saturating_sub(closes).max(1);
    let mut line_start = first_end.checked_add(1).filter(|&at| at <= text.len())?;
    while line_start <= text.len() {
        let line_end = line_end(text, line_start);
        let line = &text[line_start..line_end];
        if let Some(rest) = line.strip_prefix(closer.as_str())
            && is_blank(rest)
        {
            if depth == 1 {
                return Some(line_end);
            }
            depth -= 1;
        } else {
            let (opens, closes) = tag_balance(line, tag);
            depth = (depth + opens).saturating_sub(closes).max(1);
        }
        if line_end == text.len() {
            break;
        }
        line_start = line_end + 1;
    }
    None
}

/// Counts `<tag ...>` openers and `</tag>` closers in `line`.
fn tag_balance(line: &str, tag: &str) -> (usize, usize) {
    let closer = format!("</{}>", tag);
    let opener = format!("<{}", tag);
    let closes = line.matches(closer.as_str()).count();
    let opens = line
        .match_indices(opener.as_str())
        .filter(|(at, _)| {
            let after = &line[at + opener.len()..];
            !after.starts_with(is_word_char) && !after.starts_with(['-', ':'])
        })
        .count();
    (opens, closes)
}

fn find_liberal_close(text: &str, open: usize, tag: &str) -> Option<usize> {
    let closer = format!("</{}>", tag);
    let earliest = open + 1 + tag.len();
    let mut line_start = open;
    loop {
        let line_end = line_end(text, line_start);
        let trimmed = text[line_start..line_end].trim_end_matches([' ', '\t']);
        if trimmed.ends_with(closer.as_str()) && line_start + trimmed.len() - closer.len() >= earliest
        {
            return Some(line_end);
        }
        if line_end == text.len() {
            return None;
        }
        line_start = line_end + 1;
    }
}

/// `<hr ...>` alone on its paragraph.
fn hr_tag_end(text: &str, pos: usize, max_indent: usize) -> Option<usize> {
    let start = skip_indent(text, pos, max_indent);
    let rest = text[start..].strip_prefix("<hr")?;
    if rest.chars().next().is_some_and(is_word_char) {
        return None;
    }
    let close = rest.find(['<', '>'])?;
    if rest.as_bytes()[close] != b'>' {
        return None;
    }
    isolated_end(text, start + 3 + close + 1)
}

/// `<?pi ...?>` or `<ns:tag ... />` alone on its paragraph.
fn xml_oneliner_end(text: &str, pos: usize, max_indent: usize) -> Option<usize> {
    let start = skip_indent(text, pos, max_indent);
    let rest = &text[start..];
    let (head_len, terminator) = if let Some(after) = rest.strip_prefix("<?") {
        (2 + word_len(after), "?>")
    } else {
        let after = rest.strip_prefix('<')?;
        let prefix = word_len(after);
        let local = after[prefix..].strip_prefix(':').map(word_len)?;
        if prefix == 0 || local == 0 {
            return None;
        }
        (1 + prefix + 1 + local, "/>")
    };
    if head_len <= 2 {
        return None;
    }
    let after_head = &rest[head_len..];
    let ws = after_head.len() - after_head.trim_start().len();
    if ws == 0 {
        return None;
    }
    let body_start = start + head_len + ws;
    let line_end = line_end(text, body_start);
    let mut from = body_start;
    while let Some(found) = text[from..line_end].find(terminator) {
        let end = from + found + terminator.len();
        if let Some(end) = isolated_end(text, end) {
            return Some(end);
        }
        from = from + found + 1;
    }
    None
}

/// Consumes trailing blanks after `pos`; succeeds at a blank line or the end.
fn isolated_end(text: &str, pos: usize) -> Option<usize> {
    let rest = &text[pos..];
    let end = pos + (rest.len() - rest.trim_start_matches([' ', '\t']).len());
    let after = &text[end..];
    (after.is_empty() || after.starts_with("\n\n")).then_some(end)
}

fn after_blank_line(text: &str, pos: usize) -> bool {
    pos == 0 || (pos == 1 && text.starts_with('\n')) || text[..pos].ends_with("\n\n")
}

fn skip_indent(text: &str, pos: usize, max: usize) -> usize {
    pos + text[pos..].bytes().take(max).take_while(|b| *b == b' ').count()
}

fn word_len(text: &str) -> usize {
    text.char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map_or(text.len(), |(i, _)| i)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_blank(text: &str) -> bool {
    text.bytes().all(|b| b == b' ' || b == b'\t')
}

fn line_end(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map_or(text.len(), |i| pos + i)
}

fn next_line_start(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map_or(text.len(), |i| pos + i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Extra, Options, SafeMode};
    use crate::passes::test_support::with_conversion;

    fn hashed(options: &Options, text: &str) -> (String, Vec<String>) {
        with_conversion(options, |cx| {
            let out = cx.hash_html_blocks(text, true);
            let stored = out
                .split("\n\n")
                .filter_map(|part| cx.blocks.get(part).map(str::to_string))
                .collect();
            (out, stored)
        })
    }

    #[test]
    fn strict_block_with_nested_indented_div() {
        let text = "<div>\n  <div>\n  inner\n  </div>\n</div>\n\nafter\n";
        let (out, stored) = hashed(&Options::new(), text);
        assert_eq!(stored, vec!["<div>\n  <div>\n  inner\n  </div>\n</div>"]);
        assert!(out.ends_with("\n\nafter\n"));
    }

    #[test]
    fn strict_block_with_unindented_inner_div() {
        let text = "<div>\n<div>\ninner *x*\n</div>\nmore *y*\n</div>\n\nafter\n";
        let (out, stored) = hashed(&Options::new(), text);
        assert_eq!(
            stored,
            vec!["<div>\n<div>\ninner *x*\n</div>\nmore *y*\n</div>"]
        );
        assert!(out.ends_with("\n\nafter\n"));
    }

    #[test]
    fn inner_block_closed_on_its_own_line_counts_once() {
        let text = "<div>\n<div>inner</div>\n</div>\n";
        let (_, stored) = hashed(&Options::new(), text);
        assert_eq!(stored, vec!["<div>\n<div>inner</div>\n</div>"]);
    }

    #[test]
    fn liberal_block_on_one_line() {
        let (_, stored) = hashed(&Options::new(), "<p>one <b>line</b></p>\n");
        assert_eq!(stored, vec!["<p>one <b>line</b></p>"]);
    }

    #[test]
    fn unclosed_block_falls_through() {
        let (out, stored) = hashed(&Options::new(), "<div>\nnever closed\n");
        assert!(stored.is_empty());
        assert_eq!(out, "<div>\nnever closed\n");
    }

    #[test]
    fn inline_tags_are_not_blocks() {
        let (out, stored) = hashed(&Options::new(), "<span>x</span>\n");
        assert!(stored.is_empty());
        assert_eq!(out, "<span>x</span>\n");
    }

    #[test]
    fn standalone_hr_and_comment() {
        let (_, stored) = hashed(&Options::new(), "a\n\n<hr/>\n\n<!-- note -->\n\nb\n");
        assert_eq!(stored, vec!["<hr/>", "<!-- note -->"]);
    }

    #[test]
    fn comment_inside_paragraph_is_left_alone() {
        let (_, stored) = hashed(&Options::new(), "text <!-- x --> more\n\n");
        assert!(stored.is_empty());
    }

    #[test]
    fn safe_mode_stores_sanitized_blocks() {
        let options = Options::new().safe_mode(SafeMode::Escape);
        let (_, stored) = hashed(&options, "<div>\n<b>x</b>\n</div>\n");
        assert_eq!(stored, vec!["&lt;div&gt;\n&lt;b&gt;x&lt;/b&gt;\n&lt;/div&gt;"]);
    }

    #[test]
    fn xml_oneliners_with_extra() {
        let options = Options::new().extra(Extra::Xml);
        let (_, stored) = hashed(&options, "<?php echo 1; ?>\n\n<xi:include href=\"a.md\"/>\n\n");
        assert_eq!(stored, vec!["<?php echo 1; ?>", "<xi:include href=\"a.md\"/>"]);
    }

    #[test]
    fn markdown_in_html_keeps_body_as_text() {
        let options = Options::new().extra(Extra::MarkdownInHtml);
        let (out, stored) = hashed(&options, "<div markdown=\"1\">\n*hi*\n</div>\n");
        assert_eq!(stored, vec!["<div>", "</div>"]);
        assert!(out.contains("\n\n*hi*\n\n"));
    }

    #[test]
    fn tokenizer_separates_markup() {
        let tokens = tokenize_html("a <b class=\"x\">b</b> <!-- c --> <http://x.y>");
        let markup: Vec<&str> = tokens
            .iter()
            .filter(|(_, is_markup)| *is_markup)
            .map(|(t, _)| *t)
            .collect();
        assert_eq!(markup, vec!["<b class=\"x\">", "</b>", "<!-- c -->", "<http://x.y>"]);
    }
}
