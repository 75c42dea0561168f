//! Reference definitions: footnote bodies and link targets are moved out of
//! the flowing text into the conversion's tables.
//!
//! ```text
//! footnote := ^ [ ]{0,tab-1} "[^" id "]:" [ \t]* \s* line "\n"+ (indented-line "\n"+)*
//! link     := ^ [ ]{0,tab-1} "[" id "]:" [ \t]* "\n"? [ \t]* "<"? url ">"? [ \t]*
//!             ("\n"? [ \t]* quote title quote [ \t]*)? ("\n"+ | end)
//! ```
//!
//! Footnotes are stripped first: `[^id]: body` would also read as a link
//! definition. A later definition of the same label replaces an earlier one.

use marksmith_core::normalize::dedent;

use super::Conversion;
use super::links::footnote_id;
use super::spans::encode_amps_and_angles;

struct LinkDefinition<'t> {
    id: &'t str,
    url: &'t str,
    title: Option<&'t str>,
    end: usize,
}

impl Conversion<'_> {
    /// Removes `[^id]: ...` definitions, recording their bodies.
    pub(crate) fn strip_footnote_definitions(&mut self, text: &str) -> String {
        let max_indent = self.options.tab_width.saturating_sub(1);
        let tab_width = self.options.tab_width;
        self.strip_lines(text, |cx, text, line_start| {
            let (id, body, end) = footnote_definition_at(text, line_start, max_indent, tab_width)?;
            let skip_first_line = !body.starts_with('\n');
            let body = format!("{}\n\n", dedent(body, skip_first_line).trim());
            cx.footnotes.insert(footnote_id(id), body);
            Some(end)
        })
    }

    /// Removes `[id]: url "title"` definitions, recording their targets.
    pub(crate) fn strip_link_definitions(&mut self, text: &str) -> String {
        let max_indent = self.options.tab_width.saturating_sub(1);
        self.strip_lines(text, |cx, text, line_start| {
            let def = link_definition_at(text, line_start, max_indent)?;
            let key = def.id.to_lowercase();
            cx.urls
                .insert(key.clone(), encode_amps_and_angles(def.url).into_owned());
            match def.title {
                Some(title) if !title.is_empty() => {
                    cx.titles.insert(key, title.to_string());
                }
                _ => {
                    cx.titles.remove(&key);
                }
            }
            Some(def.end)
        })
    }

    /// Visit every line start; where `strip` consumes a definition, drop the
    /// text up to the offset it returns.
    fn strip_lines<F>(&mut self, text: &str, mut strip: F) -> String
    where
        F: FnMut(&mut Self, &str, usize) -> Option<usize>,
    {
        if !text.contains("]:") {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut line_start = 0;
        while line_start < text.len() {
            if let Some(end) = strip(self, text, line_start) {
                line_start = end;
                continue;
            }
            let next = text[line_start..]
                .find('\n')
                .map_or(text.len(), |i| line_start + i + 1);
            out.push_str(&text[line_start..next]);
            line_start = next;
        }
        out
    }
}

/// Leading spaces (at most `max`) then `open`; returns the offset after it.
fn definition_opener(text: &str, line_start: usize, max: usize, open: &str) -> Option<usize> {
    let indent = text[line_start..]
        .bytes()
        .take(max + 1)
        .take_while(|b| *b == b' ')
        .count();
    if indent > max {
        return None;
    }
    let at = line_start + indent;
    text[at..].starts_with(open).then_some(at + open.len())
}

fn footnote_definition_at(
    text: &str,
    line_start: usize,
    max_indent: usize,
    tab_width: usize,
) -> Option<(&str, &str, usize)> {
    let id_start = definition_opener(text, line_start, max_indent, "[^")?;
    let line_end = line_end(text, id_start);
    let marker = text[id_start..line_end].rfind("]:")?;
    if marker == 0 {
        return None;
    }
    let id = &text[id_start..id_start + marker];

    let after_marker = id_start + marker + 2;
    let body_start = after_marker + leading_blanks(&text[after_marker..]);

    // First line: any whitespace (blank lines included), one line, newlines.
    let first = body_start + (text[body_start..].len() - text[body_start..].trim_start().len());
    let first_end = text[first..].find('\n').map(|i| first + i)?;
    let mut cursor = skip_newlines(text, first_end);

    let indent = " ".repeat(tab_width);
    while cursor < text.len()
        && (text[cursor..].starts_with(indent.as_str()) || text[cursor..].starts_with('\t'))
    {
        let Some(nl) = text[cursor..].find('\n') else {
            break;
        };
        cursor = skip_newlines(text, cursor + nl);
    }

    Some((id, &text[body_start..cursor], cursor))
}

fn link_definition_at(text: &str, line_start: usize, max_indent: usize) -> Option<LinkDefinition<'_>> {
    let id_start = definition_opener(text, line_start, max_indent, "[")?;
    let line_end = line_end(text, id_start);
    let line = &text[id_start..line_end];

    // The label is greedy: try the last `]:` first.
    let markers: Vec<usize> = line.match_indices("]:").map(|(i, _)| i).collect();
    for &marker in markers.iter().rev() {
        if marker == 0 {
            continue;
        }
        let id = &line[..marker];
        if let Some((url, title, end)) = link_target(text, id_start + marker + 2) {
            return Some(LinkDefinition { id, url, title, end });
        }
    }
    None
}

/// URL and optional title after the `]:` at `pos`.
fn link_target(text: &str, pos: usize) -> Option<(&str, Option<&str>, usize)> {
    let mut cursor = pos + leading_blanks(&text[pos..]);
    if text[cursor..].starts_with('\n') {
        cursor += 1;
    }
    cursor += leading_blanks(&text[cursor..]);

    let mut starts = vec![cursor];
    if text[cursor..].starts_with('<') {
        starts.insert(0, cursor + 1);
    }
    for url_start in starts {
        let line_end = line_end(text, url_start);
        // Shortest URL after which the rest of the definition fits.
        for (offset, c) in text[url_start..line_end].char_indices() {
            if c.is_whitespace() {
                break;
            }
            let url_end = url_start + offset + c.len_utf8();
            if let Some((title, end)) = link_tail(text, url_end) {
                return Some((&text[url_start..url_end], title, end));
            }
        }
    }
    None
}

/// `">"? [ \t]* title? ("\n"+ | end)` at `pos`.
fn link_tail(text: &str, pos: usize) -> Option<(Option<&str>, usize)> {
    let mut cursor = pos;
    if text[cursor..].starts_with('>') {
        cursor += 1;
    }
    cursor += leading_blanks(&text[cursor..]);

    if let Some(found) = link_title(text, cursor) {
        return Some(found);
    }
    definition_end(text, cursor).map(|end| (None, end))
}

fn link_title(text: &str, pos: usize) -> Option<(Option<&str>, usize)> {
    let mut cursor = pos;
    if text[cursor..].starts_with('\n') {
        cursor += 1;
    }
    cursor += leading_blanks(&text[cursor..]);
    let preceded_by_space = text[..cursor].chars().next_back().is_some_and(char::is_whitespace);
    if !preceded_by_space || !text[cursor..].starts_with(['\'', '"', '(']) {
        return None;
    }
    let title_start = cursor + 1;
    let line_end = line_end(text, title_start);
    // Greedy title: the last closing quote that still ends the definition.
    let closers = text[title_start..line_end]
        .match_indices(['\'', '"', ')'])
        .map(|(i, _)| title_start + i)
        .collect::<Vec<_>>();
    closers.into_iter().rev().find_map(|close| {
        let after = close + 1;
        let after = after + leading_blanks(&text[after..]);
        definition_end(text, after).map(|end| (Some(&text[title_start..close]), end))
    })
}

/// Consumes a run of newlines, or accepts the end of the text.
fn definition_end(text: &str, pos: usize) -> Option<usize> {
    if pos == text.len() {
        return Some(pos);
    }
    text[pos..]
        .starts_with('\n')
        .then(|| skip_newlines(text, pos))
}

fn skip_newlines(text: &str, pos: usize) -> usize {
    pos + text[pos..].bytes().take_while(|b| *b == b'\n').count()
}

fn leading_blanks(text: &str) -> usize {
    text.bytes().take_while(|b| *b == b' ' || *b == b'\t').count()
}

fn line_end(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map_or(text.len(), |i| pos + i)
}

#[cfg(test)]
mod tests {
    use crate::options::Options;
    use crate::passes::test_support::with_conversion;

    #[test]
    fn link_definitions_are_removed_and_recorded() {
        let text = "para\n\n[Foo]: http://example.com/?a=1&b=2  \"Title\"\n[bar]: <http://b.org>\n\nrest\n";
        with_conversion(&Options::new(), |cx| {
            let out = cx.strip_link_definitions(text);
            assert_eq!(out, "para\n\nrest\n");
            assert_eq!(cx.urls["foo"], "http://example.com/?a=1&amp;b=2");
            assert_eq!(cx.titles["foo"], "Title");
            assert_eq!(cx.urls["bar"], "http://b.org");
            assert!(!cx.titles.contains_key("bar"));
        });
    }

    #[test]
    fn title_on_following_line_and_parens() {
        let text = "[a]: /x\n    (Paren Title)\n";
        with_conversion(&Options::new(), |cx| {
            assert_eq!(cx.strip_link_definitions(text), "");
            assert_eq!(cx.urls["a"], "/x");
            assert_eq!(cx.titles["a"], "Paren Title");
        });
    }

    #[test]
    fn last_definition_wins() {
        let text = "[a]: /one\n[A]: /two\n";
        with_conversion(&Options::new(), |cx| {
            cx.strip_link_definitions(text);
            assert_eq!(cx.urls["a"], "/two");
        });
    }

    #[test]
    fn deeply_indented_definition_is_code() {
        let text = "    [a]: /x\n";
        with_conversion(&Options::new(), |cx| {
            assert_eq!(cx.strip_link_definitions(text), text);
            assert!(cx.urls.is_empty());
        });
    }

    #[test]
    fn footnote_bodies_span_indented_lines() {
        let text = "text[^note]\n\n[^note]: First line\n    continues here.\n\n    Second para.\n\nafter\n";
        with_conversion(&Options::new(), |cx| {
            let out = cx.strip_footnote_definitions(text);
            assert_eq!(out, "text[^note]\n\nafter\n");
            assert_eq!(
                cx.footnotes["note"],
                "First line\ncontinues here.\n\nSecond para.\n\n"
            );
        });
    }

    #[test]
    fn footnote_ids_are_normalized() {
        with_conversion(&Options::new(), |cx| {
            cx.strip_footnote_definitions("[^a b]: x\n");
            assert!(cx.footnotes.contains_key("a-b"));
        });
    }
}
