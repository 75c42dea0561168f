//! Ordered and unordered lists.
//!
//! ```text
//! list := ("\n\n" | start)  [ ]{0,tab-1} marker [ \t]+  .+?  (end | "\n\n"+ before \S that is no marker)
//! item := "\n"? ^ ws marker [ \t]+ .+? "\n"{1,2}  (before "\n"* (end | ws marker [ \t]+))
//! marker := [*+-] | \d+ "."
//! ```
//!
//! Nested lists are found at any line start (not only after a blank line)
//! once inside an item. An item is loose, and gets block processing, when it
//! follows a blank line, contains one, or the previous item ended with one.

use marksmith_core::normalize::outdent;

use super::Conversion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Unordered => "ul",
            ListKind::Ordered => "ol",
        }
    }

    /// Length of a marker of this kind at the start of `text`.
    fn marker_len(self, text: &str) -> Option<usize> {
        match self {
            ListKind::Unordered => text.starts_with(['*', '+', '-']).then_some(1),
            ListKind::Ordered => {
                let digits = text.bytes().take_while(u8::is_ascii_digit).count();
                (digits > 0 && text[digits..].starts_with('.')).then_some(digits + 1)
            }
        }
    }
}

/// Length of a marker of either kind.
fn any_marker_len(text: &str) -> Option<usize> {
    ListKind::Unordered
        .marker_len(text)
        .or_else(|| ListKind::Ordered.marker_len(text))
}

/// A whole list found in some text.
struct ListMatch {
    /// Start of the replaced region.
    start: usize,
    /// Start of the list's first line.
    body_start: usize,
    end: usize,
    kind: ListKind,
}

/// One list item.
struct ItemMatch {
    start: usize,
    leading_line: bool,
    body_start: usize,
    end: usize,
    eols: usize,
    /// Marker of the following item, if one follows.
    next_marker: Option<(usize, usize)>,
    indent: usize,
    marker: (usize, usize),
}

impl Conversion<'_> {
    /// Replace every list in `text` with `<ul>`/`<ol>` markup.
    pub(crate) fn do_lists(&mut self, text: &str) -> String {
        let mut text = text.to_string();
        let mut pos = 0;
        loop {
            let max_indent = self.options.tab_width.saturating_sub(1);
            let nested = self.list_level > 0;
            let hit = [ListKind::Unordered, ListKind::Ordered]
                .into_iter()
                .filter_map(|kind| find_list(&text, pos, kind, max_indent, nested))
                .min_by_key(|hit| hit.start);
            let Some(hit) = hit else {
                break;
            };
            let items = self.process_list_items(&text[hit.body_start..hit.end]);
            let tag = hit.kind.tag();
            let html = if nested {
                format!("<{0}>\n{1}</{0}>\n", tag, items)
            } else {
                format!("<{0}>\n{1}</{0}>\n\n", tag, items)
            };
            text.replace_range(hit.start..hit.end, &html);
            pos = hit.start + html.len();
        }
        text
    }

    fn process_list_items(&mut self, list: &str) -> String {
        self.list_level += 1;
        self.last_li_ends_with_two_eols = false;
        let list = format!("{}\n", list.trim_end_matches('\n'));

        let mut out = String::with_capacity(list.len() * 2);
        let mut last = 0;
        let mut pos = 0;
        while let Some(item) = find_item(&list, pos) {
            out.push_str(&list[last..item.start]);
            let body = &list[item.body_start..item.end];
            let loose =
                item.leading_line || body.contains("\n\n") || self.last_li_ends_with_two_eols;
            let outdented = outdent(body, self.options.tab_width);
            let html = if loose {
                self.run_block_gamut(&outdented)
            } else {
                let nested = self.do_lists(&outdented);
                let nested = nested.strip_suffix('\n').unwrap_or(&nested);
                self.run_span_gamut(nested)
            };
            self.last_li_ends_with_two_eols = item.eols == 2;
            out.push_str(&format!("<li>{}</li>\n", html));
            last = item.end;
            pos = item.end;
        }
        out.push_str(&list[last..]);

        self.list_level -= 1;
        out
    }
}

/// First list of `kind` at or after `pos`.
fn find_list(
    text: &str,
    pos: usize,
    kind: ListKind,
    max_indent: usize,
    nested: bool,
) -> Option<ListMatch> {
    let mut line_start = pos;
    if line_start > 0 && text.as_bytes()[line_start - 1] != b'\n' {
        line_start = next_line_start(text, line_start)?;
    }
    while line_start < text.len() {
        let candidate = if nested {
            Some((line_start, line_start))
        } else if line_start == 0 {
            Some((0, usize::from(text.starts_with('\n'))))
        } else if text[..line_start].ends_with("\n\n") {
            Some((line_start, line_start))
        } else {
            None
        };
        if let Some((start, body_start)) = candidate
            && let Some(end) = list_end(text, body_start, kind, max_indent)
        {
            return Some(ListMatch {
                start,
                body_start,
                end,
                kind,
            });
        }
        line_start = next_line_start(text, line_start)?;
    }
    None
}

/// End of a list whose first line starts at `at`, if one starts there.
fn list_end(text: &str, at: usize, kind: ListKind, max_indent: usize) -> Option<usize> {
    let indent = text[at..]
        .bytes()
        .take(max_indent + 1)
        .take_while(|b| *b == b' ')
        .count();
    if indent > max_indent {
        return None;
    }
    let marker_start = at + indent;
    let marker_len = kind.marker_len(&text[marker_start..])?;
    let marker = &text[marker_start..marker_start + marker_len];
    let after_marker = marker_start + marker_len;
    let gap = blanks(&text[after_marker..]);
    if gap == 0 {
        return None;
    }
    let content = after_marker + gap;
    // `- - -` is a rule, not a list.
    let rest = text[content..].trim_start_matches(' ');
    if rest.starts_with(marker) && rest[marker.len()..].starts_with(' ') {
        return None;
    }

    // At least one character of content, then the end of the text or a
    // blank-line run that is not followed by another marker of this kind.
    let mut from = content + text[content..].chars().next()?.len_utf8();
    while from < text.len() {
        let Some(found) = text[from..].find("\n\n") else {
            break;
        };
        let run_start = from + found;
        let run_end = skip_newlines(text, run_start);
        let next = &text[run_end..];
        let rest = next.trim_start_matches([' ', '\t']);
        let continues_list = kind
            .marker_len(rest)
            .is_some_and(|len| blanks(&rest[len..]) > 0);
        if next.chars().next().is_some_and(|c| !c.is_whitespace()) && !continues_list {
            return Some(run_end);
        }
        from = run_end;
    }
    Some(text.len())
}

/// Next list item at or after `pos`.
fn find_item(text: &str, pos: usize) -> Option<ItemMatch> {
    let mut p = pos;
    while p < text.len() {
        if text.as_bytes()[p] == b'\n'
            && let Some(item) = item_at(text, p, p + 1, true)
        {
            return Some(item);
        }
        if (p == 0 || text.as_bytes()[p - 1] == b'\n')
            && let Some(item) = item_at(text, p, p, false)
        {
            return Some(item);
        }
        p = match text[p..].find('\n') {
            Some(0) => p + 1,
            Some(i) => p + i,
            None => text.len(),
        };
    }
    None
}

fn item_at(text: &str, start: usize, line_start: usize, leading_line: bool) -> Option<ItemMatch> {
    let indent = blanks(&text[line_start..]);
    let marker_start = line_start + indent;
    let marker_len = any_marker_len(&text[marker_start..])?;
    let after_marker = marker_start + marker_len;
    let gap = blanks(&text[after_marker..]);
    if gap == 0 {
        return None;
    }
    let body_start = after_marker + gap;
    let ws = &text[line_start..marker_start];

    // Shortest body that ends in one or two newlines before the end of the
    // text or a sibling marker at the same indentation. A marker followed
    // only by blanks is an empty item.
    let first = text[body_start..].chars().next()?;
    let mut from = if first == '\n' {
        body_start
    } else {
        body_start + first.len_utf8()
    };
    while from < text.len() {
        let Some(found) = text[from..].find('\n') else {
            break;
        };
        let nl = from + found;
        let run_end = skip_newlines(text, nl);
        let eols = (run_end - nl).min(2);
        let next = &text[run_end..];
        let next_marker = next
            .strip_prefix(ws)
            .and_then(|rest| any_marker_len(rest).map(|len| (rest, len)))
            .filter(|(rest, len)| blanks(&rest[*len..]) > 0)
            .map(|(_, len)| (run_end + ws.len(), len));
        if run_end == text.len() || next_marker.is_some() {
            return Some(ItemMatch {
                start,
                leading_line,
                body_start,
                end: nl + eols,
                eols,
                next_marker,
                indent,
                marker: (marker_start, marker_len),
            });
        }
        from = run_end;
    }
    None
}

/// Offset in `graf` where a list cuddled against paragraph text begins:
/// the first item must be indented at most three spaces and be followed by
/// a sibling with the same kind of marker.
pub(crate) fn cuddled_list_start(graf: &str) -> Option<usize> {
    let text = format!("{}\n", graf);
    let item = find_item(&text, 0)?;
    let (next_at, next_len) = item.next_marker?;
    let (at, len) = item.marker;
    let same_kind = text.as_bytes()[at + len - 1] == text.as_bytes()[next_at + next_len - 1];
    if item.indent > 3 || !same_kind {
        return None;
    }
    Some(item.start.min(graf.len()))
}

fn blanks(text: &str) -> usize {
    text.bytes().take_while(|b| *b == b' ' || *b == b'\t').count()
}

fn skip_newlines(text: &str, pos: usize) -> usize {
    pos + text[pos..].bytes().take_while(|b| *b == b'\n').count()
}

fn next_line_start(text: &str, pos: usize) -> Option<usize> {
    text[pos..].find('\n').map(|i| pos + i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::passes::test_support::with_conversion;

    fn lists(text: &str) -> String {
        with_conversion(&Options::new(), |cx| {
            let out = cx.do_lists(text);
            cx.unhash(&out).unwrap()
        })
    }

    #[test]
    fn tight_unordered_list() {
        assert_eq!(lists("* a\n* b\n"), "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n\n");
    }

    #[test]
    fn ordered_list_ignores_numbers() {
        assert_eq!(lists("3. x\n1. y\n"), "<ol>\n<li>x</li>\n<li>y</li>\n</ol>\n\n");
    }

    #[test]
    fn loose_items_get_paragraphs() {
        assert_eq!(
            lists("- a\n\n- b\n"),
            "<ul>\n<li><p>a</p></li>\n<li><p>b</p></li>\n</ul>\n\n"
        );
    }

    #[test]
    fn nested_list() {
        assert_eq!(
            lists("- a\n    - b\n- c\n"),
            "<ul>\n<li>a\n<ul>\n<li>b</li>\n</ul></li>\n<li>c</li>\n</ul>\n\n"
        );
    }

    #[test]
    fn different_kinds_do_not_merge() {
        assert_eq!(
            lists("- a\n\n1. b\n"),
            "<ul>\n<li>a</li>\n</ul>\n\n<ol>\n<li>b</li>\n</ol>\n\n"
        );
    }

    #[test]
    fn list_needs_blank_line_before_it() {
        assert_eq!(lists("text\n- a\n"), "text\n- a\n");
    }

    #[test]
    fn spaced_dashes_are_not_a_list() {
        assert_eq!(lists("- - -\n"), "- - -\n");
    }

    #[test]
    fn marker_without_content_is_an_empty_item() {
        assert_eq!(lists("* \n"), "<ul>\n<li></li>\n</ul>\n\n");
        assert_eq!(lists("1. \n2. b\n"), "<ol>\n<li></li>\n<li>b</li>\n</ol>\n\n");
    }

    #[test]
    fn cuddled_start() {
        assert_eq!(cuddled_list_start("Intro:\n- a\n- b"), Some(6));
        assert_eq!(cuddled_list_start("Intro:\n- a\n1. b"), None);
        assert_eq!(cuddled_list_start("No list here"), None);
    }
}
