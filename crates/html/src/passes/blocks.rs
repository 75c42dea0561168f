//! The block gamut: headers, rules, code blocks, blockquotes, paragraphs.

use marksmith_core::find_fenced_blocks;
use marksmith_core::normalize::{dedent, detab, outdent, strip_whitespace_only_lines};

use super::Conversion;
use crate::options::ExtraKind;
use crate::toc::TocEntry;

impl Conversion<'_> {
    /// Runs every block rule, in order, over `text`. Recurses through
    /// blockquotes, loose list items and footnote bodies.
    pub(crate) fn run_block_gamut(&mut self, text: &str) -> String {
        let mut text = if self.has(ExtraKind::FencedCodeBlocks) {
            self.do_fenced_code_blocks(text)
        } else {
            text.to_string()
        };
        text = self.do_headers(&text);
        text = self.do_horizontal_rules(&text);
        text = self.do_lists(&text);
        if self.has(ExtraKind::Pyshell) {
            text = self.prepare_pyshell_blocks(&text);
        }
        text = self.do_code_blocks(&text);
        if self.has(ExtraKind::WikiTables) {
            text = self.do_wiki_tables(&text);
        }
        text = self.do_block_quotes(&text);
        // Generated markup must not be wrapped in <p> tags.
        text = self.hash_html_blocks(&text, false);
        self.form_paragraphs(&text)
    }

    /// Setext headers, then ATX headers.
    ///
    /// ```text
    /// setext := ^ .+ "\n" ("="+ | "-"+) [ \t]* "\n"+
    /// atx    := ^ "#"{1,6} [ \t]* text [ \t]* "#"* "\n"+
    /// ```
    pub(crate) fn do_headers(&mut self, text: &str) -> String {
        let text = self.replace_at_line_starts(text, |cx, text, at| {
            let (header, level, end) = setext_header_at(text, at)?;
            Some((cx.header(header, level), end))
        });
        if !text.contains('#') {
            return text;
        }
        self.replace_at_line_starts(&text, |cx, text, at| {
            let (header, level, end) = atx_header_at(text, at)?;
            Some((cx.header(header, level), end))
        })
    }

    fn header(&mut self, raw: &str, level: u8) -> String {
        let level = (level + self.options.extras.demote_headers()).min(6);
        let id = if self.has(ExtraKind::HeaderIds) {
            self.slugger.next_id(raw)
        } else {
            None
        };
        let html = self.run_span_gamut(raw);
        let id_attr = match &id {
            Some(id) => format!(" id=\"{}\"", id),
            None => String::new(),
        };
        if self.has(ExtraKind::Toc)
            && let Some(id) = id
        {
            self.toc.push(TocEntry {
                level,
                id,
                name: html.clone(),
            });
        }
        format!("<h{0}{1}>{2}</h{0}>\n\n", level, id_attr, html)
    }

    /// Lines of three or more `*`, `-` or `_` (spaces allowed between).
    fn do_horizontal_rules(&self, text: &str) -> String {
        let rule = format!("\n<hr{}\n", self.empty_suffix());
        let mut out = String::with_capacity(text.len());
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
            }
            if is_horizontal_rule(line) {
                out.push_str(&rule);
            } else {
                out.push_str(line);
            }
        }
        out
    }

    /// Fenced blocks become `<pre><code>` around a code placeholder.
    pub(crate) fn do_fenced_code_blocks(&mut self, text: &str) -> String {
        if !text.contains("```") {
            return text.to_string();
        }
        let blocks = find_fenced_blocks(text);
        if blocks.is_empty() {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for block in blocks {
            out.push_str(&text[last..block.start]);
            out.push_str(&self.code_block_html(block.body));
            last = block.end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Runs of lines indented by one tab stop, after a blank line.
    ///
    /// ```text
    /// code := ("\n\n" | start) ( ([ ]{tab} | \t) .* "\n"+ )+  (^[ ]{0,tab}\S | end)
    /// ```
    pub(crate) fn do_code_blocks(&mut self, text: &str) -> String {
        let tab_width = self.options.tab_width;
        let indent = " ".repeat(tab_width);
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut line_start = 0;
        while line_start < text.len() {
            let (region_start, block_start) = if line_start == 0 {
                (0, usize::from(text.starts_with('\n')))
            } else if text[..line_start].ends_with("\n\n") && line_start >= last + 2 {
                (line_start - 2, line_start)
            } else {
                (usize::MAX, line_start)
            };
            if region_start != usize::MAX
                && let Some(end) = code_block_end(text, block_start, &indent, tab_width)
            {
                let raw = &text[block_start..end];
                let body = detab(&outdent(raw, tab_width), tab_width);
                let body = body.trim_start_matches('\n').trim_end();
                out.push_str(&text[last..region_start]);
                out.push_str(&self.code_block_html(body));
                last = end;
                line_start = end;
                continue;
            }
            line_start = text[line_start..]
                .find('\n')
                .map_or(text.len(), |i| line_start + i + 1);
        }
        out.push_str(&text[last..]);
        out
    }

    /// Indents interactive sessions by one tab stop so the code block pass
    /// picks them up.
    ///
    /// ```text
    /// pyshell := ^ ws ">>> " .* "\n"  (ws .*\S.* "\n")*  "\n"     ws = [ ]{0,tab-1}
    /// ```
    pub(crate) fn prepare_pyshell_blocks(&mut self, text: &str) -> String {
        if !text.contains(">>>") {
            return text.to_string();
        }
        let tab_width = self.options.tab_width;
        self.replace_at_line_starts(text, |_, text, at| {
            let end = pyshell_block_end(text, at, tab_width.saturating_sub(1))?;
            let indent = " ".repeat(tab_width);
            // The leading newline separates the block from a cuddled paragraph.
            let mut block = String::from("\n");
            for line in dedent(text[at..end].trim_end_matches('\n'), false).lines() {
                block.push_str(&indent);
                block.push_str(line);
                block.push('\n');
            }
            block.push('\n');
            Some((block, end))
        })
    }

    fn code_block_html(&mut self, code: &str) -> String {
        let key = self.hash_code(code);
        format!(
            "\n\n<pre{}><code{}>{}\n</code></pre>\n\n",
            self.class_attr("pre"),
            self.class_attr("code"),
            key
        )
    }

    /// `>`-prefixed runs, including lazy continuation lines.
    ///
    /// ```text
    /// blockquote := ( ^ [ \t]* ">" [ \t]? .+ "\n" (.+ "\n")* "\n"* )+
    /// ```
    pub(crate) fn do_block_quotes(&mut self, text: &str) -> String {
        if !text.contains('>') {
            return text.to_string();
        }
        self.replace_at_line_starts(text, |cx, text, at| {
            let end = blockquote_end(text, at)?;
            Some((cx.block_quote(&text[at..end]), end))
        })
    }

    fn block_quote(&mut self, quoted: &str) -> String {
        let mut inner = String::with_capacity(quoted.len());
        for (i, line) in quoted.split('\n').enumerate() {
            if i > 0 {
                inner.push('\n');
            }
            inner.push_str(strip_quote_marker(line));
        }
        let inner = strip_whitespace_only_lines(&inner);
        let body = self.run_block_gamut(&inner);
        format!("<blockquote>\n{}\n</blockquote>\n\n", indent_outside_pre(&body))
    }

    /// Splits on blank lines; block placeholders stand alone, everything
    /// else becomes a `<p>`.
    pub(crate) fn form_paragraphs(&mut self, text: &str) -> String {
        let text = text.trim_matches('\n');
        if text.is_empty() {
            return String::new();
        }
        let mut grafs = Vec::new();
        for graf in split_paragraphs(text) {
            if let Some(html) = self.blocks.get(graf) {
                grafs.push(html.to_string());
                continue;
            }
            let mut graf = graf;
            let mut cuddled = None;
            if self.has(ExtraKind::CuddledLists)
                && let Some(start) = super::lists::cuddled_list_start(graf)
            {
                let list = self.do_lists(&format!("{}\n", &graf[start..]));
                let list = list.trim_end_matches('\n');
                if list.starts_with("<ul>") || list.starts_with("<ol>") {
                    cuddled = Some(list.to_string());
                    graf = &graf[..start];
                }
            }
            let html = self.run_span_gamut(graf);
            grafs.push(format!("<p>{}</p>", html.trim_start_matches([' ', '\t'])));
            if let Some(list) = cuddled {
                grafs.push(list);
            }
        }
        grafs.join("\n\n")
    }

    /// Applies `rule` at each line start; where it matches, the returned
    /// html replaces the text up to the returned offset and scanning resumes
    /// there.
    pub(crate) fn replace_at_line_starts<F>(&mut self, text: &str, mut rule: F) -> String
    where
        F: FnMut(&mut Self, &str, usize) -> Option<(String, usize)>,
    {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut line_start = 0;
        while line_start < text.len() {
            if let Some((html, end)) = rule(self, text, line_start) {
                out.push_str(&text[last..line_start]);
                out.push_str(&html);
                last = end;
                line_start = end;
                continue;
            }
            line_start = text[line_start..]
                .find('\n')
                .map_or(text.len(), |i| line_start + i + 1);
        }
        out.push_str(&text[last..]);
        out
    }
}

fn setext_header_at(text: &str, at: usize) -> Option<(&str, u8, usize)> {
    let title_end = at + text[at..].find('\n')?;
    let title = text[at..title_end].trim_end_matches([' ', '\t']);
    if title.is_empty() {
        return None;
    }
    let underline_start = title_end + 1;
    let underline_end = underline_start + text[underline_start..].find('\n')?;
    let underline = text[underline_start..underline_end].trim_end_matches([' ', '\t']);
    let level = match underline.as_bytes().first() {
        Some(b'=') => 1,
        Some(b'-') => 2,
        _ => return None,
    };
    if !underline.bytes().all(|b| b == underline.as_bytes()[0]) {
        return None;
    }
    Some((title, level, skip_newlines(text, underline_end)))
}

fn atx_header_at(text: &str, at: usize) -> Option<(&str, u8, usize)> {
    let line_end = at + text[at..].find('\n')?;
    let line = &text[at..line_end];
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    for level in (1..=hashes.min(6)).rev() {
        let rest = &line[level..];
        let text_start = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        let rest = &rest[text_start..];
        // Shortest text whose remainder is blanks and closing hashes.
        for (offset, c) in rest.char_indices() {
            let text_end = offset + c.len_utf8();
            let tail = &rest[text_end..];
            let blanks = tail.len() - tail.trim_start_matches([' ', '\t']).len();
            if !tail[blanks..].bytes().all(|b| b == b'#') {
                continue;
            }
            let escaped = blanks == 0 && rest[..text_end].ends_with('\\');
            if !escaped {
                return Some((&rest[..text_end], level as u8, skip_newlines(text, line_end)));
            }
        }
    }
    None
}

/// `[ ]{0,3}` then three or more of one of `*`, `-`, `_`, at most two
/// spaces apart, then blanks.
fn is_horizontal_rule(line: &str) -> bool {
    let body = line.trim_end_matches([' ', '\t']);
    let indent = body.bytes().take_while(|b| *b == b' ').count();
    if indent > 3 {
        return false;
    }
    let body = &body[indent..];
    let Some(mark) = body.bytes().next().filter(|b| matches!(b, b'*' | b'-' | b'_')) else {
        return false;
    };
    let mut marks = 0;
    let mut gap = 0;
    for b in body.bytes() {
        if b == mark {
            marks += 1;
            gap = 0;
        } else if b == b' ' && gap < 2 {
            gap += 1;
        } else {
            return false;
        }
    }
    marks >= 3
}

/// End of an indented code block whose first line starts at `start`.
fn code_block_end(text: &str, start: usize, indent: &str, tab_width: usize) -> Option<usize> {
    let mut cursor = start;
    while text[cursor..].starts_with(indent) || text[cursor..].starts_with('\t') {
        let Some(nl) = text[cursor..].find('\n') else {
            break;
        };
        cursor = skip_newlines(text, cursor + nl);
    }
    if cursor == start {
        return None;
    }
    if cursor == text.len() {
        return Some(cursor);
    }
    let spaces = text[cursor..]
        .bytes()
        .take(tab_width + 1)
        .take_while(|b| *b == b' ')
        .count();
    let next = text[cursor + spaces..].chars().next();
    (spaces <= tab_width && next.is_some_and(|c| !c.is_whitespace())).then_some(cursor)
}

/// End of a `>>> ` session starting at `at`, just past its closing blank
/// line. Every line keeps the first line's indentation.
fn pyshell_block_end(text: &str, at: usize, max_indent: usize) -> Option<usize> {
    let indent = text[at..]
        .bytes()
        .take(max_indent + 1)
        .take_while(|b| *b == b' ')
        .count();
    if indent > max_indent || !text[at + indent..].starts_with(">>> ") {
        return None;
    }
    let prefix = &text[at..at + indent];
    let mut cursor = at + text[at..].find('\n')? + 1;
    loop {
        let line_end = cursor + text[cursor..].find('\n')?;
        let line = &text[cursor..line_end];
        if line.is_empty() {
            return Some(line_end + 1);
        }
        if !line.starts_with(prefix) || line.trim().is_empty() {
            return None;
        }
        cursor = line_end + 1;
    }
}

fn blockquote_end(text: &str, start: usize) -> Option<usize> {
    let mut cursor = start;
    let mut matched = false;
    loop {
        let Some(nl) = text[cursor..].find('\n') else {
            break;
        };
        let line = &text[cursor..cursor + nl];
        let after_marker = line.trim_start_matches([' ', '\t']).strip_prefix('>');
        if after_marker.is_none_or(str::is_empty) {
            break;
        }
        cursor += nl + 1;
        // Lazy continuation: any following non-blank lines.
        while let Some(nl) = text[cursor..].find('\n') {
            if nl == 0 {
                break;
            }
            cursor += nl + 1;
        }
        cursor = skip_newlines(text, cursor);
        matched = true;
    }
    matched.then_some(cursor)
}

/// Removes one level of `>` quoting from a line.
fn strip_quote_marker(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    match trimmed.strip_prefix('>') {
        Some(rest) => rest
            .strip_prefix(' ')
            .or_else(|| rest.strip_prefix('\t'))
            .unwrap_or(rest),
        None => line,
    }
}

/// Two-space indent for blockquote content, except inside `<pre>` blocks
/// and the blank lines leading into one.
fn indent_outside_pre(body: &str) -> String {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut keep = vec![false; lines.len()];
    let mut in_pre = false;
    for (i, line) in lines.iter().enumerate() {
        if !in_pre && line.trim_start().starts_with("<pre") {
            in_pre = true;
            let mut j = i;
            while j > 0 && lines[j - 1].is_empty() {
                j -= 1;
                keep[j] = true;
            }
        }
        if in_pre {
            keep[i] = true;
            if line.contains("</pre>") {
                in_pre = false;
            }
        }
    }
    let mut out = String::with_capacity(body.len() + lines.len() * 2);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if !keep[i] {
            out.push_str("  ");
        }
        out.push_str(line);
    }
    out
}

/// Paragraph chunks: text split on runs of two or more newlines.
fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut grafs = Vec::new();
    let mut rest = text;
    while let Some(found) = rest.find("\n\n") {
        grafs.push(&rest[..found]);
        rest = rest[found..].trim_start_matches('\n');
    }
    grafs.push(rest);
    grafs
}

fn skip_newlines(text: &str, pos: usize) -> usize {
    pos + text[pos..].bytes().take_while(|b| *b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Extra, Options};
    use crate::passes::test_support::with_conversion;

    fn blocks(options: &Options, text: &str) -> String {
        with_conversion(options, |cx| {
            let out = cx.run_block_gamut(text);
            cx.unhash(&out).unwrap()
        })
    }

    fn plain(text: &str) -> String {
        blocks(&Options::new(), text)
    }

    #[test]
    fn atx_headers() {
        assert_eq!(plain("# Title #\n\n"), "<h1>Title</h1>");
        assert_eq!(plain("### Three\n"), "<h3>Three</h3>");
        assert_eq!(plain("#No space\n"), "<h1>No space</h1>");
        assert_eq!(plain("## C\\#\n"), "<h2>C#</h2>");
    }

    #[test]
    fn setext_headers() {
        assert_eq!(plain("Big\n===\n\nSmall\n-----\n"), "<h1>Big</h1>\n\n<h2>Small</h2>");
    }

    #[test]
    fn header_ids_and_demotion() {
        let options = Options::new()
            .extra(Extra::header_ids())
            .extra(Extra::DemoteHeaders(1));
        assert_eq!(
            blocks(&options, "# Example\n\n# Example\n"),
            "<h2 id=\"example\">Example</h2>\n\n<h2 id=\"example-2\">Example</h2>"
        );
    }

    #[test]
    fn horizontal_rules() {
        assert!(is_horizontal_rule("***"));
        assert!(is_horizontal_rule(" - - -"));
        assert!(is_horizontal_rule("_ _  _ "));
        assert!(!is_horizontal_rule("**"));
        assert!(!is_horizontal_rule("*-*"));
        assert!(!is_horizontal_rule("    ***"));
        assert_eq!(plain("a\n\n* * *\n\nb\n"), "<p>a</p>\n\n<hr />\n\n<p>b</p>");
    }

    #[test]
    fn indented_code_blocks() {
        assert_eq!(
            plain("Code:\n\n    if a < b:\n        go()\n\nafter\n"),
            "<p>Code:</p>\n\n<pre><code>if a &lt; b:\n    go()\n</code></pre>\n\n<p>after</p>"
        );
    }

    #[test]
    fn fenced_code_blocks_with_classes() {
        let mut classes = std::collections::BTreeMap::new();
        classes.insert("pre".to_string(), "prettyprint".to_string());
        let options = Options::new()
            .extra(Extra::FencedCodeBlocks)
            .extra(Extra::HtmlClasses(classes));
        assert_eq!(
            blocks(&options, "```rust\nlet x = *y;\n```\n"),
            "<pre class=\"prettyprint\"><code>let x = *y;\n</code></pre>"
        );
    }

    #[test]
    fn pyshell_sessions_become_code() {
        let options = Options::new().extra(Extra::Pyshell);
        let session = "Try it:\n>>> 1 < 2\nTrue\n\nafter\n";
        assert_eq!(
            blocks(&options, session),
            "<p>Try it:</p>\n\n<pre><code>&gt;&gt;&gt; 1 &lt; 2\nTrue\n</code></pre>\n\n<p>after</p>"
        );
        assert!(plain(">>> 1 < 2\nTrue\n\n").starts_with("<blockquote>"));
    }

    #[test]
    fn pyshell_needs_closing_blank_line() {
        let options = Options::new().extra(Extra::Pyshell);
        with_conversion(&options, |cx| {
            assert_eq!(cx.prepare_pyshell_blocks(">>> x\ny"), ">>> x\ny");
            assert_eq!(
                cx.prepare_pyshell_blocks("  >>> x\n  y\n\n"),
                "\n    >>> x\n    y\n\n"
            );
        });
    }

    #[test]
    fn blockquotes_nest_and_indent() {
        assert_eq!(
            plain("> quoted\n> > inner\n"),
            "<blockquote>\n  <p>quoted</p>\n  \n  <blockquote>\n    <p>inner</p>\n  </blockquote>\n</blockquote>"
        );
    }

    #[test]
    fn lazy_blockquote_continuation() {
        assert_eq!(
            plain("> one\ntwo\n\nout\n"),
            "<blockquote>\n  <p>one\n  two</p>\n</blockquote>\n\n<p>out</p>"
        );
    }

    #[test]
    fn pre_inside_blockquote_is_not_indented() {
        assert_eq!(
            plain(">     code\n"),
            "<blockquote>\n<pre><code>code\n</code></pre>\n</blockquote>"
        );
    }

    #[test]
    fn cuddled_lists() {
        let options = Options::new().extra(Extra::CuddledLists);
        assert_eq!(
            blocks(&options, "Intro:\n- a\n- b\n"),
            "<p>Intro:</p>\n\n<ul>\n<li>a</li>\n<li>b</li>\n</ul>"
        );
        assert_eq!(plain("Intro:\n- a\n- b\n"), "<p>Intro:\n- a\n- b</p>");
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        assert_eq!(split_paragraphs("a\nb\n\n\nc"), vec!["a\nb", "c"]);
    }
}
