//! Wiki-style tables.
//!
//! ```text
//! table := ("\n\n" | start) ^ ([ ]{0,tab-1}) "||" .+? "||" [ ]* "\n"
//!                          (^ \1 "||" .+? "||" "\n")*
//! ```
//!
//! Cells are separated by `||` not preceded by a backslash.

use super::Conversion;

impl Conversion<'_> {
    pub(crate) fn do_wiki_tables(&mut self, text: &str) -> String {
        if !text.contains("||") {
            return text.to_string();
        }
        let max_indent = self.options.tab_width.saturating_sub(1);
        self.replace_at_line_starts(text, |cx, text, at| {
            let after_blank = at == 0 || text[..at].ends_with("\n\n") || &text[..at] == "\n";
            if !after_blank {
                return None;
            }
            let end = table_end(text, at, max_indent)?;
            Some((cx.wiki_table(&text[at..end]), end))
        })
    }

    fn wiki_table(&mut self, table: &str) -> String {
        let mut lines = vec!["<table>".to_string(), "<tbody>".to_string()];
        for line in table.trim().lines() {
            let line = line.trim();
            let inner = line
                .get(2..line.len().saturating_sub(2))
                .unwrap_or_default()
                .trim();
            let mut row = String::from("<tr>");
            for cell in split_cells(inner) {
                row.push_str("<td>");
                row.push_str(&self.run_span_gamut(cell.trim()));
                row.push_str("</td>");
            }
            row.push_str("</tr>");
            lines.push(row);
        }
        lines.push("</tbody>".to_string());
        lines.push("</table>".to_string());
        format!("{}\n", lines.join("\n"))
    }
}

/// End of a table whose first row starts at `at`.
fn table_end(text: &str, at: usize, max_indent: usize) -> Option<usize> {
    let indent = text[at..]
        .bytes()
        .take(max_indent + 1)
        .take_while(|b| *b == b' ')
        .count();
    if indent > max_indent {
        return None;
    }
    let prefix = &text[at..at + indent];

    let first_end = at + text[at..].find('\n')?;
    if !is_row(text[at + indent..first_end].trim_end_matches(' ')) {
        return None;
    }
    let mut cursor = first_end + 1;
    while let Some(nl) = text[cursor..].find('\n') {
        let line = &text[cursor..cursor + nl];
        match line.strip_prefix(prefix) {
            Some(row) if is_row(row) => cursor += nl + 1,
            _ => break,
        }
    }
    Some(cursor)
}

/// `||`, at least one character, `||`.
fn is_row(line: &str) -> bool {
    line.len() >= 5 && line.starts_with("||") && line.ends_with("||")
}

fn split_cells(row: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while let Some(found) = row[pos..].find("||") {
        let at = pos + found;
        if at > 0 && row.as_bytes()[at - 1] == b'\\' {
            pos = at + 1;
            continue;
        }
        cells.push(&row[start..at]);
        start = at + 2;
        pos = start;
    }
    cells.push(&row[start..]);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Extra, Options};
    use crate::passes::test_support::with_conversion;

    fn tables(text: &str) -> String {
        let options = Options::new().extra(Extra::WikiTables);
        with_conversion(&options, |cx| {
            let out = cx.do_wiki_tables(text);
            cx.unhash(&out).unwrap()
        })
    }

    #[test]
    fn two_by_two() {
        assert_eq!(
            tables("|| a || *b* ||\n|| c || d ||\n"),
            "<table>\n<tbody>\n<tr><td>a</td><td><em>b</em></td></tr>\n<tr><td>c</td><td>d</td></tr>\n</tbody>\n</table>\n"
        );
    }

    #[test]
    fn table_must_follow_blank_line() {
        let text = "para\n|| a ||\n";
        assert_eq!(tables(text), text);
    }

    #[test]
    fn escaped_separator_stays_in_cell() {
        assert_eq!(split_cells(r"a \|| b || c"), vec![r"a \|| b ", " c"]);
    }
}
