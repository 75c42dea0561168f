//! Fenced code block detection.
//!
//! A fenced block opens with a line of exactly three backticks, optionally
//! followed by a language word, and closes at the first later line made of
//! three backticks and trailing blanks. The opener must start the document
//! or follow a blank line.
//!
//! ```text
//! opener := "```" [\w+-]* [ \t]* "\n"
//! closer := "```" [ \t]* "\n"
//! ```

/// Fence parsing phases tracked across lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FencePhase {
    /// Not currently inside a fence.
    #[default]
    Outside,
    /// Within fence contents.
    InsideFence,
}

/// A fenced code block located in some text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Byte offset of the opening fence line.
    pub start: usize,
    /// Byte offset just past the closing fence line's newline.
    pub end: usize,
    /// Language word after the opening backticks, if any.
    pub lang: Option<&'a str>,
    /// Code between the fences, without its final newline.
    pub body: &'a str,
}

/// Parse a fence opener line (without its newline).
///
/// Returns `Some(lang)` for an opener, where `lang` is the optional
/// language word.
pub fn parse_opener(line: &str) -> Option<Option<&str>> {
    let rest = line.strip_prefix("```")?;
    let lang_len = rest
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .map_or(rest.len(), |(i, _)| i);
    let (lang, tail) = rest.split_at(lang_len);
    if !tail.bytes().all(|b| b == b' ' || b == b'\t') {
        return None;
    }
    Some((!lang.is_empty()).then_some(lang))
}

/// Returns true if `line` (without its newline) closes a fence.
pub fn is_closer(line: &str) -> bool {
    line.strip_prefix("```")
        .is_some_and(|rest| rest.bytes().all(|b| b == b' ' || b == b'\t'))
}

/// Find every fenced block in `text`, in order, without overlap.
///
/// An opener with no closer is left alone; scanning resumes on the line
/// after it.
pub fn find_fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while cursor < text.len() {
        match scan_from(text, cursor) {
            Scan::Block(block) => {
                cursor = block.end;
                blocks.push(block);
            }
            Scan::Unclosed { resume } => cursor = resume,
            Scan::Done => break,
        }
    }
    blocks
}

enum Scan<'a> {
    Block(FencedBlock<'a>),
    Unclosed { resume: usize },
    Done,
}

fn scan_from(text: &str, from: usize) -> Scan<'_> {
    let mut phase = FencePhase::Outside;
    let mut opener: Option<(usize, usize, Option<&str>)> = None;
    let mut cursor = from;

    while let Some((line, next, terminated)) = line_at(text, cursor) {
        match phase {
            FencePhase::Outside => {
                if terminated
                    && preceded_by_blank(text, cursor)
                    && let Some(lang) = parse_opener(line)
                {
                    opener = Some((cursor, next, lang));
                    phase = FencePhase::InsideFence;
                }
            }
            FencePhase::InsideFence => {
                if terminated
                    && is_closer(line)
                    && let Some((start, body_start, lang)) = opener
                {
                    let body = &text[body_start..cursor];
                    return Scan::Block(FencedBlock {
                        start,
                        end: next,
                        lang,
                        body: body.strip_suffix('\n').unwrap_or(body),
                    });
                }
            }
        }
        cursor = next;
    }

    match opener {
        Some((_, body_start, _)) => Scan::Unclosed { resume: body_start },
        None => Scan::Done,
    }
}

fn preceded_by_blank(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    before.is_empty() || before == "\n" || before.ends_with("\n\n")
}

/// Returns `(line, next_start, has_newline)` for the line at `start`.
fn line_at(text: &str, start: usize) -> Option<(&str, usize, bool)> {
    if start >= text.len() {
        return None;
    }
    match text[start..].find('\n') {
        Some(pos) => Some((&text[start..start + pos], start + pos + 1, true)),
        None => Some((&text[start..], text.len(), false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opener_with_and_without_lang() {
        assert_eq!(parse_opener("```"), Some(None));
        assert_eq!(parse_opener("```rust  "), Some(Some("rust")));
        assert_eq!(parse_opener("```c++"), Some(Some("c++")));
        assert_eq!(parse_opener("```rust extra"), None);
        assert_eq!(parse_opener("``"), None);
        assert_eq!(parse_opener("````"), None);
    }

    #[test]
    fn closer_allows_trailing_blanks() {
        assert!(is_closer("```"));
        assert!(is_closer("``` \t"));
        assert!(!is_closer("```js"));
        assert!(!is_closer(" ```"));
    }

    #[test]
    fn finds_block_at_document_start() {
        let text = "```python\nprint(1)\n```\n\nafter\n";
        let blocks = find_fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        let block = blocks[0];
        assert_eq!(block.lang, Some("python"));
        assert_eq!(block.body, "print(1)");
        assert_eq!(block.start, 0);
        assert_eq!(&text[block.end..], "\nafter\n");
    }

    #[test]
    fn opener_needs_blank_line_before() {
        let text = "para\n```\ncode\n```\n";
        assert!(find_fenced_blocks(text).is_empty());

        let text = "para\n\n```\ncode\n```\n";
        assert_eq!(find_fenced_blocks(text).len(), 1);
    }

    #[test]
    fn body_keeps_inner_blank_lines_and_indent() {
        let text = "```\n  a\n\n  b\n```\n";
        let blocks = find_fenced_blocks(text);
        assert_eq!(blocks[0].body, "  a\n\n  b");
    }

    #[test]
    fn first_closer_wins() {
        let text = "```\na\n```\nb\n```\n";
        let blocks = find_fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "a");
    }

    #[test]
    fn empty_block() {
        let blocks = find_fenced_blocks("```\n```\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "");
    }

    #[test]
    fn unclosed_fence_is_ignored() {
        assert!(find_fenced_blocks("```\nnever closed\n").is_empty());
    }

    #[test]
    fn closer_needs_newline() {
        assert!(find_fenced_blocks("```\ncode\n```").is_empty());
    }

    #[test]
    fn several_blocks() {
        let text = "```a\n1\n```\n\n```b\n2\n```\n";
        let langs: Vec<_> = find_fenced_blocks(text).iter().map(|b| b.lang).collect();
        assert_eq!(langs, vec![Some("a"), Some("b")]);
    }
}
