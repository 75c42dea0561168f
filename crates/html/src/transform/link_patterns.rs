//! Turns text matching the configured link patterns into anchors.
//!
//! Patterns run in order. Each one sees only prose that is still plain:
//! tags, the contents of existing `<a>` elements, placeholder keys and
//! anchors made by earlier patterns are skipped. A match wrapped in `[...]`
//! or directly following `](` is left alone so Markdown links keep working.

use marksmith_core::placeholder::{KEY_CLOSE, KEY_OPEN};

use crate::passes::{Conversion, tokenize_html};

struct Segment {
    text: String,
    linkable: bool,
}

/// Applies every link pattern of the conversion's options to `text`.
pub(crate) fn apply(cx: &Conversion<'_>, text: &str) -> String {
    if cx.options.link_patterns.is_empty() {
        return text.to_string();
    }
    let mut segments = segment(text);
    for pattern in &cx.options.link_patterns {
        let mut next = Vec::with_capacity(segments.len());
        for seg in segments {
            if !seg.linkable {
                next.push(seg);
                continue;
            }
            let mut last = 0;
            for caps in pattern.regex().captures_iter(&seg.text) {
                let Some(m) = caps.get(0) else {
                    continue;
                };
                if m.is_empty() || m.start() < last || is_markdown_link(&seg.text, m.start(), m.end())
                {
                    continue;
                }
                let href = cx.hide_emphasis(&pattern.href(&caps).replace('"', "&quot;"));
                log::debug!("link pattern {} matched {:?}", pattern.regex(), m.as_str());
                next.push(Segment {
                    text: seg.text[last..m.start()].to_string(),
                    linkable: true,
                });
                next.push(Segment {
                    text: format!("<a href=\"{}\">{}</a>", href, m.as_str()),
                    linkable: false,
                });
                last = m.end();
            }
            next.push(Segment {
                text: seg.text[last..].to_string(),
                linkable: true,
            });
        }
        segments = next;
    }
    segments.into_iter().map(|seg| seg.text).collect()
}

fn is_markdown_link(text: &str, start: usize, end: usize) -> bool {
    let before = &text[..start];
    let after = &text[end..];
    (before.ends_with('[') && after.starts_with(']'))
        || before.ends_with("](")
        || after.starts_with("\")")
}

/// Splits `text` into prose that patterns may link and everything else.
fn segment(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut anchor_depth = 0usize;
    for (token, is_markup) in tokenize_html(text) {
        if is_markup {
            let lower = token.to_ascii_lowercase();
            if lower.starts_with("<a ") || lower == "<a>" {
                anchor_depth += 1;
            } else if lower.starts_with("</a") {
                anchor_depth = anchor_depth.saturating_sub(1);
            }
            segments.push(Segment {
                text: token.to_string(),
                linkable: false,
            });
            continue;
        }
        if anchor_depth > 0 {
            segments.push(Segment {
                text: token.to_string(),
                linkable: false,
            });
            continue;
        }
        split_keys(token, &mut segments);
    }
    segments
}

/// Placeholder keys are opaque; only the prose between them is linkable.
fn split_keys(text: &str, segments: &mut Vec<Segment>) {
    let mut rest = text;
    while let Some(open) = rest.find(KEY_OPEN) {
        let Some(close) = rest[open..].find(KEY_CLOSE).map(|i| open + i + KEY_CLOSE.len_utf8())
        else {
            break;
        };
        segments.push(Segment {
            text: rest[..open].to_string(),
            linkable: true,
        });
        segments.push(Segment {
            text: rest[open..close].to_string(),
            linkable: false,
        });
        rest = &rest[close..];
    }
    segments.push(Segment {
        text: rest.to_string(),
        linkable: true,
    });
}
