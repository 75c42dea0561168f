use serde::Serialize;

/// A header recorded for the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// Header level after demotion, 1 to 6.
    pub level: u8,
    /// The header's `id` attribute.
    pub id: String,
    /// Rendered header content.
    pub name: String,
}

/// Renders entries as nested `<ul>` lists, or `None` when there are none.
///
/// A deeper header opens a list inside the previous item; a shallower one
/// closes lists until the levels line up again. A header shallower than
/// every open list starts a new top-level list.
pub fn toc_html(entries: &[TocEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let indent = |stack: &[u8]| "  ".repeat(stack.len() - 1);
    let mut lines: Vec<String> = Vec::new();
    let mut stack: Vec<u8> = vec![0];

    for entry in entries {
        let top = stack.last().copied().unwrap_or(0);
        if entry.level > top {
            lines.push(format!("{}<ul>", indent(&stack)));
            stack.push(entry.level);
        } else if entry.level == top {
            close_item(&mut lines);
        } else {
            while stack.len() > 1 && stack.last().is_some_and(|&top| entry.level < top) {
                stack.pop();
                close_item(&mut lines);
                let close = if stack.len() > 1 { "</ul></li>" } else { "</ul>" };
                lines.push(format!("{}{}", indent(&stack), close));
            }
            // Shallower than the first header: the outer list was closed.
            if stack.len() == 1 {
                lines.push(format!("{}<ul>", indent(&stack)));
                stack.push(entry.level);
            }
        }
        lines.push(format!(
            "{}<li><a href=\"#{}\">{}</a>",
            indent(&stack),
            entry.id,
            entry.name
        ));
    }
    while stack.len() > 1 {
        stack.pop();
        close_item(&mut lines);
        lines.push(format!("{}</ul>", indent(&stack)));
    }
    Some(format!("{}\n", lines.join("\n")))
}

fn close_item(lines: &mut [String]) {
    if let Some(last) = lines.last_mut()
        && !last.ends_with("</li>")
    {
        last.push_str("</li>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: u8, id: &str) -> TocEntry {
        TocEntry {
            level,
            id: id.to_string(),
            name: id.to_uppercase(),
        }
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(toc_html(&[]), None);
    }

    #[test]
    fn nests_by_level() {
        let html = toc_html(&[entry(1, "a"), entry(2, "b"), entry(2, "c"), entry(1, "d")]).unwrap();
        assert_eq!(
            html,
            "<ul>\n  \
             <li><a href=\"#a\">A</a>\n  \
             <ul>\n    \
             <li><a href=\"#b\">B</a></li>\n    \
             <li><a href=\"#c\">C</a></li>\n  \
             </ul></li>\n  \
             <li><a href=\"#d\">D</a></li>\n\
             </ul>\n"
        );
    }

    #[test]
    fn starts_below_top_level() {
        let html = toc_html(&[entry(2, "x"), entry(3, "y")]).unwrap();
        assert_eq!(
            html,
            "<ul>\n  <li><a href=\"#x\">X</a>\n  <ul>\n    <li><a href=\"#y\">Y</a></li>\n  </ul></li>\n</ul>\n"
        );
    }

    #[test]
    fn shallower_header_after_deep_start_opens_new_list() {
        let html = toc_html(&[entry(3, "deep"), entry(1, "top"), entry(2, "sub")]).unwrap();
        assert_eq!(
            html,
            "<ul>\n  \
             <li><a href=\"#deep\">DEEP</a></li>\n\
             </ul>\n\
             <ul>\n  \
             <li><a href=\"#top\">TOP</a>\n  \
             <ul>\n    \
             <li><a href=\"#sub\">SUB</a></li>\n  \
             </ul></li>\n\
             </ul>\n"
        );
        assert_eq!(html.matches("<ul>").count(), html.matches("</ul>").count());
        assert_eq!(html.matches("<li>").count(), html.matches("</li>").count());
    }
}
