//! The trailing footnotes section.

use super::Conversion;

impl Conversion<'_> {
    /// Appends `<div class="footnotes">` listing every referenced footnote
    /// in first-reference order. Text without references is returned as is.
    pub(crate) fn add_footnotes(&mut self, text: &str) -> String {
        if self.footnote_ids.is_empty() {
            return text.to_string();
        }
        let mut footer = vec![
            "<div class=\"footnotes\">".to_string(),
            format!("<hr{}", self.empty_suffix()),
            "<ol>".to_string(),
        ];
        let ids = self.footnote_ids.clone();
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                footer.push(String::new());
            }
            footer.push(format!("<li id=\"fn-{}\">", id));
            let body = self.footnotes.get(id).cloned().unwrap_or_default();
            footer.push(self.run_block_gamut(&body));

            let backlink = format!(
                "<a href=\"#fnref-{}\" class=\"footnoteBackLink\" \
                 title=\"Jump back to footnote {} in the text.\">&#8617;</a>",
                id,
                i + 1
            );
            match footer.last_mut() {
                Some(last) if last.ends_with("</p>") => {
                    last.truncate(last.len() - "</p>".len());
                    last.push_str("&#160;");
                    last.push_str(&backlink);
                    last.push_str("</p>");
                }
                _ => footer.push(format!("\n<p>{}</p>", backlink)),
            }
            footer.push("</li>".to_string());
        }
        footer.push("</ol>".to_string());
        footer.push("</div>".to_string());
        format!("{}\n\n{}", text, footer.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use crate::options::{Extra, Options};
    use crate::passes::test_support::with_conversion;

    #[test]
    fn nothing_referenced_means_no_section() {
        let options = Options::new().extra(Extra::Footnotes);
        with_conversion(&options, |cx| {
            cx.footnotes.insert("1".into(), "unused\n\n".into());
            assert_eq!(cx.add_footnotes("<p>x</p>"), "<p>x</p>");
        });
    }

    #[test]
    fn backlink_joins_last_paragraph() {
        let options = Options::new().extra(Extra::Footnotes);
        with_conversion(&options, |cx| {
            cx.footnotes.insert("a".into(), "Note *one*.\n\n".into());
            cx.footnote_ids.push("a".into());
            let out = cx.add_footnotes("<p>x</p>");
            assert_eq!(
                cx.unhash(&out).unwrap(),
                "<p>x</p>\n\n<div class=\"footnotes\">\n<hr />\n<ol>\n<li id=\"fn-a\">\n\
                 <p>Note <em>one</em>.&#160;<a href=\"#fnref-a\" class=\"footnoteBackLink\" \
                 title=\"Jump back to footnote 1 in the text.\">&#8617;</a></p>\n</li>\n</ol>\n</div>"
            );
        });
    }

    #[test]
    fn backlink_after_code_gets_own_paragraph() {
        let options = Options::new().extra(Extra::Footnotes);
        with_conversion(&options, |cx| {
            cx.footnotes.insert("c".into(), "    code\n\n".into());
            cx.footnote_ids.push("c".into());
            let out = cx.add_footnotes("");
            let out = cx.unhash(&out).unwrap();
            assert!(out.contains("<pre><code>code\n</code></pre>"));
            assert!(out.contains("\n<p><a href=\"#fnref-c\""));
            assert!(!out.contains("&#160;"));
        });
    }
}
