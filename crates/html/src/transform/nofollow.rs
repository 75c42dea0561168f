//! Adds `rel="nofollow"` to every `<a href>` in a finished document.

use lol_html::{HtmlRewriter, Settings, element};
use marksmith_core::{MarksmithError, Result};

/// Rewrites `html`, leaving everything but the anchors' `rel` untouched.
///
/// An existing `rel` keeps its values and gains `nofollow`.
pub fn add_nofollow(html: &str) -> Result<String> {
    if !html.contains("<a") && !html.contains("<A") {
        return Ok(html.to_string());
    }
    let mut output = Vec::with_capacity(html.len() + 64);
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("a[href]", |el| {
                let rel = match el.get_attribute("rel") {
                    Some(rel) if rel.split_whitespace().any(|v| v == "nofollow") => return Ok(()),
                    Some(rel) if !rel.trim().is_empty() => format!("{} nofollow", rel.trim()),
                    _ => "nofollow".to_string(),
                };
                el.set_attribute("rel", &rel)?;
                Ok(())
            })],
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );
    rewriter
        .write(html.as_bytes())
        .map_err(|err| MarksmithError::Rewrite(err.to_string()))?;
    rewriter
        .end()
        .map_err(|err| MarksmithError::Rewrite(err.to_string()))?;
    String::from_utf8(output).map_err(|err| MarksmithError::Rewrite(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::add_nofollow;

    #[test]
    fn anchors_with_href_only() {
        let html = "<p><a href=\"http://x.org\">x</a> <a name=\"top\">t</a></p>\n";
        assert_eq!(
            add_nofollow(html).unwrap(),
            "<p><a href=\"http://x.org\" rel=\"nofollow\">x</a> <a name=\"top\">t</a></p>\n"
        );
    }

    #[test]
    fn existing_rel_is_extended_once() {
        let out = add_nofollow("<a href=\"/\" rel=\"me\">a</a>").unwrap();
        assert_eq!(out, "<a href=\"/\" rel=\"me nofollow\">a</a>");
        assert_eq!(add_nofollow(&out).unwrap(), out);
    }

    #[test]
    fn other_markup_is_byte_identical() {
        let html = "<p>a<br />b &amp; <img src=\"x\" alt=\"y\" /></p>";
        assert_eq!(add_nofollow(html).unwrap(), html);
    }
}
