//! The converter: option validation, the pass pipeline, and its result.

use std::path::Path;

use marksmith_core::{
    ConversionWarning, MarksmithError, Metadata, MetadataExtraction, Result, Salt, TextTransform,
    TransformChain, extract_metadata, normalize,
};
use serde::Serialize;

use crate::options::{ExtraKind, Options};
use crate::passes::Conversion;
use crate::toc::{TocEntry, toc_html};
use crate::transform::nofollow::add_nofollow;

/// Output of one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    /// The HTML document, ending in a newline.
    pub html: String,
    /// Leading metadata block, with the `metadata` extra.
    pub metadata: Option<Metadata>,
    /// Nested header list, with the `toc` extra and at least one header.
    pub toc_html: Option<String>,
    /// Soft failures met along the way.
    pub warnings: Vec<ConversionWarning>,
}

/// A configured Markdown converter.
///
/// Holds only immutable settings and the placeholder salt; every call to
/// [`Markdown::convert`] works in a fresh context, so one converter can be
/// reused and shared between threads.
#[derive(Debug)]
pub struct Markdown {
    options: Options,
    salt: Salt,
    preprocess: TransformChain,
    postprocess: TransformChain,
}

impl Markdown {
    /// Validates `options` and builds a converter.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        let salt = Salt::new(options.seed.unwrap_or_else(rand::random));
        Ok(Self {
            options,
            salt,
            preprocess: TransformChain::new(),
            postprocess: TransformChain::new(),
        })
    }

    /// Runs `transform` on the normalized source before any pass.
    pub fn with_preprocessor<T: TextTransform + 'static>(mut self, transform: T) -> Self {
        self.preprocess.push(transform);
        self
    }

    /// Runs `transform` on the generated HTML before placeholders are
    /// resolved.
    pub fn with_postprocessor<T: TextTransform + 'static>(mut self, transform: T) -> Self {
        self.postprocess.push(transform);
        self
    }

    /// The options this converter was built with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Converts one document.
    pub fn convert(&self, text: &str) -> Result<Rendered> {
        let options = &self.options;
        let rng_seed = options.seed.unwrap_or_else(rand::random);
        let mut cx = Conversion::new(options, self.salt, rng_seed);

        let mut text = normalize(text, options.tab_width);
        text.push_str("\n\n");

        if options.has(ExtraKind::Metadata) {
            match extract_metadata(&text) {
                MetadataExtraction::Absent => {}
                MetadataExtraction::Malformed => cx.warn(ConversionWarning::MalformedMetadata),
                MetadataExtraction::Found {
                    metadata,
                    body_start,
                } => {
                    log::debug!("markdown: {} metadata entries", metadata.len());
                    cx.metadata = Some(metadata);
                    text = text.split_off(body_start);
                }
            }
        }

        let mut text = self.preprocess.apply(&text).into_owned();

        let fenced = options.has(ExtraKind::FencedCodeBlocks);
        let safe = options.safe_mode.is_some();
        if fenced && !safe {
            text = cx.do_fenced_code_blocks(&text);
        }
        if safe {
            text = cx.hash_html_spans(&text);
        }
        text = cx.hash_html_blocks(&text, true);
        if fenced && safe {
            text = cx.do_fenced_code_blocks(&text);
        }

        if options.has(ExtraKind::Footnotes) {
            text = cx.strip_footnote_definitions(&text);
        }
        text = cx.strip_link_definitions(&text);

        text = cx.run_block_gamut(&text);
        if options.has(ExtraKind::Footnotes) {
            text = cx.add_footnotes(&text);
        }

        let text = self.postprocess.apply(&text);
        let mut html = cx.unhash(&text)?;
        if options.has(ExtraKind::Nofollow) {
            html = add_nofollow(&html)?;
        }
        html.push('\n');

        let toc_html = if options.has(ExtraKind::Toc) {
            let entries = cx
                .toc
                .iter()
                .map(|entry| {
                    Ok(TocEntry {
                        name: cx.unhash(&entry.name)?,
                        ..entry.clone()
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            toc_html(&entries)
        } else {
            None
        };

        Ok(Rendered {
            html,
            metadata: cx.metadata.take(),
            toc_html,
            warnings: cx.diagnostics.into_warnings(),
        })
    }

    /// Reads `path`, decodes it with the named encoding (UTF-8 when `None`),
    /// and converts it. A byte-order mark overrides the label.
    pub fn convert_path(&self, path: impl AsRef<Path>, encoding: Option<&str>) -> Result<Rendered> {
        let path = path.as_ref();
        let label = encoding.unwrap_or("utf-8");
        let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| MarksmithError::UnknownEncoding(label.to_string()))?;
        let bytes = std::fs::read(path)?;
        let (text, used, had_errors) = encoding.decode(&bytes);
        if had_errors {
            log::warn!(
                "{}: malformed {} sequences replaced",
                path.display(),
                used.name()
            );
        }
        self.convert(&text)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;
    use crate::options::Extra;

    fn convert(options: Options, text: &str) -> Rendered {
        Markdown::new(options.seed(7)).unwrap().convert(text).unwrap()
    }

    #[test]
    fn empty_input() {
        let rendered = convert(Options::new(), "");
        assert_eq!(rendered.html, "\n");
        assert!(rendered.warnings.is_empty());
    }

    #[test]
    fn metadata_is_split_off() {
        let rendered = convert(
            Options::new().extra(Extra::Metadata),
            "---\ntitle: Hello\n---\nBody text\n",
        );
        assert_eq!(rendered.html, "<p>Body text</p>\n");
        assert_eq!(rendered.metadata.unwrap().get("title"), Some("Hello"));
    }

    #[test]
    fn malformed_metadata_warns() {
        let rendered = convert(Options::new().extra(Extra::Metadata), "---\nno colon\n");
        assert!(rendered.metadata.is_none());
        assert_eq!(rendered.warnings, vec![ConversionWarning::MalformedMetadata]);
    }

    #[test]
    fn without_metadata_extra_the_block_is_markdown() {
        let rendered = convert(Options::new(), "---\ntitle: Hello\n---\nBody text\n");
        assert_eq!(
            rendered.html,
            "<hr />\n\n<h2>title: Hello</h2>\n\n<p>Body text</p>\n"
        );
    }

    fn fill_name(s: &str) -> Cow<'_, str> {
        Cow::Owned(s.replace("{name}", "World"))
    }

    fn classify_paragraphs(s: &str) -> Cow<'_, str> {
        Cow::Owned(s.replace("<p>", "<p class=\"x\">"))
    }

    #[test]
    fn hooks_run_around_the_passes() {
        let markdown = Markdown::new(Options::new())
            .unwrap()
            .with_preprocessor(fill_name)
            .with_postprocessor(classify_paragraphs);
        assert_eq!(
            markdown.convert("Hello {name}").unwrap().html,
            "<p class=\"x\">Hello World</p>\n"
        );
    }

    #[test]
    fn toc_names_are_resolved() {
        let rendered = convert(Options::new().extra(Extra::Toc), "# `a` b\n\n## c\n");
        assert_eq!(
            rendered.toc_html.as_deref(),
            Some(
                "<ul>\n  <li><a href=\"#a-b\"><code>a</code> b</a>\n  <ul>\n    \
                 <li><a href=\"#c\">c</a></li>\n  </ul></li>\n</ul>\n"
            )
        );
    }

    #[test]
    fn invalid_options_fail_early() {
        let err = Markdown::new(Options::new().tab_width(0)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn converter_is_reusable() {
        let markdown = Markdown::new(Options::new().extra(Extra::header_ids())).unwrap();
        let first = markdown.convert("# Same\n").unwrap();
        let second = markdown.convert("# Same\n").unwrap();
        assert_eq!(first.html, "<h1 id=\"same\">Same</h1>\n");
        assert_eq!(first, second);
    }
}
