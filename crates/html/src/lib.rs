#![deny(missing_docs)]
//! Markdown to HTML conversion with markdown2-compatible extras.
//!
//! ```
//! use marksmith_html::{Extra, Markdown, Options};
//!
//! let markdown = Markdown::new(Options::new().extra(Extra::Footnotes)).unwrap();
//! let rendered = markdown.convert("*boo!*").unwrap();
//! assert_eq!(rendered.html, "<p><em>boo!</em></p>\n");
//! ```

/// Parallel conversion of many documents.
pub mod batch;
/// The converter and its result type.
pub mod converter;
/// Options and extras.
pub mod options;
/// Table of contents rendering.
pub mod toc;
/// Smart punctuation, link patterns and nofollow rewriting.
pub mod transform;

mod passes;

use std::path::Path;

pub use batch::{BatchInput, BatchOptions, BatchProcessingResult, BatchResult, convert_batch};
pub use converter::{Markdown, Rendered};
pub use marksmith_core::{ConversionWarning, MarksmithError, Metadata, Result, TextTransform};
pub use options::{Extra, ExtraKind, Extras, LinkPattern, Options, SafeMode};
pub use toc::TocEntry;

/// Converts `text` with a one-off converter.
pub fn markdown(text: &str, options: Options) -> Result<Rendered> {
    Markdown::new(options)?.convert(text)
}

/// Converts the file at `path`, decoded with `encoding` (UTF-8 when `None`).
pub fn markdown_path(
    path: impl AsRef<Path>,
    encoding: Option<&str>,
    options: Options,
) -> Result<Rendered> {
    Markdown::new(options)?.convert_path(path, encoding)
}
