//! The conversion passes and the per-call state they share.
//!
//! Every pass is a method on [`Conversion`], a context built fresh for each
//! document and dropped when the call returns.

mod blocks;
mod definitions;
mod emphasis;
mod footnotes;
mod hash_html;
mod links;
mod lists;
mod spans;
mod tables;

use std::collections::HashMap;

use marksmith_core::{
    ConversionWarning, Diagnostics, EscapeTable, Metadata, Namespace, PlaceholderTable, Result,
    Salt, Slugger, unhash,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::options::{ExtraKind, Options};
use crate::toc::TocEntry;

pub(crate) use hash_html::tokenize_html;

/// Mutable state of one conversion.
pub(crate) struct Conversion<'o> {
    pub(crate) options: &'o Options,
    /// Raw and generated block HTML.
    pub(crate) blocks: PlaceholderTable,
    /// Inline HTML hashed in safe mode.
    pub(crate) spans: PlaceholderTable,
    /// Encoded code bodies.
    pub(crate) code: PlaceholderTable,
    pub(crate) escapes: EscapeTable,
    /// Link definitions keyed by lower-cased label.
    pub(crate) urls: HashMap<String, String>,
    pub(crate) titles: HashMap<String, String>,
    /// Footnote bodies keyed by normalized id.
    pub(crate) footnotes: HashMap<String, String>,
    /// Referenced footnote ids, in first-reference order.
    pub(crate) footnote_ids: Vec<String>,
    footnote_ref_counts: HashMap<String, usize>,
    pub(crate) slugger: Slugger,
    pub(crate) toc: Vec<TocEntry>,
    pub(crate) list_level: usize,
    pub(crate) last_li_ends_with_two_eols: bool,
    pub(crate) metadata: Option<Metadata>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) rng: StdRng,
}

impl<'o> Conversion<'o> {
    pub(crate) fn new(options: &'o Options, salt: Salt, rng_seed: u64) -> Self {
        // Backslash-escaped quotes must survive smart punctuation.
        let extra_escapes = if options.has(ExtraKind::SmartyPants) {
            "\"'"
        } else {
            ""
        };
        let slugger = match options.extras.header_id_prefix() {
            Some(prefix) => Slugger::with_prefix(prefix),
            None => Slugger::new(),
        };
        Self {
            options,
            blocks: PlaceholderTable::new(Namespace::Block, salt),
            spans: PlaceholderTable::new(Namespace::Span, salt),
            code: PlaceholderTable::new(Namespace::Code, salt),
            escapes: EscapeTable::new(salt, extra_escapes),
            urls: HashMap::new(),
            titles: HashMap::new(),
            footnotes: HashMap::new(),
            footnote_ids: Vec::new(),
            footnote_ref_counts: HashMap::new(),
            slugger,
            toc: Vec::new(),
            list_level: 0,
            last_li_ends_with_two_eols: false,
            metadata: None,
            diagnostics: Diagnostics::new(),
            rng: StdRng::seed_from_u64(rng_seed),
        }
    }

    pub(crate) fn has(&self, kind: ExtraKind) -> bool {
        self.options.has(kind)
    }

    pub(crate) fn empty_suffix(&self) -> &'static str {
        self.options.empty_element_suffix()
    }

    pub(crate) fn warn(&mut self, warning: ConversionWarning) {
        self.diagnostics.warn(warning);
    }

    /// ` class="..."` for a generated tag, or nothing.
    pub(crate) fn class_attr(&self, tag: &str) -> String {
        match self.options.extras.html_class(tag) {
            Some(class) => format!(" class=\"{}\"", class),
            None => String::new(),
        }
    }

    /// Sanitizes raw HTML when safe mode is on.
    pub(crate) fn sanitize(&mut self, html: &str) -> String {
        match self.options.safe_mode {
            Some(mode) => {
                self.warn(ConversionWarning::SanitizedHtml { len: html.len() });
                mode.sanitize(html)
            }
            None => html.to_string(),
        }
    }

    /// Stores encoded code and returns its key.
    pub(crate) fn hash_code(&mut self, code: &str) -> String {
        let encoded = html_escape::encode_text(code);
        self.code.insert(encoded.into_owned())
    }

    /// Replaces `*` and `_` with their escape keys.
    pub(crate) fn hide_emphasis(&self, text: &str) -> String {
        self.escapes.hide(text, &['*', '_'])
    }

    /// Next id for a footnote reference: `fnref-ID`, then `fnref-ID-2`, ...
    pub(crate) fn footnote_ref_id(&mut self, id: &str) -> String {
        let count = self.footnote_ref_counts.entry(id.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            format!("fnref-{}", id)
        } else {
            format!("fnref-{}-{}", id, count)
        }
    }

    /// Resolves every placeholder left in `text`.
    pub(crate) fn unhash(&self, text: &str) -> Result<String> {
        unhash(
            text,
            &[&self.blocks, &self.spans, self.escapes.table(), &self.code],
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn with_conversion<T>(options: &Options, f: impl FnOnce(&mut Conversion<'_>) -> T) -> T {
        let mut cx = Conversion::new(options, Salt::new(11), 11);
        f(&mut cx)
    }
}
