//! Conversion options and the closed set of extras.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use marksmith_core::{DEFAULT_TAB_WIDTH, MarksmithError, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

/// How raw HTML in the source is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeMode {
    /// Escape `&`, `<` and `>` so the markup shows as text.
    Escape,
    /// Replace the markup with `[HTML_REMOVED]`.
    Replace,
}

impl SafeMode {
    /// Text substituted for raw HTML in [`SafeMode::Replace`].
    pub const REMOVED_TEXT: &'static str = "[HTML_REMOVED]";

    /// Sanitize a fragment of raw HTML.
    pub fn sanitize(self, html: &str) -> String {
        match self {
            SafeMode::Replace => Self::REMOVED_TEXT.to_string(),
            SafeMode::Escape => html_escape::encode_text(html).into_owned(),
        }
    }
}

impl FromStr for SafeMode {
    type Err = MarksmithError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "escape" => Ok(SafeMode::Escape),
            "replace" => Ok(SafeMode::Replace),
            other => Err(MarksmithError::InvalidSafeMode(other.to_string())),
        }
    }
}

/// Payload-free identifier of an extra, used for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtraKind {
    /// `code-friendly`
    CodeFriendly,
    /// `cuddled-lists`
    CuddledLists,
    /// `demote-headers`
    DemoteHeaders,
    /// `fenced-code-blocks`
    FencedCodeBlocks,
    /// `footnotes`
    Footnotes,
    /// `header-ids`
    HeaderIds,
    /// `html-classes`
    HtmlClasses,
    /// `link-patterns`
    LinkPatterns,
    /// `markdown-in-html`
    MarkdownInHtml,
    /// `metadata`
    Metadata,
    /// `nofollow`
    Nofollow,
    /// `pyshell`
    Pyshell,
    /// `smarty-pants`
    SmartyPants,
    /// `toc`
    Toc,
    /// `wiki-tables`
    WikiTables,
    /// `xml`
    Xml,
}

impl ExtraKind {
    const ALL: [ExtraKind; 16] = [
        ExtraKind::CodeFriendly,
        ExtraKind::CuddledLists,
        ExtraKind::DemoteHeaders,
        ExtraKind::FencedCodeBlocks,
        ExtraKind::Footnotes,
        ExtraKind::HeaderIds,
        ExtraKind::HtmlClasses,
        ExtraKind::LinkPatterns,
        ExtraKind::MarkdownInHtml,
        ExtraKind::Metadata,
        ExtraKind::Nofollow,
        ExtraKind::Pyshell,
        ExtraKind::SmartyPants,
        ExtraKind::Toc,
        ExtraKind::WikiTables,
        ExtraKind::Xml,
    ];

    /// The dashed name used in option documents.
    pub fn name(self) -> &'static str {
        match self {
            ExtraKind::CodeFriendly => "code-friendly",
            ExtraKind::CuddledLists => "cuddled-lists",
            ExtraKind::DemoteHeaders => "demote-headers",
            ExtraKind::FencedCodeBlocks => "fenced-code-blocks",
            ExtraKind::Footnotes => "footnotes",
            ExtraKind::HeaderIds => "header-ids",
            ExtraKind::HtmlClasses => "html-classes",
            ExtraKind::LinkPatterns => "link-patterns",
            ExtraKind::MarkdownInHtml => "markdown-in-html",
            ExtraKind::Metadata => "metadata",
            ExtraKind::Nofollow => "nofollow",
            ExtraKind::Pyshell => "pyshell",
            ExtraKind::SmartyPants => "smarty-pants",
            ExtraKind::Toc => "toc",
            ExtraKind::WikiTables => "wiki-tables",
            ExtraKind::Xml => "xml",
        }
    }
}

impl FromStr for ExtraKind {
    type Err = MarksmithError;

    fn from_str(s: &str) -> Result<Self> {
        ExtraKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| MarksmithError::UnknownExtra(s.to_string()))
    }
}

impl fmt::Display for ExtraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An enabled extra together with its argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extra {
    /// Only `*` triggers emphasis; underscores are always literal.
    CodeFriendly,
    /// Lists may directly follow paragraph text without a blank line.
    CuddledLists,
    /// Shift every header down by this many levels (capped at `h6`).
    DemoteHeaders(u8),
    /// Fenced code blocks delimited by lines of three backticks.
    FencedCodeBlocks,
    /// `[^id]` footnote references and definitions.
    Footnotes,
    /// Slug `id` attributes on headers, with an optional prefix.
    HeaderIds {
        /// Joined to every id with a hyphen.
        prefix: Option<String>,
    },
    /// Class attributes for generated `pre` and `code` tags.
    HtmlClasses(BTreeMap<String, String>),
    /// Auto-link text matching [`Options::link_patterns`].
    LinkPatterns,
    /// Process Markdown inside block HTML tagged `markdown="1"`.
    MarkdownInHtml,
    /// Extract a leading `---` key/value block.
    Metadata,
    /// Add `rel="nofollow"` to links.
    Nofollow,
    /// Treat unindented `>>>` interactive sessions as code blocks.
    Pyshell,
    /// Curly quotes, dashes and ellipses.
    SmartyPants,
    /// Build a table of contents from the headers.
    Toc,
    /// `||cell||cell||` tables.
    WikiTables,
    /// Keep XML processing instructions and namespaced one-liners unwrapped.
    Xml,
}

impl Extra {
    /// Header-ids without a prefix.
    pub const fn header_ids() -> Self {
        Extra::HeaderIds { prefix: None }
    }

    /// Identifier of this extra.
    pub fn kind(&self) -> ExtraKind {
        match self {
            Extra::CodeFriendly => ExtraKind::CodeFriendly,
            Extra::CuddledLists => ExtraKind::CuddledLists,
            Extra::DemoteHeaders(_) => ExtraKind::DemoteHeaders,
            Extra::FencedCodeBlocks => ExtraKind::FencedCodeBlocks,
            Extra::Footnotes => ExtraKind::Footnotes,
            Extra::HeaderIds { .. } => ExtraKind::HeaderIds,
            Extra::HtmlClasses(_) => ExtraKind::HtmlClasses,
            Extra::LinkPatterns => ExtraKind::LinkPatterns,
            Extra::MarkdownInHtml => ExtraKind::MarkdownInHtml,
            Extra::Metadata => ExtraKind::Metadata,
            Extra::Nofollow => ExtraKind::Nofollow,
            Extra::Pyshell => ExtraKind::Pyshell,
            Extra::SmartyPants => ExtraKind::SmartyPants,
            Extra::Toc => ExtraKind::Toc,
            Extra::WikiTables => ExtraKind::WikiTables,
            Extra::Xml => ExtraKind::Xml,
        }
    }

    /// Builds an extra from its dashed name and JSON argument.
    ///
    /// `null` (or `true`) stands for "no argument".
    pub fn from_name(name: &str, arg: &Value) -> Result<Self> {
        let kind: ExtraKind = name.parse()?;
        let extra = match kind {
            ExtraKind::CodeFriendly => Extra::CodeFriendly,
            ExtraKind::CuddledLists => Extra::CuddledLists,
            ExtraKind::FencedCodeBlocks => Extra::FencedCodeBlocks,
            ExtraKind::Footnotes => Extra::Footnotes,
            ExtraKind::LinkPatterns => Extra::LinkPatterns,
            ExtraKind::MarkdownInHtml => Extra::MarkdownInHtml,
            ExtraKind::Metadata => Extra::Metadata,
            ExtraKind::Nofollow => Extra::Nofollow,
            ExtraKind::Pyshell => Extra::Pyshell,
            ExtraKind::SmartyPants => Extra::SmartyPants,
            ExtraKind::Toc => Extra::Toc,
            ExtraKind::WikiTables => Extra::WikiTables,
            ExtraKind::Xml => Extra::Xml,
            ExtraKind::DemoteHeaders => {
                let levels = arg
                    .as_u64()
                    .filter(|n| (1..=5).contains(n))
                    .ok_or_else(|| {
                        MarksmithError::extra_argument(name, "expected an integer from 1 to 5")
                    })?;
                Extra::DemoteHeaders(levels as u8)
            }
            ExtraKind::HeaderIds => match arg {
                Value::Null | Value::Bool(true) => Extra::header_ids(),
                Value::String(prefix) if prefix.is_empty() => Extra::header_ids(),
                Value::String(prefix) => Extra::HeaderIds {
                    prefix: Some(prefix.clone()),
                },
                _ => {
                    return Err(MarksmithError::extra_argument(
                        name,
                        "expected a prefix string or null",
                    ));
                }
            },
            ExtraKind::HtmlClasses => {
                let object = arg.as_object().ok_or_else(|| {
                    MarksmithError::extra_argument(name, "expected a map of tag name to class")
                })?;
                let mut classes = BTreeMap::new();
                for (tag, class) in object {
                    let class = class.as_str().ok_or_else(|| {
                        MarksmithError::extra_argument(
                            name,
                            format!("class for '{}' must be a string", tag),
                        )
                    })?;
                    classes.insert(tag.clone(), class.to_string());
                }
                Extra::HtmlClasses(classes)
            }
        };
        Ok(extra)
    }
}

/// The set of enabled extras, one entry per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extras {
    enabled: BTreeMap<ExtraKind, Extra>,
}

impl Extras {
    /// No extras.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables `extra`, replacing any earlier argument for the same kind.
    ///
    /// Enabling [`Extra::Toc`] also enables header ids when they are off.
    pub fn insert(&mut self, extra: Extra) {
        if extra.kind() == ExtraKind::Toc {
            self.enabled
                .entry(ExtraKind::HeaderIds)
                .or_insert_with(Extra::header_ids);
        }
        self.enabled.insert(extra.kind(), extra);
    }

    /// Returns true if `kind` is enabled.
    pub fn contains(&self, kind: ExtraKind) -> bool {
        self.enabled.contains_key(&kind)
    }

    /// The enabled extra of `kind`, if any.
    pub fn get(&self, kind: ExtraKind) -> Option<&Extra> {
        self.enabled.get(&kind)
    }

    /// Enabled extras in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Extra> {
        self.enabled.values()
    }

    /// Number of enabled extras.
    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    /// Returns true if nothing is enabled.
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    /// Header-id prefix, when header ids are on and carry one.
    pub fn header_id_prefix(&self) -> Option<&str> {
        match self.get(ExtraKind::HeaderIds) {
            Some(Extra::HeaderIds { prefix }) => prefix.as_deref(),
            _ => None,
        }
    }

    /// Number of levels headers are demoted by (0 when off).
    pub fn demote_headers(&self) -> u8 {
        match self.get(ExtraKind::DemoteHeaders) {
            Some(Extra::DemoteHeaders(levels)) => *levels,
            _ => 0,
        }
    }

    /// Configured class for generated `tag` elements.
    pub fn html_class(&self, tag: &str) -> Option<&str> {
        match self.get(ExtraKind::HtmlClasses) {
            Some(Extra::HtmlClasses(classes)) => classes.get(tag).map(String::as_str),
            _ => None,
        }
    }
}

impl FromIterator<Extra> for Extras {
    fn from_iter<I: IntoIterator<Item = Extra>>(iter: I) -> Self {
        let mut extras = Extras::new();
        for extra in iter {
            extras.insert(extra);
        }
        extras
    }
}

/// Callback form of a link pattern replacement.
pub type LinkCallback = Arc<dyn Fn(&Captures<'_>) -> String + Send + Sync>;

/// How a link pattern match becomes an `href`.
#[derive(Clone)]
pub enum Replacement {
    /// `$1`-style template expanded against the match.
    Template(String),
    /// Arbitrary function of the match.
    Callback(LinkCallback),
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Replacement::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// A compiled pattern whose matches are turned into links.
#[derive(Debug, Clone)]
pub struct LinkPattern {
    regex: Regex,
    replacement: Replacement,
}

impl LinkPattern {
    /// Compiles `pattern` with an `href` template such as
    /// `https://bugs.example.com/$1`.
    pub fn new(pattern: &str, template: impl Into<String>) -> Result<Self> {
        Ok(Self {
            regex: compile_pattern(pattern)?,
            replacement: Replacement::Template(template.into()),
        })
    }

    /// Compiles `pattern` with an `href`-building callback.
    pub fn with_callback<F>(pattern: &str, callback: F) -> Result<Self>
    where
        F: Fn(&Captures<'_>) -> String + Send + Sync + 'static,
    {
        Ok(Self {
            regex: compile_pattern(pattern)?,
            replacement: Replacement::Callback(Arc::new(callback)),
        })
    }

    /// The compiled expression.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Builds the `href` for one match.
    pub fn href(&self, caps: &Captures<'_>) -> String {
        match &self.replacement {
            Replacement::Template(template) => {
                let mut href = String::new();
                caps.expand(template, &mut href);
                href
            }
            Replacement::Callback(callback) => callback(caps),
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| MarksmithError::InvalidLinkPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

/// Options for one converter.
#[derive(Debug, Clone)]
pub struct Options {
    /// Tab stop width used when expanding tabs and reading indentation.
    pub tab_width: usize,
    /// Emit `<br>` rather than `<br />` for empty elements.
    pub html4tags: bool,
    /// Raw HTML handling; `None` passes HTML through.
    pub safe_mode: Option<SafeMode>,
    /// Enabled extras.
    pub extras: Extras,
    /// Patterns for the `link-patterns` extra, tried in order.
    pub link_patterns: Vec<LinkPattern>,
    /// Seed for placeholder salts and e-mail obfuscation. Random when unset.
    pub seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tab_width: DEFAULT_TAB_WIDTH,
            html4tags: false,
            safe_mode: None,
            extras: Extras::new(),
            link_patterns: Vec::new(),
            seed: None,
        }
    }
}

impl Options {
    /// Default options: no extras, HTML passed through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tab width.
    pub fn tab_width(mut self, tab_width: usize) -> Self {
        self.tab_width = tab_width;
        self
    }

    /// Emits HTML4-style empty elements.
    pub fn html4tags(mut self, html4tags: bool) -> Self {
        self.html4tags = html4tags;
        self
    }

    /// Turns on safe mode.
    pub fn safe_mode(mut self, mode: SafeMode) -> Self {
        self.safe_mode = Some(mode);
        self
    }

    /// Enables an extra.
    pub fn extra(mut self, extra: Extra) -> Self {
        self.extras.insert(extra);
        self
    }

    /// Adds a link pattern and enables `link-patterns`.
    pub fn link_pattern(mut self, pattern: LinkPattern) -> Self {
        self.extras.insert(Extra::LinkPatterns);
        self.link_patterns.push(pattern);
        self
    }

    /// Fixes the seed for reproducible output.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns true if `kind` is enabled.
    pub fn has(&self, kind: ExtraKind) -> bool {
        self.extras.contains(kind)
    }

    /// Closing of empty elements such as `<br />`.
    pub fn empty_element_suffix(&self) -> &'static str {
        if self.html4tags { ">" } else { " />" }
    }

    /// Parses a JSON options document.
    ///
    /// ```json
    /// {
    ///   "tab_width": 4,
    ///   "safe_mode": "escape",
    ///   "extras": {"footnotes": null, "header-ids": "doc"},
    ///   "link_patterns": [["#(\\d+)", "https://bugs.example.com/$1"]]
    /// }
    /// ```
    ///
    /// `extras` may also be a plain list of names.
    pub fn from_json(document: &str) -> Result<Self> {
        let config: OptionsConfig = serde_json::from_str(document)
            .map_err(|err| MarksmithError::InvalidOptions(err.to_string()))?;
        config.into_options()
    }

    /// Checks settings that cannot be expressed in the types.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.tab_width == 0 {
            return Err(MarksmithError::InvalidOptions(
                "tab_width must be at least 1".to_string(),
            ));
        }
        if self.has(ExtraKind::LinkPatterns) && self.link_patterns.is_empty() {
            return Err(MarksmithError::extra_argument(
                ExtraKind::LinkPatterns.name(),
                "enabled without any link patterns",
            ));
        }
        if !self.has(ExtraKind::LinkPatterns) && !self.link_patterns.is_empty() {
            log::warn!(
                "{} link patterns ignored: link-patterns is not enabled",
                self.link_patterns.len()
            );
        }
        Ok(())
    }
}

/// Serialized shape of [`Options`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsConfig {
    /// Tab stop width.
    pub tab_width: Option<usize>,
    /// HTML4 empty elements.
    pub html4tags: bool,
    /// `null`/`false`, `true` (replace), `"escape"` or `"replace"`.
    pub safe_mode: Value,
    /// Extras as names or a name-to-argument map.
    pub extras: ExtrasConfig,
    /// `[pattern, template]` pairs.
    pub link_patterns: Vec<(String, String)>,
    /// Fixed seed.
    pub seed: Option<u64>,
}

/// Extras as they appear in an options document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExtrasConfig {
    /// `["footnotes", "toc"]`
    List(Vec<String>),
    /// `{"footnotes": null, "header-ids": "prefix"}`
    Map(BTreeMap<String, Value>),
}

impl Default for ExtrasConfig {
    fn default() -> Self {
        ExtrasConfig::List(Vec::new())
    }
}

impl OptionsConfig {
    /// Validates the document into typed options.
    pub fn into_options(self) -> Result<Options> {
        let safe_mode = match self.safe_mode {
            Value::Null | Value::Bool(false) => None,
            Value::Bool(true) => Some(SafeMode::Replace),
            Value::String(mode) => Some(mode.parse()?),
            other => return Err(MarksmithError::InvalidSafeMode(other.to_string())),
        };

        let mut extras = Extras::new();
        match self.extras {
            ExtrasConfig::List(names) => {
                for name in names {
                    extras.insert(Extra::from_name(&name, &Value::Null)?);
                }
            }
            ExtrasConfig::Map(map) => {
                for (name, arg) in map {
                    extras.insert(Extra::from_name(&name, &arg)?);
                }
            }
        }

        let link_patterns = self
            .link_patterns
            .iter()
            .map(|(pattern, template)| LinkPattern::new(pattern, template.as_str()))
            .collect::<Result<Vec<_>>>()?;

        let options = Options {
            tab_width: self.tab_width.unwrap_or(DEFAULT_TAB_WIDTH),
            html4tags: self.html4tags,
            safe_mode,
            extras,
            link_patterns,
            seed: self.seed,
        };
        options.validate()?;
        Ok(options)
    }
}
