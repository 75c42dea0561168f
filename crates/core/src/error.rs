use thiserror::Error;

/// Convenience alias used throughout marksmith.
pub type Result<T, E = MarksmithError> = std::result::Result<T, E>;

/// Errors that can occur while configuring or running a conversion.
///
/// Malformed Markdown never produces one of these; it degrades to literal
/// text and, at most, a [`ConversionWarning`].
#[derive(Debug, Error)]
pub enum MarksmithError {
    /// IO error while reading a source file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The requested text encoding label is not known.
    #[error("Unknown text encoding: {0}")]
    UnknownEncoding(String),
    /// An extra name outside the supported set.
    #[error("Unknown extra: {0}")]
    UnknownExtra(String),
    /// An extra was given an argument of the wrong shape.
    #[error("Invalid argument for extra '{extra}': {message}")]
    InvalidExtraArgument {
        /// Extra name
        extra: String,
        /// What was wrong with the argument
        message: String,
    },
    /// `safe_mode` was neither `escape` nor `replace`.
    #[error("Invalid value for 'safe_mode': {0:?} (must be 'escape' or 'replace')")]
    InvalidSafeMode(String),
    /// A link pattern failed to compile.
    #[error("Invalid link pattern {pattern:?}: {message}")]
    InvalidLinkPattern {
        /// Pattern source
        pattern: String,
        /// Compiler message
        message: String,
    },
    /// An options document could not be deserialized.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    /// A placeholder key survived to the end of the pipeline without a table entry.
    #[error("Internal error: unresolved placeholder {key:?}")]
    UnresolvedPlaceholder {
        /// The printable part of the offending key
        key: String,
    },
    /// The HTML post-rewriter failed.
    #[error("HTML rewrite error: {0}")]
    Rewrite(String),
}

impl MarksmithError {
    /// Create an invalid-extra-argument error.
    pub fn extra_argument(extra: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidExtraArgument {
            extra: extra.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors raised before any text is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownExtra(_)
                | Self::InvalidExtraArgument { .. }
                | Self::InvalidSafeMode(_)
                | Self::InvalidLinkPattern { .. }
                | Self::InvalidOptions(_)
        )
    }
}

/// Non-fatal findings that don't prevent rendering.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConversionWarning {
    /// Document starts with `---` but no well-formed metadata block follows.
    MalformedMetadata,
    /// A reference link or image names a label with no definition.
    UnresolvedReference {
        /// Case-folded label
        label: String,
    },
    /// A footnote reference names an id with no definition.
    UndefinedFootnote {
        /// Normalized footnote id
        id: String,
    },
    /// Raw HTML was sanitized because safe mode is on.
    SanitizedHtml {
        /// Number of characters of markup affected
        len: usize,
    },
}

impl std::fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionWarning::MalformedMetadata => {
                write!(f, "leading '---' is not a well-formed metadata block")
            }
            ConversionWarning::UnresolvedReference { label } => {
                write!(f, "no link definition for [{}]", label)
            }
            ConversionWarning::UndefinedFootnote { id } => {
                write!(f, "no footnote definition for [^{}]", id)
            }
            ConversionWarning::SanitizedHtml { len } => {
                write!(f, "sanitized {} characters of raw HTML", len)
            }
        }
    }
}

/// Collection of conversion diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// List of non-fatal warnings, in the order they were found
    pub warnings: Vec<ConversionWarning>,
}

impl Diagnostics {
    /// Create a new empty diagnostics collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a warning, logging it at debug level.
    pub fn warn(&mut self, warning: ConversionWarning) {
        log::debug!("markdown: {}", warning);
        self.warnings.push(warning);
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Consume the collection, yielding the warnings.
    pub fn into_warnings(self) -> Vec<ConversionWarning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        assert!(MarksmithError::UnknownExtra("bogus".into()).is_configuration());
        assert!(MarksmithError::extra_argument("toc", "no payload").is_configuration());
        assert!(
            !MarksmithError::UnresolvedPlaceholder {
                key: "B00".into()
            }
            .is_configuration()
        );
    }

    #[test]
    fn warnings_display_their_subject() {
        let warning = ConversionWarning::UndefinedFootnote { id: "1".into() };
        assert_eq!(warning.to_string(), "no footnote definition for [^1]");
    }

    #[test]
    fn diagnostics_collect_in_order() {
        let mut diagnostics = Diagnostics::new();
        assert!(!diagnostics.has_warnings());
        diagnostics.warn(ConversionWarning::MalformedMetadata);
        diagnostics.warn(ConversionWarning::UnresolvedReference {
            label: "x".into(),
        });
        assert_eq!(
            diagnostics.into_warnings(),
            vec![
                ConversionWarning::MalformedMetadata,
                ConversionWarning::UnresolvedReference { label: "x".into() },
            ]
        );
    }
}
