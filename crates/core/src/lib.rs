#![deny(missing_docs)]
//! Marksmith core: text normalization, metadata extraction, slugs, and the
//! placeholder machinery shared by the HTML converter.

/// Fenced code block detection.
pub mod code_fence;
/// Core error and diagnostic types.
pub mod error;
/// Front-matter metadata extraction.
pub mod metadata;
/// Line ending, tab and indentation helpers.
pub mod normalize;
/// Pre/post-processing hooks.
pub mod pipeline;
/// Placeholder keys and tables.
pub mod placeholder;
/// Slug generation utilities.
pub mod slug;

pub use code_fence::{FencePhase, FencedBlock, find_fenced_blocks};
pub use error::{ConversionWarning, Diagnostics, MarksmithError, Result};
pub use metadata::{Metadata, MetadataExtraction, extract_metadata};
pub use normalize::{DEFAULT_TAB_WIDTH, normalize};
pub use pipeline::{TextTransform, TransformChain};
pub use placeholder::{EscapeTable, Namespace, PlaceholderTable, Salt, unhash};
pub use slug::{Slugger, slugify};
