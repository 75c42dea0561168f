//! Rewrites applied around the core passes.
//!
//! - `smartypants`: curly quotes, dashes and ellipses as HTML entities.
//! - `link_patterns`: caller-supplied patterns turned into anchors.
//! - `nofollow`: `rel="nofollow"` on the finished document's links.

/// Auto-linking of caller-supplied patterns.
pub(crate) mod link_patterns;
/// `rel="nofollow"` rewriting with lol_html.
pub mod nofollow;
/// Smart punctuation (quotes, dashes, ellipses).
pub mod smartypants;
