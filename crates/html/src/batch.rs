//! Parallel conversion of many documents with one converter.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::converter::{Markdown, Rendered};

/// One document to convert.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchInput {
    /// Caller's identifier, typically a file path.
    pub id: String,
    /// Markdown source.
    pub source: String,
}

/// Result for a single document.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Identifier matching the input.
    pub id: String,
    /// Present on success.
    pub result: Option<Rendered>,
    /// Present on failure.
    pub error: Option<String>,
}

/// Statistics for a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStats {
    /// Number of documents given.
    pub total: u32,
    /// Documents converted.
    pub succeeded: u32,
    /// Documents that failed.
    pub failed: u32,
    /// Wall-clock time in milliseconds.
    pub processing_time_ms: f64,
}

/// Options for batch processing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchOptions {
    /// Maximum number of worker threads. Defaults to rayon's global pool.
    pub max_threads: Option<u32>,
    /// Keep going after a failure. Defaults to true.
    pub continue_on_error: Option<bool>,
}

/// Results in input order, plus statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProcessingResult {
    /// One entry per processed input.
    pub results: Vec<BatchResult>,
    /// Processing statistics.
    pub stats: BatchStats,
}

/// Converts `inputs` in parallel.
///
/// Every document gets its own conversion context. When
/// `continue_on_error` is false, documents are converted in order and the
/// run stops after the first failure.
pub fn convert_batch(
    markdown: &Markdown,
    inputs: Vec<BatchInput>,
    options: Option<BatchOptions>,
) -> BatchProcessingResult {
    let start = Instant::now();
    let opts = options.unwrap_or_default();
    let continue_on_error = opts.continue_on_error.unwrap_or(true);

    let pool = opts.max_threads.and_then(|max_threads| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads as usize)
            .build()
            .map_err(|err| log::warn!("falling back to the global thread pool: {}", err))
            .ok()
    });

    let total = saturating_count(inputs.len());
    let succeeded = AtomicU32::new(0);
    let failed = AtomicU32::new(0);

    let process_input = |input: BatchInput| -> BatchResult {
        match markdown.convert(&input.source) {
            Ok(result) => {
                succeeded.fetch_add(1, Ordering::Relaxed);
                BatchResult {
                    id: input.id,
                    result: Some(result),
                    error: None,
                }
            }
            Err(err) => {
                failed.fetch_add(1, Ordering::Relaxed);
                log::debug!("{}: {}", input.id, err);
                BatchResult {
                    id: input.id,
                    result: None,
                    error: Some(err.to_string()),
                }
            }
        }
    };

    let results: Vec<BatchResult> = if continue_on_error {
        match pool {
            Some(pool) => pool.install(|| inputs.into_par_iter().map(process_input).collect()),
            None => inputs.into_par_iter().map(process_input).collect(),
        }
    } else {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let result = process_input(input);
            let stop = result.error.is_some();
            results.push(result);
            if stop {
                break;
            }
        }
        results
    };

    BatchProcessingResult {
        results,
        stats: BatchStats {
            total,
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
    }
}

/// Document counts saturate at `u32::MAX`.
fn saturating_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Extra, Options};

    fn inputs(n: usize) -> Vec<BatchInput> {
        (0..n)
            .map(|i| BatchInput {
                id: format!("doc-{}.md", i),
                source: format!("# Title\n\nDocument *{}*\n", i),
            })
            .collect()
    }

    #[test]
    fn results_keep_input_order() {
        let markdown = Markdown::new(Options::new().extra(Extra::header_ids())).unwrap();
        let out = convert_batch(
            &markdown,
            inputs(16),
            Some(BatchOptions {
                max_threads: Some(2),
                ..Default::default()
            }),
        );
        assert_eq!(out.stats.total, 16);
        assert_eq!(out.stats.succeeded, 16);
        assert_eq!(out.stats.failed, 0);
        for (i, item) in out.results.iter().enumerate() {
            assert_eq!(item.id, format!("doc-{}.md", i));
            let html = &item.result.as_ref().unwrap().html;
            // Each document has its own slug state.
            assert!(html.starts_with("<h1 id=\"title\">Title</h1>"));
            assert!(html.contains(&format!("<em>{}</em>", i)));
        }
    }

    #[test]
    fn empty_batch() {
        let markdown = Markdown::new(Options::new()).unwrap();
        let out = convert_batch(&markdown, Vec::new(), None);
        assert!(out.results.is_empty());
        assert_eq!(out.stats.total, 0);
    }

    #[test]
    fn counts_saturate_instead_of_wrapping() {
        assert_eq!(saturating_count(16), 16);
        assert_eq!(saturating_count(usize::MAX), u32::MAX);
    }
}
