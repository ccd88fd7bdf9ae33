use crate::error::Result;
use crate::scanner::FileScanner;
use semindex_vector_store::SizeEstimate;
use std::path::Path;

pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;
pub const DEFAULT_CODE_MULTIPLIER: f64 = 1.2;
pub const DEFAULT_AVG_TOKENS_PER_VECTOR: u64 = 100;

/// Heuristic pre-index corpus sizing.
///
/// Runs once, before the first scan of a brand-new collection, so the
/// storage tuner can size the collection ahead of any data. Never invoked
/// again for an existing collection.
#[derive(Debug, Clone)]
pub struct SizeEstimator {
    chars_per_token: f64,
    code_multiplier: f64,
    avg_tokens_per_vector: u64,
}

impl Default for SizeEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            code_multiplier: DEFAULT_CODE_MULTIPLIER,
            avg_tokens_per_vector: DEFAULT_AVG_TOKENS_PER_VECTOR,
        }
    }
}

impl SizeEstimator {
    #[must_use]
    pub fn new(chars_per_token: f64, code_multiplier: f64, avg_tokens_per_vector: u64) -> Self {
        Self {
            chars_per_token,
            code_multiplier,
            avg_tokens_per_vector: avg_tokens_per_vector.max(1),
        }
    }

    /// Walk the workspace with the same filters the main scanner applies,
    /// read every remaining file in full, and sum the token heuristic.
    /// Files that fail to read are skipped; they never fail the estimate.
    pub async fn estimate(&self, root: impl AsRef<Path>) -> Result<SizeEstimate> {
        let root = root.as_ref();
        let files = {
            let scanner = FileScanner::new(root);
            tokio::task::spawn_blocking(move || scanner.scan())
                .await
                .map_err(|e| crate::error::IndexerError::Other(format!("file walk failed: {e}")))?
        };

        let mut result = SizeEstimate::default();
        for path in files {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(err) => {
                    log::debug!("Skipping unreadable file {}: {err}", path.display());
                    continue;
                }
            };

            result.file_count += 1;
            result.total_file_size += content.len() as u64;
            result.estimated_token_count += self.tokens_for_chars(content.chars().count());
        }

        result.estimated_vector_count =
            result.estimated_token_count.div_ceil(self.avg_tokens_per_vector);

        log::info!(
            "Size estimate for {}: {} files, ~{} tokens, ~{} vectors",
            root.display(),
            result.file_count,
            result.estimated_token_count,
            result.estimated_vector_count
        );
        Ok(result)
    }

    /// `tokens = floor(ceil(chars / chars_per_token) * code_multiplier)`
    fn tokens_for_chars(&self, chars: usize) -> u64 {
        let base = (chars as f64 / self.chars_per_token).ceil();
        (base * self.code_multiplier).floor() as u64
    }
}
