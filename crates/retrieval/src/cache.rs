use crate::embeddings::Embedder;
use crate::error::Result;
use civic_facts::Fact;
use ndarray::Array2;
use std::sync::Arc;
use tokio::sync::Mutex;

struct CacheEntry {
    checksum: String,
    matrix: Arc<Array2<f32>>,
}

/// Single-slot embedding matrix cache keyed by the fact checksum.
///
/// The lock is held across a rebuild, so at most one rebuild is in flight
/// per session; concurrent callers wait and then observe the fresh entry.
/// The entry is replaced wholesale only after a successful build; a
/// failed rebuild leaves the previous, still-valid matrix untouched.
#[derive(Default)]
pub struct EmbeddingCache {
    slot: Mutex<Option<CacheEntry>>,
}

impl EmbeddingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached matrix for `checksum`, or rebuild it by embedding
    /// every fact's `search_text` in one batch.
    pub async fn get_or_build(
        &self,
        facts: &[Fact],
        checksum: &str,
        embedder: &Embedder,
    ) -> Result<Arc<Array2<f32>>> {
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            if entry.checksum == checksum {
                log::debug!("Embedding cache hit ({checksum})");
                return Ok(Arc::clone(&entry.matrix));
            }
            log::info!(
                "Fact collection changed ({} -> {checksum}), rebuilding embeddings",
                entry.checksum
            );
        } else {
            log::info!("Building embedding matrix for {} facts", facts.len());
        }

        let texts: Vec<String> = facts.iter().map(|f| f.search_text.clone()).collect();
        let matrix = Arc::new(embedder.embed_matrix(&texts).await?);

        *slot = Some(CacheEntry {
            checksum: checksum.to_string(),
            matrix: Arc::clone(&matrix),
        });
        Ok(matrix)
    }
}
