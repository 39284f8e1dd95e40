use crate::error::{FactsError, Result};
use crate::fact::Fact;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Reads the backing fact collection.
pub struct FactStore;

impl FactStore {
    /// Load facts from a JSON array file, preserving file order.
    ///
    /// Every fact gets its `search_text` computed here; ids must be
    /// non-empty and unique within the collection.
    pub async fn load(path: impl AsRef<Path>) -> Result<Vec<Fact>> {
        let path = path.as_ref();
        log::info!("Loading facts from {:?}", path);

        let bytes = tokio::fs::read(path).await?;
        let mut facts: Vec<Fact> = serde_json::from_slice(&bytes)?;

        let mut seen: HashSet<String> = HashSet::new();
        for fact in &mut facts {
            if fact.id.is_empty() {
                return Err(FactsError::InvalidFact(
                    "fact with empty id".to_string(),
                ));
            }
            if !seen.insert(fact.id.clone()) {
                return Err(FactsError::InvalidFact(format!(
                    "duplicate fact id '{}'",
                    fact.id
                )));
            }
            fact.build_search_text();
        }

        log::info!("Loaded {} facts", facts.len());
        Ok(facts)
    }
}

/// Content checksum over the ordered (id, title, summary) triples.
///
/// Cache-invalidation key only, not a security hash.
#[must_use]
pub fn checksum(facts: &[Fact]) -> String {
    let mut hasher = Sha256::new();
    for fact in facts {
        hasher.update(fact.id.as_bytes());
        hasher.update(fact.title.as_bytes());
        hasher.update(fact.summary.as_bytes());
    }
    to_lower_hex(&hasher.finalize())
}

fn to_lower_hex(bytes: &[u8]) -> String {
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(LUT[(byte >> 4) as usize] as char);
        out.push(LUT[(byte & 0x0f) as usize] as char);
    }
    out
}
