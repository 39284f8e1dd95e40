//! # Civic Retrieval
//!
//! Retrieval-augmented grounding over the local fact collection.
//!
//! The pipeline turns facts into an embedding matrix (cached per content
//! checksum), embeds a persona-derived query, and ranks facts by cosine
//! similarity plus keyword/place boosts and a hard area filter:
//!
//! ```text
//! Fact[] ──> Embedder ──> EmbeddingCache (Arc<Array2<f32>>, keyed by checksum)
//!                              │
//! RetrievalQuery ──> query vector
//!                              │
//!                     cosine + boosts + area mask ──> top-k Fact[]
//! ```

mod area;
mod cache;
mod embeddings;
mod error;
mod ranker;

pub use area::{guess_area, AreaRule, AREA_RULES, REGION_PREFIX};
pub use cache::EmbeddingCache;
pub use embeddings::{
    Embedder, EmbeddingBackend, EmbeddingConfig, HttpEmbeddingBackend, StubEmbeddingBackend,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{Result, RetrievalError};
pub use ranker::{retrieve, RetrievalQuery};
