//! # Civic Facts
//!
//! Loading and fingerprinting of the local fact collection that grounds
//! generated feedback.
//!
//! A fact is a small structured knowledge record about a place (new benches,
//! a lighting upgrade, a closed path). Facts are read from a JSON array,
//! normalized into searchable form at load time, and fingerprinted with a
//! content checksum so downstream embedding caches can tell whether the
//! collection changed.

mod error;
mod fact;
mod store;

pub use error::{FactsError, Result};
pub use fact::{Fact, FactTime};
pub use store::{checksum, FactStore};
