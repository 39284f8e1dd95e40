use crate::area::{guess_area, REGION_PREFIX};
use crate::embeddings::Embedder;
use crate::error::{Result, RetrievalError};
use civic_facts::Fact;
use ndarray::{Array1, Array2};
use std::cmp::Ordering;

const PLACE_BOOST: f32 = 0.15;
const TAG_BOOST: f32 = 0.10;
const AREA_BOOST: f32 = 0.5;
const MASKED_OUT_SCORE: f32 = -1.0e9;
const NORM_EPSILON: f32 = 1e-9;
const QUERY_SEPARATOR: &str = " | ";

/// Transient query derived from persona, project and chat turn. Never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    pub place: String,
    pub project_description: String,
    pub user_message: String,
    pub values: String,
    pub reasons: String,
}

impl RetrievalQuery {
    /// Join the non-empty fields with a fixed separator.
    #[must_use]
    pub fn joined(&self) -> String {
        [
            self.place.as_str(),
            self.project_description.as_str(),
            self.user_message.as_str(),
            self.values.as_str(),
            self.reasons.as_str(),
        ]
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(QUERY_SEPARATOR)
    }
}

/// Rank facts for a query and return the top `k`, best first.
///
/// Score is cosine similarity against the cached fact matrix plus
/// keyword/place boosts; a resolved area code hard-filters the candidate
/// set (see [`guess_area`]). Ties keep collection order. An empty
/// collection yields an empty result, and `k` larger than the collection
/// yields the whole ranked collection.
pub async fn retrieve(
    facts: &[Fact],
    matrix: &Array2<f32>,
    query: &RetrievalQuery,
    k: usize,
    embedder: &Embedder,
) -> Result<Vec<Fact>> {
    if facts.is_empty() {
        return Ok(Vec::new());
    }
    if matrix.nrows() != facts.len() {
        return Err(RetrievalError::InvalidDimension {
            expected: facts.len(),
            actual: matrix.nrows(),
        });
    }

    let query_text = query.joined();
    log::debug!("Retrieving top {k} facts for query '{query_text}'");

    // A blank query is still embedded; degenerate vectors are the
    // service's call, not ours.
    let query_vector = embedder.embed_query(&query_text).await?;
    let similarities = cosine_rows(&query_vector, matrix);

    let place = query.place.to_lowercase();
    let query_lower = query_text.to_lowercase();
    let mut scores: Vec<f32> = facts
        .iter()
        .zip(similarities.iter())
        .map(|(fact, similarity)| similarity + boost_for(fact, &place, &query_lower))
        .collect();

    // Hard locale filter: boost masked-in facts and sink the rest, but
    // never let a resolved area with zero matching facts suppress all
    // results.
    let mask = guess_area(&query.place).and_then(|area| {
        let mask = area_mask(facts, area);
        if mask.iter().any(|&m| m) {
            log::debug!("Area filter '{area}' matched {} facts", mask.iter().filter(|&&m| m).count());
            Some(mask)
        } else {
            log::debug!("Area filter '{area}' matched no facts, skipping");
            None
        }
    });
    if let Some(mask) = &mask {
        for (score, &matched) in scores.iter_mut().zip(mask.iter()) {
            *score = if matched {
                *score + AREA_BOOST
            } else {
                MASKED_OUT_SCORE
            };
        }
    }

    let mut order: Vec<usize> = (0..facts.len()).collect();
    // Stable sort: equal scores keep first-seen collection order.
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    Ok(order
        .into_iter()
        .filter(|&idx| mask.as_ref().map_or(true, |m| m[idx]))
        .take(k)
        .map(|idx| facts[idx].clone())
        .collect())
}

fn boost_for(fact: &Fact, place_lower: &str, query_lower: &str) -> f32 {
    let text = fact.search_text.to_lowercase();
    let mut boost = 0.0;
    if !place_lower.is_empty() && text.contains(place_lower) {
        boost += PLACE_BOOST;
    }
    if fact
        .tags
        .iter()
        .any(|tag| query_lower.contains(&tag.to_lowercase()))
    {
        boost += TAG_BOOST;
    }
    boost
}

fn area_mask(facts: &[Fact], area: &str) -> Vec<bool> {
    let id_prefix = format!("{REGION_PREFIX}-{area}-");
    let area_lower = area.to_lowercase();
    facts
        .iter()
        .map(|fact| {
            fact.id.to_uppercase().starts_with(&id_prefix)
                || fact.tags.join(" ").to_lowercase().contains(&area_lower)
        })
        .collect()
}

/// Cosine similarity of the query against every matrix row, with an
/// epsilon on both norms so degenerate all-zero vectors divide cleanly.
fn cosine_rows(query: &Array1<f32>, matrix: &Array2<f32>) -> Vec<f32> {
    let query_norm = query.dot(query).sqrt() + NORM_EPSILON;
    matrix
        .rows()
        .into_iter()
        .map(|row| {
            let row_norm = row.dot(&row).sqrt() + NORM_EPSILON;
            row.dot(query) / (query_norm * row_norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingBackend;
    use async_trait::async_trait;
    use ndarray::array;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn fact(id: &str, title: &str, summary: &str, tags: &[&str]) -> Fact {
        let mut value: Fact = serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "summary": summary,
            "tags": tags,
            "type": "note"
        }))
        .unwrap();
        value.search_text = format!(
            "{} {} {} {} note",
            title,
            summary,
            tags.join(" "),
            id
        );
        value
    }

    /// Backend returning canned vectors per exact text, with a fallback
    /// for everything else. Lets tests pin raw similarities precisely.
    struct CannedBackend {
        vectors: HashMap<String, Vec<f32>>,
        fallback: Vec<f32>,
    }

    impl CannedBackend {
        fn new(fallback: Vec<f32>) -> Self {
            Self {
                vectors: HashMap::new(),
                fallback,
            }
        }

        fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
            self.vectors.insert(text.to_string(), vector);
            self
        }
    }

    #[async_trait]
    impl EmbeddingBackend for CannedBackend {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
                .collect())
        }
    }

    fn embedder_with(backend: CannedBackend) -> Embedder {
        Embedder::new(Arc::new(backend))
    }

    #[test]
    fn query_join_skips_empty_fields() {
        let query = RetrievalQuery {
            place: "Karlsplatz".to_string(),
            project_description: "New plaza".to_string(),
            user_message: String::new(),
            values: "community".to_string(),
            reasons: String::new(),
        };
        assert_eq!(query.joined(), "Karlsplatz | New plaza | community");

        assert_eq!(RetrievalQuery::default().joined(), "");
    }

    #[test]
    fn cosine_stays_in_bounds_and_is_one_on_self() {
        let matrix = array![[1.0_f32, 0.0], [0.6, 0.8], [-1.0, 0.0], [0.0, 0.0]];
        let query = array![1.0_f32, 0.0];
        let sims = cosine_rows(&query, &matrix);

        for sim in &sims {
            assert!(*sim >= -1.0 - 1e-6 && *sim <= 1.0 + 1e-6);
        }
        assert!((sims[0] - 1.0).abs() < 1e-5);
        assert!((sims[2] + 1.0).abs() < 1e-5);
        // Degenerate all-zero row divides by the epsilon, not by zero.
        assert_eq!(sims[3], 0.0);
    }

    #[tokio::test]
    async fn empty_collection_returns_empty_not_error() {
        let embedder = embedder_with(CannedBackend::new(vec![1.0, 0.0]));
        let result = retrieve(
            &[],
            &Array2::zeros((0, 0)),
            &RetrievalQuery::default(),
            5,
            &embedder,
        )
        .await
        .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn top_k_is_min_of_k_and_collection_size() {
        let facts = vec![
            fact("VIE-DNK-01", "Path", "Repaved path", &[]),
            fact("VIE-DNK-02", "Trees", "New trees", &[]),
        ];
        let matrix = array![[1.0_f32, 0.0], [0.0, 1.0]];
        let embedder = embedder_with(CannedBackend::new(vec![1.0, 0.0]));

        let query = RetrievalQuery {
            project_description: "riverside".to_string(),
            ..Default::default()
        };

        let three = retrieve(&facts, &matrix, &query, 3, &embedder).await.unwrap();
        assert_eq!(three.len(), 2);

        let one = retrieve(&facts, &matrix, &query, 1, &embedder).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, "VIE-DNK-01");
    }

    #[tokio::test]
    async fn ranking_is_by_similarity_when_no_area_resolves() {
        let facts = vec![
            fact("VIE-DNK-01", "Path", "Repaved path", &[]),
            fact("VIE-DNK-02", "Trees", "New trees", &[]),
            fact("VIE-DNK-03", "Kiosk", "New kiosk", &[]),
        ];
        let matrix = array![[1.0_f32, 0.0], [0.9, 0.1], [0.0, 1.0]];
        let query = RetrievalQuery {
            project_description: "paths and paving".to_string(),
            ..Default::default()
        };
        let embedder = embedder_with(
            CannedBackend::new(vec![0.0, 0.0]).with(&query.joined(), vec![1.0, 0.0]),
        );

        let ranked = retrieve(&facts, &matrix, &query, 3, &embedder).await.unwrap();
        let ids: Vec<&str> = ranked.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["VIE-DNK-01", "VIE-DNK-02", "VIE-DNK-03"]);
    }

    #[tokio::test]
    async fn tag_and_place_boosts_are_additive() {
        // Two facts with identical raw similarity; boosts decide.
        let facts = vec![
            fact("VIE-DNK-01", "Kiosk", "New kiosk", &[]),
            fact(
                "VIE-DNK-02",
                "Benches at Donaukanal",
                "New benches",
                &["seating"],
            ),
        ];
        let matrix = array![[1.0_f32, 0.0], [1.0, 0.0]];
        let query = RetrievalQuery {
            place: "Donaukanal".to_string(),
            project_description: "more seating".to_string(),
            ..Default::default()
        };
        let embedder = embedder_with(
            CannedBackend::new(vec![0.0, 0.0]).with(&query.joined(), vec![1.0, 0.0]),
        );

        // Both facts carry the DNK id prefix, so the area mask keeps both
        // and the boosts still order them.
        let ranked = retrieve(&facts, &matrix, &query, 2, &embedder).await.unwrap();
        assert_eq!(ranked[0].id, "VIE-DNK-02");
        assert_eq!(ranked[1].id, "VIE-DNK-01");
    }

    #[tokio::test]
    async fn area_filter_never_pads_with_masked_out_facts() {
        // Exactly 2 of 10 facts carry the KAR tag; k=5 must return only
        // those 2, whatever the raw similarity says.
        let mut facts = Vec::new();
        for i in 0..8 {
            facts.push(fact(
                &format!("VIE-PRT-{i:02}"),
                "Lighting",
                "LED lights",
                &["lighting"],
            ));
        }
        facts.push(fact("X-01", "Bench", "New benches", &["kar"]));
        facts.push(fact("X-02", "Fountain", "Fountain repair", &["KAR"]));

        let mut rows = vec![[1.0_f32, 0.0]; 8];
        rows.push([0.0, 1.0]);
        rows.push([0.0, 1.0]);
        let matrix = Array2::from_shape_vec(
            (10, 2),
            rows.into_iter().flatten().collect(),
        )
        .unwrap();

        let query = RetrievalQuery {
            place: "Karlsplatz".to_string(),
            project_description: "lighting everywhere".to_string(),
            ..Default::default()
        };
        // Query vector favors the masked-out PRT facts.
        let embedder = embedder_with(
            CannedBackend::new(vec![0.0, 0.0]).with(&query.joined(), vec![1.0, 0.0]),
        );

        let ranked = retrieve(&facts, &matrix, &query, 5, &embedder).await.unwrap();
        let ids: Vec<&str> = ranked.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["X-01", "X-02"]);
    }

    #[tokio::test]
    async fn unmatched_area_falls_back_to_plain_ranking() {
        // Place resolves to KAR but no fact carries it; the filter must
        // be skipped entirely rather than suppressing all results.
        let facts = vec![
            fact("VIE-PRT-01", "Lighting", "LED lights", &["lighting"]),
            fact("VIE-FLR-02", "Bench", "New benches", &["seating"]),
        ];
        let matrix = array![[1.0_f32, 0.0], [0.0, 1.0]];
        let query = RetrievalQuery {
            place: "Karlsplatz".to_string(),
            project_description: "anything".to_string(),
            ..Default::default()
        };
        let embedder = embedder_with(
            CannedBackend::new(vec![0.0, 0.0]).with(&query.joined(), vec![1.0, 0.0]),
        );

        let ranked = retrieve(&facts, &matrix, &query, 2, &embedder).await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "VIE-PRT-01");
    }

    #[tokio::test]
    async fn karlsplatz_scenario_prefers_the_kar_fact() {
        // End-to-end: the PRT fact wins on raw similarity, the KAR fact
        // wins because the persona lives at Karlsplatz.
        let facts = vec![
            fact("VIE-KAR-01", "Bench replacement", "New benches installed", &["seating"]),
            fact("VIE-PRT-02", "Lighting upgrade", "New LED lights", &["lighting"]),
        ];
        let matrix = array![[1.0_f32, 0.0], [0.0, 1.0]];
        let query = RetrievalQuery {
            place: "Karlsplatz".to_string(),
            project_description: "brighter lighting at night".to_string(),
            ..Default::default()
        };
        let embedder = embedder_with(
            CannedBackend::new(vec![0.0, 0.0]).with(&query.joined(), vec![0.0, 1.0]),
        );

        let ranked = retrieve(&facts, &matrix, &query, 1, &embedder).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "VIE-KAR-01");
    }

    #[tokio::test]
    async fn ties_keep_collection_order() {
        let facts = vec![
            fact("VIE-DNK-01", "A", "same", &[]),
            fact("VIE-DNK-02", "B", "same", &[]),
            fact("VIE-DNK-03", "C", "same", &[]),
        ];
        let matrix = array![[1.0_f32, 0.0], [1.0, 0.0], [1.0, 0.0]];
        let query = RetrievalQuery {
            project_description: "same".to_string(),
            ..Default::default()
        };
        let embedder = embedder_with(
            CannedBackend::new(vec![0.0, 0.0]).with(&query.joined(), vec![1.0, 0.0]),
        );

        let ranked = retrieve(&facts, &matrix, &query, 3, &embedder).await.unwrap();
        let ids: Vec<&str> = ranked.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["VIE-DNK-01", "VIE-DNK-02", "VIE-DNK-03"]);
    }
}
