use serde::{Deserialize, Serialize};

/// One knowledge item about a place.
///
/// The `id` convention embeds a region and area segment (`VIE-KAR-01`),
/// which the retrieval layer uses for hard locale filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub time: FactTime,

    /// Concatenation of title, summary, tags, id and type, built once at
    /// load time and used as the embedding input. Not part of the file
    /// format.
    #[serde(skip)]
    pub search_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactTime {
    #[serde(default)]
    pub as_of: String,
}

impl Fact {
    pub(crate) fn build_search_text(&mut self) {
        self.search_text = [
            self.title.as_str(),
            self.summary.as_str(),
            &self.tags.join(" "),
            self.id.as_str(),
            self.kind.as_str(),
        ]
        .join(" ");
    }
}
