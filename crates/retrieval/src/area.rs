//! Coarse area resolution from free-text place names.
//!
//! Fact ids embed a `{REGION}-{AREA}-` prefix (`VIE-KAR-01`); resolving a
//! persona's place to the same area code lets the ranker hard-filter facts
//! to the right locale.

/// Region segment used in fact id prefixes.
pub const REGION_PREFIX: &str = "VIE";

/// One substring rule: any trigger contained in the lower-cased place
/// resolves to `code`.
pub struct AreaRule {
    pub code: &'static str,
    pub triggers: &'static [&'static str],
}

/// Ordered rule table. Earlier rules win; extending coverage means adding
/// rows here, not touching ranking logic.
pub const AREA_RULES: &[AreaRule] = &[
    AreaRule {
        code: "FLR",
        triggers: &["floridsdorf", "florisdorf", "1210", "21st", "21.", "xxi"],
    },
    AreaRule {
        code: "KAR",
        triggers: &["karlsplatz", "karls"],
    },
    AreaRule {
        code: "PRT",
        triggers: &["praterstern", "prater", "leopoldstadt", "1020", "2nd", "2."],
    },
    AreaRule {
        code: "DNK",
        triggers: &["donaukanal"],
    },
];

/// Map a free-text place name to an area code.
///
/// First matching rule wins. `None` means the place is outside the known
/// set, which is a normal outcome, not an error; ranking then falls back
/// to similarity and boosts over the whole collection.
#[must_use]
pub fn guess_area(place: &str) -> Option<&'static str> {
    if place.trim().is_empty() {
        return None;
    }
    let p = place.to_lowercase();
    AREA_RULES
        .iter()
        .find(|rule| rule.triggers.iter().any(|trigger| p.contains(trigger)))
        .map(|rule| rule.code)
}
