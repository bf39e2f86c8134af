// 🔗 Identity Resolver - which knowledge-base entity is this register row?
//
// Priority, first hit wins:
//   1. existing link (prior runs, manual corrections)
//   2. curated static mapping for the record's category
//   3. no match → a new entity downstream, reported for audit
//
// The name × location predicate used to build the reserve mapping lives here
// too, so harvesting and resolving share one definition of "same area".

use crate::error::BuildResult;
use crate::record::{fields, SourceRecord};
use crate::reference::MappingEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

// ============================================================================
// EXISTING LINKS
// ============================================================================

/// nature id → entity id, from earlier reconciliation work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExistingLinks {
    links: HashMap<String, String>,
}

impl ExistingLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, nature_id: &str) -> Option<&str> {
        self.links.get(nature_id).map(|s| s.as_str())
    }

    pub fn insert(&mut self, nature_id: impl Into<String>, entity: impl Into<String>) {
        self.links.insert(nature_id.into(), entity.into());
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExistingLinks {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ExistingLinks {
            links: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Already linked in the knowledge base
    Existing { entity: String },

    /// Found in the static mapping. `alternatives` lists the other entities
    /// the mapping offered for the same id; non-empty means ambiguous.
    Mapped {
        entity: String,
        alternatives: Vec<String>,
    },

    /// No match: a new entity will be created
    Unmatched,
}

impl Resolution {
    pub fn entity(&self) -> Option<&str> {
        match self {
            Resolution::Existing { entity } | Resolution::Mapped { entity, .. } => {
                Some(entity.as_str())
            }
            Resolution::Unmatched => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        !matches!(self, Resolution::Unmatched)
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Resolution::Mapped { alternatives, .. } if !alternatives.is_empty())
    }
}

/// Decide the target entity for a record
pub fn resolve(
    record: &SourceRecord,
    existing: &ExistingLinks,
    mapping: &[MappingEntry],
) -> BuildResult<Resolution> {
    let nature_id = record.nature_id()?;

    if let Some(entity) = existing.get(nature_id) {
        debug!(nature_id, entity, "matched via existing link");
        return Ok(Resolution::Existing {
            entity: entity.to_string(),
        });
    }

    let hits = mapping_entries(nature_id, mapping);
    let Some(first) = hits.first() else {
        warn!(nature_id, name = record.display_name(), "record has no match");
        return Ok(Resolution::Unmatched);
    };

    let mut alternatives: Vec<String> = Vec::new();
    for other in &hits[1..] {
        if other.item != first.item && !alternatives.contains(&other.item) {
            alternatives.push(other.item.clone());
        }
    }
    if !alternatives.is_empty() {
        warn!(
            nature_id,
            chosen = %first.item,
            ?alternatives,
            "static mapping is ambiguous, using first entry"
        );
    } else if hits.len() > 1 {
        warn!(nature_id, entries = hits.len(), "static mapping repeats the same entry");
    }

    debug!(nature_id, entity = %first.item, "matched via static mapping");
    Ok(Resolution::Mapped {
        entity: first.item.clone(),
        alternatives,
    })
}

/// Every static mapping entry for a nature id, in table order
pub fn mapping_entries<'m>(nature_id: &str, mapping: &'m [MappingEntry]) -> Vec<&'m MappingEntry> {
    mapping.iter().filter(|m| m.nature_id == nature_id).collect()
}

// ============================================================================
// MATCHING PRIMITIVE
// ============================================================================

/// Split a comma-separated location field into trimmed names
pub fn split_locations(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Names refer to the same area: equal, or one extends the other
/// ("Foo" / "Foo naturreservat"). An empty name relates to nothing.
pub fn names_related(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.starts_with(b) || b.starts_with(a)
}

/// Exact set equality of location names
pub fn same_locations<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> bool {
    let left: BTreeSet<&str> = a.iter().map(|s| s.as_ref().trim()).collect();
    let right: BTreeSet<&str> = b.iter().map(|s| s.as_ref().trim()).collect();
    left == right
}

/// Whether a register record is a candidate for an external title + locations.
/// Every register row qualifies, whatever its decision status.
pub fn is_candidate<S: AsRef<str>>(record: &SourceRecord, title: &str, locations: &[S]) -> bool {
    if locations.is_empty() {
        return false;
    }
    let (Some(name), Some(raw_locations)) = (
        record.get_opt(fields::NAME),
        record.get_opt(fields::MUNICIPALITIES),
    ) else {
        return false;
    };

    names_related(name, title) && same_locations(split_locations(raw_locations).as_slice(), locations)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArticleMatch<'a> {
    Exact(&'a SourceRecord),
    /// Several candidates, needs manual review
    Multiple(Vec<&'a SourceRecord>),
    None,
}

/// Article titles that never describe a single reserve: list pages and
/// national parks (those are mapped by hand)
pub fn is_excluded_title(title: &str) -> bool {
    title.starts_with("Lista") || title.to_lowercase().contains("nationalpark")
}

/// Match an article title and its location categories against the register
pub fn match_article<'a, S: AsRef<str>>(
    title: &str,
    locations: &[S],
    records: &'a [SourceRecord],
) -> ArticleMatch<'a> {
    let title = title.replace('_', " ");
    if is_excluded_title(&title) {
        return ArticleMatch::None;
    }
    let mut guesses: Vec<&SourceRecord> = records
        .iter()
        .filter(|r| is_candidate(r, &title, locations))
        .collect();

    match guesses.len() {
        0 => ArticleMatch::None,
        1 => ArticleMatch::Exact(guesses.remove(0)),
        _ => ArticleMatch::Multiple(guesses),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CURRENT_STATUS;

    fn create_test_record(id: &str, name: &str, municipalities: &str) -> SourceRecord {
        SourceRecord::from_pairs([
            (fields::NATURE_ID, id),
            (fields::NAME, name),
            (fields::MUNICIPALITIES, municipalities),
            (fields::STATUS, CURRENT_STATUS),
        ])
    }

    #[test]
    fn test_existing_link_wins_over_mapping() {
        let record = create_test_record("2000123", "Store Mosse", "Gnosjö");
        let existing: ExistingLinks = [("2000123", "Q100")].into_iter().collect();
        let mapping = vec![MappingEntry::new("2000123", "Q42")];

        let resolution = resolve(&record, &existing, &mapping).unwrap();
        assert_eq!(resolution, Resolution::Existing { entity: "Q100".to_string() });
        assert_eq!(resolution.entity(), Some("Q100"));
    }

    #[test]
    fn test_static_mapping_match() {
        let record = create_test_record("2000123", "Store Mosse", "Gnosjö");
        let mapping = vec![
            MappingEntry::new("1", "Q1"),
            MappingEntry::new("2000123", "Q42"),
        ];

        let resolution = resolve(&record, &ExistingLinks::new(), &mapping).unwrap();
        assert_eq!(resolution.entity(), Some("Q42"));
        assert!(!resolution.is_ambiguous());
    }

    #[test]
    fn test_unmatched() {
        let record = create_test_record("2000123", "Store Mosse", "Gnosjö");
        let resolution = resolve(&record, &ExistingLinks::new(), &[]).unwrap();
        assert_eq!(resolution, Resolution::Unmatched);
        assert!(!resolution.is_matched());
    }

    #[test]
    fn test_ambiguous_mapping_takes_first() {
        let record = create_test_record("5", "Foo", "Bar");
        let mapping = vec![
            MappingEntry::new("5", "Q1"),
            MappingEntry::new("5", "Q1"),
            MappingEntry::new("5", "Q2"),
        ];

        let resolution = resolve(&record, &ExistingLinks::new(), &mapping).unwrap();
        assert_eq!(
            resolution,
            Resolution::Mapped {
                entity: "Q1".to_string(),
                alternatives: vec!["Q2".to_string()],
            }
        );
        assert!(resolution.is_ambiguous());
    }

    #[test]
    fn test_missing_id_fails() {
        let record = SourceRecord::from_pairs([(fields::NAME, "Nameless")]);
        assert!(resolve(&record, &ExistingLinks::new(), &[]).is_err());
    }

    #[test]
    fn test_names_related() {
        assert!(names_related("Granliden", "Granliden"));
        assert!(names_related("Granliden", "Granliden naturreservat"));
        assert!(names_related("Granliden naturreservat", "Granliden"));
        assert!(!names_related("Granliden", "Storliden"));
    }

    #[test]
    fn test_same_locations_ignores_order() {
        assert!(same_locations(&["Kiruna", "Gällivare"], &["Gällivare", " Kiruna"]));
        assert!(!same_locations(&["Kiruna"], &["Kiruna", "Gällivare"]));
    }

    #[test]
    fn test_match_article_buckets() {
        let records = vec![
            create_test_record("1", "Granliden", "Örnsköldsvik"),
            create_test_record("2", "Storberget", "Kiruna, Gällivare"),
            create_test_record("3", "Storberget norra", "Kiruna, Gällivare"),
        ];

        match match_article("Granliden_naturreservat", &["Örnsköldsvik"], &records) {
            ArticleMatch::Exact(r) => assert_eq!(r.nature_id(), Ok("1")),
            other => panic!("expected exact match, got {:?}", other),
        }

        match match_article("Storberget", &["Gällivare", "Kiruna"], &records) {
            ArticleMatch::Multiple(rs) => assert_eq!(rs.len(), 2),
            other => panic!("expected multiple matches, got {:?}", other),
        }

        assert_eq!(
            match_article("Granliden", &["Kiruna"], &records),
            ArticleMatch::None
        );
        let no_locations: [&str; 0] = [];
        assert_eq!(
            match_article("Granliden", &no_locations, &records),
            ArticleMatch::None
        );
    }

    #[test]
    fn test_non_current_records_are_candidates() {
        let record = SourceRecord::from_pairs([
            (fields::NATURE_ID, "1"),
            (fields::NAME, "Granliden"),
            (fields::MUNICIPALITIES, "Örnsköldsvik"),
            (fields::STATUS, "Överklagat"),
        ]);
        assert!(is_candidate(&record, "Granliden", &["Örnsköldsvik"]));
    }

    #[test]
    fn test_empty_names_never_relate() {
        assert!(!names_related("", "Granliden"));
        assert!(!names_related("Granliden", "  "));
        assert!(!names_related("", ""));

        let records = vec![create_test_record("1", "", "Kiruna")];
        assert_eq!(match_article("Granliden", &["Kiruna"], &records), ArticleMatch::None);
        assert_eq!(match_article("", &["Kiruna"], &records), ArticleMatch::None);
    }

    #[test]
    fn test_list_and_park_titles_are_skipped() {
        let records = vec![
            create_test_record("1", "Lista över naturreservat", "Kiruna"),
            create_test_record("2", "Abisko nationalpark", "Kiruna"),
        ];
        assert!(is_excluded_title("Lista över naturreservat i Norrbottens län"));
        assert!(is_excluded_title("Abisko Nationalpark"));
        assert_eq!(
            match_article("Lista_över_naturreservat", &["Kiruna"], &records),
            ArticleMatch::None
        );
        assert_eq!(
            match_article("Abisko nationalpark", &["Kiruna"], &records),
            ArticleMatch::None
        );
    }

    #[test]
    fn test_repeated_mapping_entry_is_not_ambiguous() {
        let record = create_test_record("5", "Foo", "Bar");
        let mapping = vec![MappingEntry::new("5", "Q1"), MappingEntry::new("5", "Q1")];

        assert_eq!(mapping_entries("5", &mapping).len(), 2);
        let resolution = resolve(&record, &ExistingLinks::new(), &mapping).unwrap();
        assert_eq!(
            resolution,
            Resolution::Mapped {
                entity: "Q1".to_string(),
                alternatives: vec![],
            }
        );
    }
}
