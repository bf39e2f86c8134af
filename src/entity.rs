// 🌲 Entity Assembler - one register row → one complete entity description
//
// Reserve vs national park is decided once per record and carries the
// category-specific parts: instance item, static mapping, provenance source,
// description templates. Claims are added in a fixed sequence so the same row
// always yields the same claim order.

use crate::claims::{Claim, DateValue, RawValue, Reference, StatementBuilder};
use crate::error::{BuildError, BuildResult};
use crate::record::{fields, SourceRecord};
use crate::reference::{ImportConfig, MappingEntry, ReferenceData};
use crate::resolver::{resolve, split_locations, ExistingLinks, Resolution};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Municipality names in the register that the vocabulary knows differently
const MUNICIPALITY_ALIASES: &[(&str, &str)] = &[
    ("Malung", "Malung-Sälen"), // renamed 2007
    ("Göteborg", "Gothenburg"),
];

/// Misspelled or outdated operator names in the register
const OPERATOR_ALIASES: &[(&str, &str)] = &[
    ("Hässelholms kommun", "Hässleholms kommun"),
    ("Malungs kommun", "Malung-Sälens kommun"),
];

/// Area breakdown columns and the item each part applies to
const AREA_PARTS: &[(&str, &str)] = &[
    (fields::AREA_WOODS, "woods"),
    (fields::AREA_LAND, "land"),
    (fields::AREA_WATER, "water"),
];

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Reserve,
    NationalPark,
}

impl Category {
    /// From the register's protection type column
    pub fn from_protection_type(value: &str) -> BuildResult<Self> {
        match value.trim() {
            "Naturreservat" => Ok(Category::Reserve),
            "Nationalpark" => Ok(Category::NationalPark),
            other => Err(BuildError::UnknownCategory {
                value: other.to_string(),
            }),
        }
    }

    pub fn of(record: &SourceRecord) -> BuildResult<Self> {
        Category::from_protection_type(record.get(fields::PROTECTION_TYPE)?)
    }

    /// Item key of what the entity is an instance of
    pub fn instance_item_key(&self) -> &'static str {
        match self {
            Category::Reserve => "nature_reserve",
            Category::NationalPark => "national_park",
        }
    }

    /// Item key of the register publication cited as provenance
    pub fn source_item_key(&self) -> &'static str {
        match self {
            Category::Reserve => "source_nr",
            Category::NationalPark => "source_np",
        }
    }

    /// Static mapping curated for this category
    pub fn mapping<'a>(&self, data: &'a ReferenceData) -> &'a [MappingEntry] {
        match self {
            Category::Reserve => &data.mapping_reserves,
            Category::NationalPark => &data.mapping_national_parks,
        }
    }
}

// ============================================================================
// ENTITY DESCRIPTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub language: String,
    pub value: String,
}

impl Term {
    pub fn new(language: impl Into<String>, value: impl Into<String>) -> Self {
        Term {
            language: language.into(),
            value: value.into(),
        }
    }
}

/// Everything the upsert collaborator needs for one area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub nature_id: String,
    pub name: String,
    pub category: Category,
    pub labels: Vec<Term>,
    pub descriptions: Vec<Term>,
    /// Target entity, `None` = create a new one
    pub linked_entity: Option<String>,
    pub claims: Vec<Claim>,
    /// False = keep in the preview/audit stream but do not write
    pub upload: bool,
}

impl EntityDescription {
    pub fn label(&self, language: &str) -> Option<&str> {
        find_term(&self.labels, language)
    }

    pub fn description(&self, language: &str) -> Option<&str> {
        find_term(&self.descriptions, language)
    }

    /// Claims built from one semantic property key, in insertion order
    pub fn claims_for(&self, property_key: &str) -> Vec<&Claim> {
        self.claims
            .iter()
            .filter(|c| c.property_key == property_key)
            .collect()
    }

    pub fn disable_upload(&mut self) {
        self.upload = false;
    }

    /// SHA-256 over the canonical JSON form; equal descriptions, equal hash
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let json = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn find_term<'a>(terms: &'a [Term], language: &str) -> Option<&'a str> {
    terms
        .iter()
        .find(|t| t.language == language)
        .map(|t| t.value.as_str())
}

// ============================================================================
// STRING GENERATION
// ============================================================================

/// Labels: the name in the primary language, plus every configured language
/// unless the name already carries a category word ("... nationalpark").
pub fn make_labels(name: &str, config: &ImportConfig) -> Vec<Term> {
    let lower = name.to_lowercase();
    let qualified = config
        .label_exclude_words
        .iter()
        .any(|word| lower.contains(&word.to_lowercase()));

    let mut labels = vec![Term::new(config.primary_language.clone(), name)];
    if !qualified {
        labels.extend(
            config
                .label_languages
                .iter()
                .filter(|lang| **lang != config.primary_language)
                .map(|lang| Term::new(lang.clone(), name)),
        );
    }
    labels
}

/// "Jönköpings län" → "Jönköping": drop the trailing "län" and the genitive s
pub fn normalize_region(county: &str) -> String {
    let words: Vec<&str> = county.split_whitespace().collect();
    if words.len() < 2 {
        return county.trim().to_string();
    }

    let region = words[..words.len() - 1].join(" ");
    match region.strip_suffix('s') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => region,
    }
}

/// Descriptions per category. Reserve templates interpolate the region,
/// except in languages that have their own inflected location phrase.
pub fn make_descriptions(
    category: Category,
    record: &SourceRecord,
    data: &ReferenceData,
) -> BuildResult<Vec<Term>> {
    let glossary = &data.glossary;

    match category {
        Category::NationalPark => Ok(glossary
            .np_description
            .iter()
            .map(|(lang, text)| Term::new(lang.clone(), text.clone()))
            .collect()),
        Category::Reserve => {
            let region = normalize_region(record.get(fields::COUNTY)?);
            let mut descriptions = Vec::with_capacity(glossary.nr_description.len());

            for (lang, template) in &glossary.nr_description {
                let location = if glossary.has_locations_for(lang) {
                    glossary.location_in(lang, &region).ok_or_else(|| {
                        BuildError::UnresolvedVocabulary {
                            table: format!("location_in.{}", lang),
                            value: region.clone(),
                        }
                    })?
                } else {
                    region.as_str()
                };
                descriptions.push(Term::new(lang.clone(), template.replace("{}", location)));
            }
            Ok(descriptions)
        }
    }
}

/// Decision date column, e.g. "{2009-06-25 00:00:00}" → 2009-06-25
pub fn decision_date(record: &SourceRecord) -> BuildResult<Option<DateValue>> {
    let Some(raw) = record.get_opt(fields::DECISION_DATE) else {
        return Ok(None);
    };
    let trimmed = raw.trim_start_matches(|c: char| !c.is_ascii_digit());
    if trimmed.is_empty() {
        return Ok(None);
    }
    let date: String = trimmed.chars().take(10).collect();
    DateValue::parse(&date).map(Some)
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Result of assembling one record
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub entity: EntityDescription,
    pub resolution: Resolution,
}

pub struct NatureAreaAssembler<'a> {
    data: &'a ReferenceData,
    existing: &'a ExistingLinks,
}

impl<'a> NatureAreaAssembler<'a> {
    pub fn new(data: &'a ReferenceData, existing: &'a ExistingLinks) -> Self {
        NatureAreaAssembler { data, existing }
    }

    /// Build the complete description of one record
    pub fn assemble(&self, record: &SourceRecord) -> BuildResult<Assembly> {
        let category = Category::of(record)?;
        let nature_id = record.nature_id()?;
        let name = record.name()?;

        let resolution = resolve(record, self.existing, category.mapping(self.data))?;
        if let Some(entity) = resolution.entity() {
            debug!(nature_id, entity, "associated entity");
        }

        let reference = Arc::new(self.make_reference(category, nature_id)?);
        let mut builder = StatementBuilder::new(self.data).with_default_reference(reference);

        let labels = make_labels(name, &self.data.config);
        let descriptions = make_descriptions(category, record, self.data)?;

        self.set_instance_of(&mut builder, category)?;
        self.set_country(&mut builder)?;
        self.set_municipalities(&mut builder, record)?;
        self.set_operator(&mut builder, record)?;
        self.set_nature_id(&mut builder, nature_id)?;
        self.set_iucn_status(&mut builder, record)?;
        self.set_area(&mut builder, record)?;
        self.set_inception(&mut builder, record)?;

        let entity = EntityDescription {
            nature_id: nature_id.to_string(),
            name: name.to_string(),
            category,
            labels,
            descriptions,
            linked_entity: resolution.entity().map(str::to_string),
            claims: builder.finalize(),
            upload: true,
        };

        Ok(Assembly { entity, resolution })
    }

    /// The register publication this category cites
    fn make_reference(&self, category: Category, nature_id: &str) -> BuildResult<Reference> {
        let config = &self.data.config;
        let source = self.data.item(category.source_item_key())?;
        let url = config.reference_url_for(nature_id);

        StatementBuilder::new(self.data).stated_in_reference(
            source,
            &config.publication_date,
            Some(url.as_str()),
            Some(config.retrieval_date.as_str()),
        )
    }

    fn set_instance_of(&self, builder: &mut StatementBuilder, category: Category) -> BuildResult<()> {
        let item = self.data.item(category.instance_item_key())?;
        builder.add_claim("is", item, vec![])
    }

    fn set_country(&self, builder: &mut StatementBuilder) -> BuildResult<()> {
        let sweden = self.data.item("sweden")?;
        builder.add_claim("country", sweden, vec![])
    }

    /// One claim per municipality, in register order
    fn set_municipalities(&self, builder: &mut StatementBuilder, record: &SourceRecord) -> BuildResult<()> {
        for municipality in split_locations(record.get(fields::MUNICIPALITIES)?) {
            let name = apply_alias(&municipality, MUNICIPALITY_ALIASES);
            let long_name = format!("{} municipality", name);
            let item = self.data.municipality_by_en(&long_name).ok_or_else(|| {
                BuildError::UnresolvedVocabulary {
                    table: "municipality".to_string(),
                    value: municipality.clone(),
                }
            })?;
            builder.add_claim("located_adm", item, vec![])?;
        }
        Ok(())
    }

    /// Operator table first, municipalities as fallback for "... kommun"
    fn set_operator(&self, builder: &mut StatementBuilder, record: &SourceRecord) -> BuildResult<()> {
        let raw = record.get(fields::OPERATOR)?.trim();
        if raw.is_empty() {
            return Ok(());
        }
        let name = apply_alias(raw, OPERATOR_ALIASES);

        let item = self
            .data
            .operator(name)
            .or_else(|| {
                if name.to_lowercase().contains("kommun") {
                    self.data.municipality_by_sv(name)
                } else {
                    None
                }
            })
            .ok_or_else(|| BuildError::UnresolvedVocabulary {
                table: "operator".to_string(),
                value: raw.to_string(),
            })?;

        builder.add_claim("forvaltare", item, vec![])
    }

    fn set_nature_id(&self, builder: &mut StatementBuilder, nature_id: &str) -> BuildResult<()> {
        builder.add_claim("nature_id", RawValue::Text(nature_id.to_string()), vec![])
    }

    /// IUCN category ("IV, Habitat/Species Management Area" → "IV"),
    /// qualified with the date the protection decision took effect
    fn set_iucn_status(&self, builder: &mut StatementBuilder, record: &SourceRecord) -> BuildResult<()> {
        let raw = record.get(fields::IUCN_CATEGORY)?;
        let code = raw.split(',').next().unwrap_or("").trim();
        if code.is_empty() {
            return Ok(());
        }

        let item = self
            .data
            .iucn_category(code)
            .ok_or_else(|| BuildError::UnresolvedVocabulary {
                table: "iucn".to_string(),
                value: code.to_string(),
            })?;

        let mut qualifiers = Vec::new();
        if let Some(date) = decision_date(record)? {
            qualifiers.push(builder.qualifier("start_time", date)?);
        }
        builder.add_claim("iucn", item, qualifiers)
    }

    /// Total area unqualified, then each non-empty part with "applies to part"
    fn set_area(&self, builder: &mut StatementBuilder, record: &SourceRecord) -> BuildResult<()> {
        let total = record.get(fields::AREA_TOTAL)?;
        builder.add_claim("area", RawValue::quantity(total, "hectare"), vec![])?;

        for (column, part) in AREA_PARTS {
            let amount = record.get(column)?.trim();
            if amount.is_empty() {
                continue;
            }
            let qualifier = builder.applies_to_part(part)?;
            builder.add_claim("area", RawValue::quantity(amount, "hectare"), vec![qualifier])?;
        }
        Ok(())
    }

    fn set_inception(&self, builder: &mut StatementBuilder, record: &SourceRecord) -> BuildResult<()> {
        match decision_date(record)? {
            Some(date) => builder.add_claim("inception", date, vec![]),
            None => Ok(()),
        }
    }
}

fn apply_alias<'s>(name: &'s str, aliases: &[(&str, &'s str)]) -> &'s str {
    aliases
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

// ============================================================================
// TESTS
// ============================================================================
