// 📚 Reference Data Store - source vocabulary → knowledge-base identifiers
//
// Loaded once per run from a directory of JSON mapping files and then only
// read. Everything downstream takes `&ReferenceData`, so the resolver and the
// builder are pure functions of (record, reference data).

use crate::error::{BuildError, BuildResult};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::info;

// ============================================================================
// VOCABULARY ENTRIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityEntry {
    pub item: String,
    /// English name, e.g. "Kiruna Municipality"
    pub en: String,
    /// Swedish name, e.g. "Kiruna kommun"
    pub sv: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorEntry {
    pub item: String,
    pub sv: String,
}

/// One curated (nature id → entity) pair of a static mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub nature_id: String,
    pub item: String,
}

impl MappingEntry {
    pub fn new(nature_id: impl Into<String>, item: impl Into<String>) -> Self {
        MappingEntry {
            nature_id: nature_id.into(),
            item: item.into(),
        }
    }
}

/// Description templates and per-language region names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Glossary {
    /// Fixed national park description per language
    #[serde(default)]
    pub np_description: BTreeMap<String, String>,

    /// Reserve description template per language, `{}` = region
    #[serde(default)]
    pub nr_description: BTreeMap<String, String>,

    /// language → region name → inflected location phrase
    #[serde(default)]
    pub location_in: BTreeMap<String, BTreeMap<String, String>>,
}

impl Glossary {
    /// Language-specific location phrase, if the language needs one
    pub fn location_in(&self, language: &str, region: &str) -> Option<&str> {
        self.location_in
            .get(language)
            .and_then(|regions| regions.get(region))
            .map(|s| s.as_str())
    }

    /// Whether this language substitutes by lookup rather than interpolation
    pub fn has_locations_for(&self, language: &str) -> bool {
        self.location_in.contains_key(language)
    }
}

// ============================================================================
// IMPORT CONFIG
// ============================================================================

/// Run settings. Every field has a default, so `config.json` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Language of the register's names
    pub primary_language: String,

    /// Languages that get the bare name as label
    pub label_languages: Vec<String>,

    /// Names containing one of these words only get the primary label
    pub label_exclude_words: Vec<String>,

    pub publication_date: String,
    pub retrieval_date: String,

    /// Reference URL, `{}` = nature id
    pub reference_url: String,

    /// Emit "known absence" claims instead of rejecting no-value input
    pub allow_no_value: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            primary_language: "sv".to_string(),
            label_languages: ["sv", "en", "da", "fi", "fr", "pt", "pl", "nb", "nn", "nl", "de", "es"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            label_exclude_words: ["nationalpark", "reservat", "skärgård"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            publication_date: "2015-12-18".to_string(),
            retrieval_date: "2017-01-20".to_string(),
            reference_url:
                "http://nvpub.vic-metria.nu/naturvardsregistret/rest/omrade/{}/G%C3%A4llande"
                    .to_string(),
            allow_no_value: false,
        }
    }
}

impl ImportConfig {
    pub fn reference_url_for(&self, nature_id: &str) -> String {
        self.reference_url.replace("{}", nature_id)
    }
}

// ============================================================================
// REFERENCE DATA
// ============================================================================

/// All lookup tables of one run. Keys of the keyed tables are case-folded.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    properties: HashMap<String, String>,
    items: HashMap<String, String>,
    iucn: HashMap<String, String>,
    municipalities: Vec<MunicipalityEntry>,
    operators: Vec<OperatorEntry>,
    pub glossary: Glossary,
    pub mapping_national_parks: Vec<MappingEntry>,
    pub mapping_reserves: Vec<MappingEntry>,
    pub config: ImportConfig,
}

fn fold(key: &str) -> String {
    key.trim().to_lowercase()
}

fn load_json<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T> {
    let path = dir.join(file);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read mapping file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", file))
}

impl ReferenceData {
    /// Empty store, filled through the `with_*` builders
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every mapping file from `dir`
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        let properties: HashMap<String, String> = load_json(dir, "properties.json")?;
        let items: HashMap<String, String> = load_json(dir, "items.json")?;
        let iucn: HashMap<String, String> = load_json(dir, "iucn_categories.json")?;

        let config = if dir.join("config.json").exists() {
            load_json(dir, "config.json")?
        } else {
            ImportConfig::default()
        };

        let data = ReferenceData {
            properties: properties.into_iter().map(|(k, v)| (fold(&k), v)).collect(),
            items: items.into_iter().map(|(k, v)| (fold(&k), v)).collect(),
            iucn: iucn.into_iter().map(|(k, v)| (fold(&k), v)).collect(),
            municipalities: load_json(dir, "municipalities.json")?,
            operators: load_json(dir, "forvaltare.json")?,
            glossary: load_json(dir, "glossary.json")?,
            mapping_national_parks: load_json(dir, "mapping_nationalparks.json")?,
            mapping_reserves: load_json(dir, "svwp_to_nature_id_exact.json")?,
            config,
        };

        info!(
            properties = data.properties.len(),
            municipalities = data.municipalities.len(),
            operators = data.operators.len(),
            "loaded reference data from {:?}",
            dir
        );
        Ok(data)
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    pub fn with_property(mut self, key: &str, id: impl Into<String>) -> Self {
        self.properties.insert(fold(key), id.into());
        self
    }

    pub fn with_item(mut self, key: &str, id: impl Into<String>) -> Self {
        self.items.insert(fold(key), id.into());
        self
    }

    pub fn with_iucn(mut self, code: &str, id: impl Into<String>) -> Self {
        self.iucn.insert(fold(code), id.into());
        self
    }

    pub fn with_municipality(mut self, entry: MunicipalityEntry) -> Self {
        self.municipalities.push(entry);
        self
    }

    pub fn with_operator(mut self, entry: OperatorEntry) -> Self {
        self.operators.push(entry);
        self
    }

    pub fn with_glossary(mut self, glossary: Glossary) -> Self {
        self.glossary = glossary;
        self
    }

    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Property id for a semantic key. A miss is a configuration error.
    pub fn property(&self, key: &str) -> BuildResult<&str> {
        self.properties
            .get(&fold(key))
            .map(|s| s.as_str())
            .ok_or_else(|| BuildError::UnknownProperty {
                key: key.to_string(),
            })
    }

    pub fn item(&self, key: &str) -> BuildResult<&str> {
        self.items
            .get(&fold(key))
            .map(|s| s.as_str())
            .ok_or_else(|| BuildError::UnknownItem {
                key: key.to_string(),
            })
    }

    pub fn iucn_category(&self, code: &str) -> Option<&str> {
        self.iucn.get(&fold(code)).map(|s| s.as_str())
    }

    /// Municipality by its English name
    pub fn municipality_by_en(&self, name: &str) -> Option<&str> {
        let wanted = fold(name);
        self.municipalities
            .iter()
            .find(|m| fold(&m.en) == wanted)
            .map(|m| m.item.as_str())
    }

    /// Municipality by its Swedish name ("X kommun")
    pub fn municipality_by_sv(&self, name: &str) -> Option<&str> {
        let wanted = fold(name);
        self.municipalities
            .iter()
            .find(|m| fold(&m.sv) == wanted)
            .map(|m| m.item.as_str())
    }

    pub fn operator(&self, name: &str) -> Option<&str> {
        let wanted = fold(name);
        self.operators
            .iter()
            .find(|o| fold(&o.sv) == wanted)
            .map(|o| o.item.as_str())
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
