// 🧱 Statement Builder - heterogeneous field values → uniform claims
//
// A claim is (property, value, qualifiers, reference). Values arrive in a few
// raw shapes (text, quantity + unit, calendar date, explicit absence) and are
// normalized here against the reference data. Claims under the same property
// are appended, never merged, so multi-valued properties keep source order.

use crate::error::{BuildError, BuildResult};
use crate::reference::ReferenceData;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Raw text that stands for "no applicable value"
pub const NO_VALUE: &str = "novalue";

// ============================================================================
// DATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// Calendar date with precision given by which parts are present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateValue {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl DateValue {
    pub fn year(year: i32) -> Self {
        DateValue {
            year,
            month: None,
            day: None,
        }
    }

    pub fn year_month(year: i32, month: u32) -> BuildResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(BuildError::InvalidDate {
                value: format!("{:04}-{:02}", year, month),
            });
        }
        Ok(DateValue {
            year,
            month: Some(month),
            day: None,
        })
    }

    pub fn ymd(year: i32, month: u32, day: u32) -> BuildResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| BuildError::InvalidDate {
            value: format!("{:04}-{:02}-{:02}", year, month, day),
        })?;
        Ok(DateValue {
            year,
            month: Some(month),
            day: Some(day),
        })
    }

    /// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
    pub fn parse(text: &str) -> BuildResult<Self> {
        let text = text.trim();
        let invalid = || BuildError::InvalidDate {
            value: text.to_string(),
        };

        let parts: Vec<&str> = text.split('-').collect();
        match parts.as_slice() {
            [year] => Ok(DateValue::year(year.parse().map_err(|_| invalid())?)),
            [year, month] => DateValue::year_month(
                year.parse().map_err(|_| invalid())?,
                month.parse().map_err(|_| invalid())?,
            )
            .map_err(|_| invalid()),
            [_, _, _] => {
                let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())?;
                DateValue::from_naive(date)
            }
            _ => Err(invalid()),
        }
    }

    pub fn from_naive(date: NaiveDate) -> BuildResult<Self> {
        use chrono::Datelike;
        DateValue::ymd(date.year(), date.month(), date.day())
    }

    pub fn precision(&self) -> DatePrecision {
        match (self.month, self.day) {
            (Some(_), Some(_)) => DatePrecision::Day,
            (Some(_), None) => DatePrecision::Month,
            _ => DatePrecision::Year,
        }
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        if let Some(month) = self.month {
            write!(f, "-{:02}", month)?;
            if let Some(day) = self.day {
                write!(f, "-{:02}", day)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// Value as it comes out of a register field or a fixed table
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Literal text, or an item id if it looks like one
    Text(String),
    Quantity {
        amount: String,
        /// Item key (or item id) of the unit
        unit: Option<String>,
    },
    Date(DateValue),
    /// Explicit "no applicable value"
    NoValue,
}

impl RawValue {
    pub fn quantity(amount: impl Into<String>, unit: &str) -> Self {
        RawValue::Quantity {
            amount: amount.into(),
            unit: Some(unit.to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(text: &str) -> Self {
        if text == NO_VALUE {
            RawValue::NoValue
        } else {
            RawValue::Text(text.to_string())
        }
    }
}

impl From<String> for RawValue {
    fn from(text: String) -> Self {
        RawValue::from(text.as_str())
    }
}

impl From<DateValue> for RawValue {
    fn from(date: DateValue) -> Self {
        RawValue::Date(date)
    }
}

/// Normalized claim value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ClaimValue {
    Item(String),
    String(String),
    Quantity { amount: f64, unit: Option<String> },
    Time(DateValue),
    /// Known absence of any value
    NoValue,
}

impl ClaimValue {
    pub fn as_item(&self) -> Option<&str> {
        match self {
            ClaimValue::Item(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimValue::Item(id) => write!(f, "{}", id),
            ClaimValue::String(s) => write!(f, "\"{}\"", s),
            ClaimValue::Quantity { amount, unit: Some(unit) } => write!(f, "{} {}", amount, unit),
            ClaimValue::Quantity { amount, unit: None } => write!(f, "{}", amount),
            ClaimValue::Time(date) => write!(f, "{}", date),
            ClaimValue::NoValue => write!(f, "no value"),
        }
    }
}

/// `Q` followed by digits, case-insensitive
pub fn is_item_id(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some('Q') | Some('q'))
        && text.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}

fn parse_amount(property_key: &str, amount: &str) -> BuildResult<f64> {
    let normalized = amount.trim().replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| BuildError::InvalidQuantity {
            field: property_key.to_string(),
            value: amount.to_string(),
        })
}

// ============================================================================
// CLAIMS, QUALIFIERS, REFERENCES
// ============================================================================

/// A resolved (property, value) pair, used for qualifiers and reference parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snak {
    pub property: String,
    pub value: ClaimValue,
}

pub type Qualifier = Snak;

/// "stated in" provenance: source, publication date, optional url + retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub stated_in: Snak,
    pub publication_date: Snak,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<Snak>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved: Option<Snak>,
}

impl Reference {
    /// Item id of the source publication
    pub fn source(&self) -> Option<&str> {
        self.stated_in.value.as_item()
    }

    pub fn snaks(&self) -> Vec<&Snak> {
        let mut snaks = vec![&self.stated_in, &self.publication_date];
        snaks.extend(self.reference_url.iter());
        snaks.extend(self.retrieved.iter());
        snaks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Semantic key the claim was built from, e.g. "area"
    pub property_key: String,
    /// Resolved property id
    pub property: String,
    pub value: ClaimValue,
    pub qualifiers: Vec<Qualifier>,
    pub reference: Option<Arc<Reference>>,
}

impl Claim {
    /// Append a qualifier; existing qualifiers are kept
    pub fn add_qualifier(&mut self, qualifier: Qualifier) {
        self.qualifiers.push(qualifier);
    }
}

// ============================================================================
// STATEMENT BUILDER
// ============================================================================

/// Accumulates the claims of one entity.
///
/// The default reference is set once per record; every claim gets it unless
/// the caller passes its own through `add_claim_with_reference`.
pub struct StatementBuilder<'a> {
    data: &'a ReferenceData,
    default_reference: Option<Arc<Reference>>,
    claims: Vec<Claim>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(data: &'a ReferenceData) -> Self {
        StatementBuilder {
            data,
            default_reference: None,
            claims: Vec::new(),
        }
    }

    pub fn with_default_reference(mut self, reference: Arc<Reference>) -> Self {
        self.default_reference = Some(reference);
        self
    }

    /// Normalize a raw value by shape
    pub fn make_value(&self, property_key: &str, raw: RawValue) -> BuildResult<ClaimValue> {
        match raw {
            RawValue::Text(text) => {
                if is_item_id(&text) {
                    Ok(ClaimValue::Item(text.to_uppercase()))
                } else {
                    Ok(ClaimValue::String(text))
                }
            }
            RawValue::Quantity { amount, unit } => {
                let amount = parse_amount(property_key, &amount)?;
                let unit = match unit {
                    Some(u) if is_item_id(&u) => Some(u.to_uppercase()),
                    Some(u) => Some(self.data.item(&u)?.to_string()),
                    None => None,
                };
                Ok(ClaimValue::Quantity { amount, unit })
            }
            RawValue::Date(date) => Ok(ClaimValue::Time(date)),
            RawValue::NoValue => {
                if self.data.config.allow_no_value {
                    Ok(ClaimValue::NoValue)
                } else {
                    Err(BuildError::UnsupportedNoValue {
                        property: property_key.to_string(),
                    })
                }
            }
        }
    }

    /// Generic qualifier: resolved property + normalized value
    pub fn qualifier(&self, property_key: &str, value: impl Into<RawValue>) -> BuildResult<Qualifier> {
        Ok(Snak {
            property: self.data.property(property_key)?.to_string(),
            value: self.make_value(property_key, value.into())?,
        })
    }

    /// "applies to part" → the fixed item behind `item_key`
    pub fn applies_to_part(&self, item_key: &str) -> BuildResult<Qualifier> {
        let target = self.data.item(item_key)?;
        self.qualifier("applies_to_part", target)
    }

    /// "start time" → a `YYYY[-MM[-DD]]` date
    pub fn start_date(&self, date: &str) -> BuildResult<Qualifier> {
        self.qualifier("start_time", DateValue::parse(date)?)
    }

    /// Build a "stated in" reference. Url and retrieval date are only
    /// attached when both are given.
    pub fn stated_in_reference(
        &self,
        source_item: &str,
        publication_date: &str,
        reference_url: Option<&str>,
        retrieved: Option<&str>,
    ) -> BuildResult<Reference> {
        let stated_in = self.qualifier("stated_in", source_item)?;
        let publication_date = self.qualifier("publication_date", DateValue::parse(publication_date)?)?;

        let (reference_url, retrieved) = match (reference_url, retrieved) {
            (Some(url), Some(date)) => (
                Some(Snak {
                    property: self.data.property("reference_url")?.to_string(),
                    value: ClaimValue::String(url.to_string()),
                }),
                Some(self.qualifier("retrieved", DateValue::parse(date)?)?),
            ),
            _ => (None, None),
        };

        Ok(Reference {
            stated_in,
            publication_date,
            reference_url,
            retrieved,
        })
    }

    /// Append a claim citing the default reference
    pub fn add_claim(
        &mut self,
        property_key: &str,
        value: impl Into<RawValue>,
        qualifiers: Vec<Qualifier>,
    ) -> BuildResult<()> {
        let reference = self.default_reference.clone();
        self.add_claim_with_reference(property_key, value, qualifiers, reference)
    }

    /// Append a claim with an explicit reference (`None` = unsourced)
    pub fn add_claim_with_reference(
        &mut self,
        property_key: &str,
        value: impl Into<RawValue>,
        qualifiers: Vec<Qualifier>,
        reference: Option<Arc<Reference>>,
    ) -> BuildResult<()> {
        let property = self.data.property(property_key)?.to_string();
        let value = self.make_value(property_key, value.into())?;

        self.claims.push(Claim {
            property_key: property_key.to_string(),
            property,
            value,
            qualifiers,
            reference,
        });
        Ok(())
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn finalize(self) -> Vec<Claim> {
        self.claims
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ImportConfig;

    fn create_test_data() -> ReferenceData {
        ReferenceData::new()
            .with_property("area", "P2046")
            .with_property("located_adm", "P131")
            .with_property("inception", "P571")
            .with_property("nature_id", "P3613")
            .with_property("iucn", "P814")
            .with_property("applies_to_part", "P518")
            .with_property("start_time", "P580")
            .with_property("stated_in", "P248")
            .with_property("publication_date", "P577")
            .with_property("reference_url", "P854")
            .with_property("retrieved", "P813")
            .with_item("hectare", "Q35852")
            .with_item("land", "Q11081619")
            .with_item("source_nr", "Q29580583")
    }

    fn create_test_reference(builder: &StatementBuilder) -> Arc<Reference> {
        Arc::new(
            builder
                .stated_in_reference("Q29580583", "2015-12-18", Some("http://example.org/1"), Some("2017-01-20"))
                .unwrap(),
        )
    }

    #[test]
    fn test_date_parse_precision() {
        assert_eq!(DateValue::parse("1909").unwrap().precision(), DatePrecision::Year);
        assert_eq!(DateValue::parse("1909-05").unwrap().precision(), DatePrecision::Month);

        let full = DateValue::parse("1909-05-24").unwrap();
        assert_eq!(full.precision(), DatePrecision::Day);
        assert_eq!(full.to_string(), "1909-05-24");

        assert!(DateValue::parse("1909-13").is_err());
        assert!(DateValue::parse("1909-02-30").is_err());
        assert!(DateValue::parse("not a date").is_err());
    }

    #[test]
    fn test_item_id_pattern() {
        assert!(is_item_id("Q42"));
        assert!(is_item_id("q42"));
        assert!(!is_item_id("Q"));
        assert!(!is_item_id("Q42a"));
        assert!(!is_item_id("2000123"));
    }

    #[test]
    fn test_value_shapes() {
        let data = create_test_data();
        let builder = StatementBuilder::new(&data);

        assert_eq!(
            builder.make_value("located_adm", "q504676".into()).unwrap(),
            ClaimValue::Item("Q504676".to_string())
        );
        assert_eq!(
            builder.make_value("nature_id", "2000123".into()).unwrap(),
            ClaimValue::String("2000123".to_string())
        );
        assert_eq!(
            builder.make_value("area", RawValue::quantity("7700,5", "hectare")).unwrap(),
            ClaimValue::Quantity {
                amount: 7700.5,
                unit: Some("Q35852".to_string())
            }
        );
    }

    #[test]
    fn test_bad_quantity() {
        let data = create_test_data();
        let builder = StatementBuilder::new(&data);
        let err = builder
            .make_value("area", RawValue::quantity("lots", "hectare"))
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::InvalidQuantity {
                field: "area".to_string(),
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_unit_is_configuration_error() {
        let data = create_test_data();
        let builder = StatementBuilder::new(&data);
        let err = builder
            .make_value("area", RawValue::quantity("1", "acre"))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_no_value_rejected_by_default() {
        let data = create_test_data();
        let mut builder = StatementBuilder::new(&data);
        let err = builder.add_claim("iucn", NO_VALUE, vec![]).unwrap_err();
        assert_eq!(err, BuildError::UnsupportedNoValue { property: "iucn".to_string() });
        assert!(builder.claims().is_empty());
    }

    #[test]
    fn test_no_value_as_known_absence() {
        let config = ImportConfig {
            allow_no_value: true,
            ..ImportConfig::default()
        };
        let data = create_test_data().with_config(config);
        let mut builder = StatementBuilder::new(&data);
        builder.add_claim("iucn", RawValue::NoValue, vec![]).unwrap();
        assert_eq!(builder.claims()[0].value, ClaimValue::NoValue);
    }

    #[test]
    fn test_unknown_property_fails() {
        let data = create_test_data();
        let mut builder = StatementBuilder::new(&data);
        let err = builder.add_claim("height", "12", vec![]).unwrap_err();
        assert_eq!(err, BuildError::UnknownProperty { key: "height".to_string() });
    }

    #[test]
    fn test_multi_valued_claims_keep_order() {
        let data = create_test_data();
        let mut builder = StatementBuilder::new(&data);
        builder.add_claim("located_adm", "Q1", vec![]).unwrap();
        builder.add_claim("located_adm", "Q2", vec![]).unwrap();

        let claims = builder.finalize();
        let values: Vec<&str> = claims.iter().filter_map(|c| c.value.as_item()).collect();
        assert_eq!(values, vec!["Q1", "Q2"]);
        assert!(claims.iter().all(|c| c.property == "P131"));
    }

    #[test]
    fn test_default_reference_shared() {
        let data = create_test_data();
        let reference = create_test_reference(&StatementBuilder::new(&data));
        let mut builder = StatementBuilder::new(&data).with_default_reference(reference.clone());

        builder.add_claim("nature_id", "1", vec![]).unwrap();
        builder.add_claim("area", RawValue::quantity("3", "hectare"), vec![]).unwrap();
        builder
            .add_claim_with_reference("located_adm", "Q1", vec![], None)
            .unwrap();

        let claims = builder.finalize();
        assert!(Arc::ptr_eq(claims[0].reference.as_ref().unwrap(), &reference));
        assert!(Arc::ptr_eq(claims[1].reference.as_ref().unwrap(), &reference));
        assert!(claims[2].reference.is_none());
    }

    #[test]
    fn test_reference_parts() {
        let data = create_test_data();
        let builder = StatementBuilder::new(&data);
        let reference = create_test_reference(&builder);

        assert_eq!(reference.source(), Some("Q29580583"));
        let props: Vec<&str> = reference.snaks().iter().map(|s| s.property.as_str()).collect();
        assert_eq!(props, vec!["P248", "P577", "P854", "P813"]);

        // Url without retrieval date is dropped
        let bare = builder
            .stated_in_reference("Q29580583", "2015-12-18", Some("http://example.org"), None)
            .unwrap();
        assert_eq!(bare.snaks().len(), 2);
    }

    #[test]
    fn test_qualifier_helpers_append() {
        let data = create_test_data();
        let mut builder = StatementBuilder::new(&data);
        let part = builder.applies_to_part("land").unwrap();
        assert_eq!(part.property, "P518");
        assert_eq!(part.value, ClaimValue::Item("Q11081619".to_string()));

        builder
            .add_claim("area", RawValue::quantity("12", "hectare"), vec![part])
            .unwrap();

        let mut claims = builder.finalize();
        let start = StatementBuilder::new(&data).start_date("1999-09-30").unwrap();
        claims[0].add_qualifier(start);

        assert_eq!(claims[0].qualifiers.len(), 2);
        assert_eq!(claims[0].qualifiers[0].property, "P518");
        assert_eq!(
            claims[0].qualifiers[1].value,
            ClaimValue::Time(DateValue::ymd(1999, 9, 30).unwrap())
        );
    }
}
