// ⚠️ Error taxonomy - what can go wrong while building one entity
// Every variant is fatal for the record it came from, never for the batch.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// A register column was read but the row does not have it
    #[error("record is missing field '{field}'")]
    MissingField { field: String },

    /// Semantic property key not present in the property table
    #[error("unknown property key '{key}'")]
    UnknownProperty { key: String },

    /// Fixed item key not present in the item table
    #[error("unknown item key '{key}'")]
    UnknownItem { key: String },

    /// Source vocabulary that no table (or fallback) could resolve
    #[error("no {table} entry for '{value}'")]
    UnresolvedVocabulary { table: String, value: String },

    #[error("field '{field}' is not a number: '{value}'")]
    InvalidQuantity { field: String, value: String },

    #[error("not a valid date: '{value}'")]
    InvalidDate { value: String },

    /// Protection type that is neither a reserve nor a national park
    #[error("unknown protection type '{value}'")]
    UnknownCategory { value: String },

    /// Explicit "no value" input while absence claims are disabled
    #[error("unsupported: explicit absence of value for property '{property}'")]
    UnsupportedNoValue { property: String },
}

impl BuildError {
    /// Configuration errors point at the reference data, not the record
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BuildError::UnknownProperty { .. }
                | BuildError::UnknownItem { .. }
                | BuildError::UnresolvedVocabulary { .. }
        )
    }

    pub fn is_unsupported_value(&self) -> bool {
        matches!(self, BuildError::UnsupportedNoValue { .. })
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
