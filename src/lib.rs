// Nature Register Reconciliation - Core Library
// Protected-area register rows → knowledge-base entity descriptions

pub mod error;      // Build error taxonomy
pub mod record;     // Register loading + cleaning
pub mod reference;  // Vocabulary tables, glossary, run config
pub mod resolver;   // Identity resolution + name/location matching
pub mod claims;     // Statement builder
pub mod entity;     // Entity assembler
pub mod batch;      // Batch driver, diagnostics, upsert boundary
pub mod links;      // Durable link index (SQLite)

// Re-export commonly used types
pub use error::{BuildError, BuildResult};
pub use record::{
    SourceRecord, fields, CURRENT_STATUS,
    load_csv, load_and_clean, clean, remove_invalid_entries, remove_duplicate_entries,
};
pub use reference::{
    ReferenceData, ImportConfig, Glossary,
    MunicipalityEntry, OperatorEntry, MappingEntry,
};
pub use resolver::{
    ExistingLinks, Resolution, ArticleMatch,
    resolve, match_article, names_related, same_locations, split_locations,
};
pub use claims::{
    StatementBuilder, Claim, ClaimValue, RawValue, DateValue, DatePrecision,
    Reference, Snak, Qualifier,
};
pub use entity::{
    Category, EntityDescription, NatureAreaAssembler, Assembly, Term,
};
pub use batch::{
    run_batch, BatchOptions, BatchReport, BatchSummary,
    Diagnostic, DiagnosticKind, Upserter, JsonLinesSink, WrittenLink,
};
pub use links::{LinkStore, LinkEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
