//! Schema bootstrap and the compiled-in catalog.

pub mod bootstrap;
pub mod catalog;

pub use bootstrap::{
    BootstrapReport, SchemaDefinition, SchemaReport, SeedGroup, SeedOutcome, SeedSpec, SeedValue,
    TableDef, bootstrap, initialize_schema, seed,
};
pub use catalog::{SCHEMA, SEEDS};
