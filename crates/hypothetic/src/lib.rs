//! Lazy dataset assembly over many individually addressed remote files.
//!
//! # Pipeline
//!
//! Opening a [`HypotheticSource`] runs, in order:
//!
//! 1. Reference time window from the model run schedule
//! 2. Metadata table: cartesian product of the declared axes, one URI per row
//! 3. Template discovery: first row whose object can be fetched and read
//! 4. Coordinate reduction: drop the `uri` column and constant columns
//! 5. Aggregate build: a [`Hypotheticube`] (or one per group) that fetches
//!    nothing until a partition is read

pub mod aggregate;
pub mod config;
pub mod coords;
pub mod key_generator;
pub mod metadata;
pub mod partition;
pub mod source;
pub mod table;
pub mod template;

// Re-exports
pub use aggregate::{
    AggregateBuilder, AggregateRequest, DatasetHandle, Hypotheticube, HypotheticubeBuilder,
    LazyArray, LazyData, ReplacementAxis,
};
pub use config::{Catalog, SourceConfig};
pub use coords::reduce_coordinates;
pub use key_generator::{KeyGenerator, KeyGeneratorRegistry, KeyRecord, TemplateKeyGenerator};
pub use metadata::{
    build_metadata_table, build_metadata_table_at, MetadataDeclaration, MetadataField,
    MetadataTable, FORECAST_REFERENCE_TIME, URI_COLUMN,
};
pub use partition::PartitionIndex;
pub use source::{AggregateSchema, HypotheticSource, Schema, DTYPE};
pub use table::Table;
pub use template::{find_template, TemplateHandle};

pub use hypothetic_common::{HypotheticError, HypotheticResult, MetadataValue, ScheduleDescription};
