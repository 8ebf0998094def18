//! Common types and utilities shared across all hypothetic crates.

pub mod error;
pub mod time;
pub mod value;

pub use error::{HypotheticError, HypotheticResult};
pub use time::{
    generate_reference_times, generate_reference_times_at, ReferenceTimeIter, ReferenceTimes,
    ScheduleDescription, REFERENCE_TIME_FORMAT,
};
pub use value::MetadataValue;
