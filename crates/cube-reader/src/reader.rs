//! The single-file reader seam.

use std::path::Path;

use hypothetic_common::HypotheticResult;

use crate::cube::Cube;

/// Parses one local file into a [`Cube`].
///
/// Implementations must fail with `NotFound` when the path does not exist and
/// with `CubeRead` when the file exists but is corrupt, unreadable or lacks
/// the requested variable. `variable == None` accepts the first variable found.
pub trait CubeReader: Send + Sync {
    fn load(&self, path: &Path, variable: Option<&str>) -> HypotheticResult<Cube>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
