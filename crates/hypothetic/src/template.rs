//! Template discovery.
//!
//! Walks the metadata table in row order and returns the first row whose
//! object can be fetched and parsed. Missing or unreadable objects are
//! logged and skipped; every other failure stops the scan.

use cube_reader::{Cube, CubeReader, CubeStructure};
use metrics::counter;
use storage::{LocalObject, ObjectFetcher, StorageOptions};
use tracing::{debug, info, instrument, warn};

use hypothetic_common::{HypotheticError, HypotheticResult};

use crate::metadata::MetadataTable;

/// The first readable object in a metadata table.
///
/// Owns the local temporary copy of the object; the copy is deleted when the
/// handle is dropped.
#[derive(Debug)]
pub struct TemplateHandle {
    row_index: usize,
    uri: String,
    local: LocalObject,
    cube: Cube,
}

impl TemplateHandle {
    /// Row of the metadata table the template came from.
    pub fn row_index(&self) -> usize {
        self.row_index
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn cube(&self) -> &Cube {
        &self.cube
    }

    pub fn structure(&self) -> CubeStructure {
        self.cube.structure()
    }

    /// The local temporary copy backing the cube.
    pub fn local(&self) -> &LocalObject {
        &self.local
    }
}

/// Find the first row of `table` whose URI resolves to a readable cube.
///
/// Rows after the first success are never touched. Fails with
/// `TemplateNotFound` when no row qualifies.
#[instrument(skip_all, fields(rows = table.len(), variable = ?variable))]
pub async fn find_template(
    table: &MetadataTable,
    variable: Option<&str>,
    fetcher: &dyn ObjectFetcher,
    reader: &dyn CubeReader,
    options: &StorageOptions,
) -> HypotheticResult<TemplateHandle> {
    let mut skipped = 0usize;

    for row_index in 0..table.len() {
        let uri = table.uri(row_index).ok_or_else(|| {
            HypotheticError::configuration(format!("metadata row {} has no uri", row_index))
        })?;

        debug!(row = row_index, uri = %uri, "Probing template candidate");
        match probe(uri, variable, fetcher, reader, options).await {
            Ok((local, cube)) => {
                counter!("hypothetic_template_probes_total", "outcome" => "found").increment(1);
                info!(
                    row = row_index,
                    uri = %uri,
                    skipped,
                    shape = ?cube.shape(),
                    "Found template cube"
                );
                return Ok(TemplateHandle {
                    row_index,
                    uri: uri.to_string(),
                    local,
                    cube,
                });
            }
            Err(e) if e.is_recoverable_probe_failure() => {
                counter!("hypothetic_template_probes_total", "outcome" => e.kind()).increment(1);
                warn!(row = row_index, uri = %uri, error = %e, "Skipping template candidate");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Err(HypotheticError::TemplateNotFound(format!(
        "none of {} candidate objects could be read{}",
        table.len(),
        variable
            .map(|v| format!(" as variable '{}'", v))
            .unwrap_or_default()
    )))
}

async fn probe(
    uri: &str,
    variable: Option<&str>,
    fetcher: &dyn ObjectFetcher,
    reader: &dyn CubeReader,
    options: &StorageOptions,
) -> HypotheticResult<(LocalObject, Cube)> {
    let local = fetcher.open_as_local(uri, options).await?;
    // On failure `local` is dropped here, deleting the temporary copy
    let cube = reader.load(local.path(), variable)?;
    Ok((local, cube))
}
