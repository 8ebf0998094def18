//! Lazy aggregates.
//!
//! An aggregate stacks many single-file cubes that share a template
//! structure along extra "replacement" axes. Nothing is fetched when the
//! aggregate is built; [`LazyArray::compute`] fetches and decodes only the
//! objects under the requested index.

use std::sync::Arc;

use async_trait::async_trait;
use cube_reader::{CubeReader, CubeStructure};
use ndarray::{ArrayD, Axis, IxDyn};
use serde::Serialize;
use storage::{ObjectFetcher, StorageOptions};
use tracing::{debug, instrument};

use hypothetic_common::{HypotheticError, HypotheticResult, MetadataValue};

use crate::table::Table;
use crate::template::TemplateHandle;

/// Everything an [`AggregateBuilder`] gets to work with.
pub struct AggregateRequest<'a> {
    pub template: &'a TemplateHandle,
    pub variable: Option<&'a str>,
    /// Replacement coordinates, one row per URI
    pub coordinates: &'a Table,
    pub uris: &'a [&'a str],
    pub storage_options: &'a StorageOptions,
    /// Coordinate column splitting the result into several aggregates
    pub group_by: Option<&'a str>,
}

/// Builds the dataset handle for an opened source.
#[async_trait]
pub trait AggregateBuilder: Send + Sync {
    async fn build(&self, request: AggregateRequest<'_>) -> HypotheticResult<DatasetHandle>;
}

/// One aggregate, or a list of them when the builder grouped its input.
#[derive(Debug)]
pub enum DatasetHandle {
    Single(Hypotheticube),
    List(Vec<Hypotheticube>),
}

impl DatasetHandle {
    pub fn cubes(&self) -> &[Hypotheticube] {
        match self {
            DatasetHandle::Single(cube) => std::slice::from_ref(cube),
            DatasetHandle::List(cubes) => cubes,
        }
    }

    pub fn cubes_mut(&mut self) -> &mut [Hypotheticube] {
        match self {
            DatasetHandle::Single(cube) => std::slice::from_mut(cube),
            DatasetHandle::List(cubes) => cubes,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, DatasetHandle::List(_))
    }

    /// Total number of single-object partitions across all aggregates.
    pub fn npartitions(&self) -> usize {
        self.cubes().iter().map(|c| c.npartitions()).sum()
    }
}

/// One extra dimension of an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplacementAxis {
    pub name: String,
    /// Distinct values in first-appearance order
    pub values: Vec<MetadataValue>,
}

impl ReplacementAxis {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Block values of an aggregate as returned by [`Hypotheticube::lazy_data`].
pub enum LazyData<'a> {
    /// Already in memory
    Realized(&'a ArrayD<f32>),
    /// Still remote; index and compute
    Deferred(&'a LazyArray),
}

/// A virtual array whose cells live in remote objects.
///
/// The leading dimensions are the replacement axes; each combination of
/// leading indices maps to one object whose cube fills the trailing
/// template dimensions.
#[derive(Clone)]
pub struct LazyArray {
    variable: Option<String>,
    structure: CubeStructure,
    axis_lens: Vec<usize>,
    cells: Arc<Vec<Option<String>>>,
    fetcher: Arc<dyn ObjectFetcher>,
    reader: Arc<dyn CubeReader>,
    options: StorageOptions,
}

impl std::fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyArray")
            .field("shape", &self.shape())
            .field("cells", &self.cells.len())
            .field("reader", &self.reader.name())
            .finish()
    }
}

impl LazyArray {
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = self.axis_lens.clone();
        shape.extend(self.structure.shape());
        shape
    }

    pub fn ndim(&self) -> usize {
        self.axis_lens.len() + self.structure.ndim()
    }

    /// URI backing the cell at `leading` (one index per replacement axis).
    pub fn cell_uri(&self, leading: &[usize]) -> Option<&str> {
        if leading.len() != self.axis_lens.len() {
            return None;
        }
        let flat = self.flat_index(leading)?;
        self.cells.get(flat).and_then(|c| c.as_deref())
    }

    fn flat_index(&self, leading: &[usize]) -> Option<usize> {
        let mut flat = 0usize;
        for (&i, &len) in leading.iter().zip(&self.axis_lens) {
            if i >= len {
                return None;
            }
            flat = flat * len + i;
        }
        Some(flat)
    }

    /// Materialize `self[index]`.
    ///
    /// Only the objects whose cells fall under `index` are fetched. An
    /// index covering every replacement axis fetches exactly one object.
    #[instrument(skip(self), fields(shape = ?self.shape()))]
    pub async fn compute(&self, index: &[usize]) -> HypotheticResult<ArrayD<f32>> {
        let shape = self.shape();
        if index.len() > shape.len() {
            return Err(HypotheticError::partition_index(format!(
                "index {:?} has {} components but the array has {} dimensions",
                index,
                index.len(),
                shape.len()
            )));
        }
        for (dim, (&i, &len)) in index.iter().zip(&shape).enumerate() {
            if i >= len {
                return Err(HypotheticError::partition_index(format!(
                    "index {} out of range for dimension {} of length {}",
                    i, dim, len
                )));
            }
        }

        let (outer, inner) = index.split_at(index.len().min(self.axis_lens.len()));
        let free: Vec<usize> = self.axis_lens[outer.len()..].to_vec();
        let span: usize = free.iter().product();
        let mut start = 0usize;
        for (&i, &len) in outer.iter().zip(&self.axis_lens) {
            start = start * len + i;
        }
        let start = start * span;

        debug!(cells = span, first = start, "Materializing cells");

        let mut values = Vec::new();
        let mut block_shape = Vec::new();
        for flat in start..start + span {
            let block = self.load_cell(flat).await?;
            let mut view = block.view();
            for &i in inner {
                view = view.index_axis_move(Axis(0), i);
            }
            block_shape = view.shape().to_vec();
            values.extend(view.iter().copied());
        }

        let mut out_shape = free;
        out_shape.extend(block_shape);
        ArrayD::from_shape_vec(IxDyn(&out_shape), values)
            .map_err(|e| HypotheticError::Aggregate(format!("failed to assemble block: {}", e)))
    }

    async fn load_cell(&self, flat: usize) -> HypotheticResult<ArrayD<f32>> {
        let uri = self
            .cells
            .get(flat)
            .and_then(|c| c.as_deref())
            .ok_or_else(|| HypotheticError::Aggregate(format!("no object for cell {}", flat)))?;

        let local = self.fetcher.open_as_local(uri, &self.options).await?;
        let cube = self.reader.load(local.path(), self.variable.as_deref())?;
        if !self.structure.matches(&cube) {
            return Err(HypotheticError::Aggregate(format!(
                "{} does not match the template structure (expected {:?}, got {:?})",
                uri,
                self.structure.shape(),
                cube.shape()
            )));
        }
        Ok(cube.data)
    }
}

/// A lazily loaded stack of single-file cubes.
#[derive(Debug)]
pub struct Hypotheticube {
    axes: Vec<ReplacementAxis>,
    group: Option<(String, MetadataValue)>,
    lazy: LazyArray,
    realized: Option<ArrayD<f32>>,
}

impl Hypotheticube {
    pub fn variable(&self) -> &str {
        &self.lazy.structure.variable
    }

    pub fn structure(&self) -> &CubeStructure {
        &self.lazy.structure
    }

    pub fn axes(&self) -> &[ReplacementAxis] {
        &self.axes
    }

    /// Group column and value this aggregate was split out by.
    pub fn group(&self) -> Option<(&str, &MetadataValue)> {
        self.group.as_ref().map(|(name, value)| (name.as_str(), value))
    }

    pub fn shape(&self) -> Vec<usize> {
        self.lazy.shape()
    }

    /// Replacement axis names followed by the template's dimension names.
    pub fn dim_names(&self) -> Vec<String> {
        self.axes
            .iter()
            .map(|a| a.name.clone())
            .chain(self.lazy.structure.dims.iter().map(|d| d.name.clone()))
            .collect()
    }

    /// Number of objects behind this aggregate.
    pub fn npartitions(&self) -> usize {
        self.lazy.axis_lens.iter().product()
    }

    /// URIs of every cell in row-major order over the replacement axes.
    pub fn uris(&self) -> Vec<Option<&str>> {
        self.lazy.cells.iter().map(|c| c.as_deref()).collect()
    }

    pub fn is_realized(&self) -> bool {
        self.realized.is_some()
    }

    pub fn lazy_data(&self) -> LazyData<'_> {
        match &self.realized {
            Some(array) => LazyData::Realized(array),
            None => LazyData::Deferred(&self.lazy),
        }
    }

    /// Fetch every object and keep the full array in memory.
    pub async fn realize(&mut self) -> HypotheticResult<&ArrayD<f32>> {
        if self.realized.is_none() {
            let array = self.lazy.compute(&[]).await?;
            self.realized = Some(array);
        }
        self.realized
            .as_ref()
            .ok_or_else(|| HypotheticError::Aggregate("realized array missing".into()))
    }
}

/// Default [`AggregateBuilder`]: one [`Hypotheticube`] per group.
#[derive(Clone)]
pub struct HypotheticubeBuilder {
    fetcher: Arc<dyn ObjectFetcher>,
    reader: Arc<dyn CubeReader>,
}

impl HypotheticubeBuilder {
    pub fn new(fetcher: Arc<dyn ObjectFetcher>, reader: Arc<dyn CubeReader>) -> Self {
        Self { fetcher, reader }
    }

    fn build_one(
        &self,
        request: &AggregateRequest<'_>,
        rows: &[usize],
        skip_column: Option<usize>,
        group: Option<(String, MetadataValue)>,
    ) -> HypotheticResult<Hypotheticube> {
        let coords = request.coordinates;
        let columns: Vec<usize> = (0..coords.columns().len())
            .filter(|&c| Some(c) != skip_column)
            .collect();

        let mut axes: Vec<ReplacementAxis> = columns
            .iter()
            .map(|&c| ReplacementAxis {
                name: coords.columns()[c].clone(),
                values: Vec::new(),
            })
            .collect();

        // Position of every row along every axis
        let mut positions: Vec<Vec<usize>> = Vec::with_capacity(rows.len());
        for &row in rows {
            let values = coords.row(row).ok_or_else(|| {
                HypotheticError::Aggregate(format!("coordinate row {} missing", row))
            })?;
            let mut position = Vec::with_capacity(columns.len());
            for (axis, &c) in axes.iter_mut().zip(&columns) {
                let rendered = values[c].render();
                let at = match axis.values.iter().position(|v| v.render() == rendered) {
                    Some(at) => at,
                    None => {
                        axis.values.push(values[c].clone());
                        axis.values.len() - 1
                    }
                };
                position.push(at);
            }
            positions.push(position);
        }

        let axis_lens: Vec<usize> = axes.iter().map(|a| a.len()).collect();
        let mut cells: Vec<Option<String>> = vec![None; axis_lens.iter().product()];
        for (&row, position) in rows.iter().zip(&positions) {
            let flat = position
                .iter()
                .zip(&axis_lens)
                .fold(0usize, |acc, (&i, &len)| acc * len + i);
            let uri = request.uris.get(row).ok_or_else(|| {
                HypotheticError::Aggregate(format!("no uri for coordinate row {}", row))
            })?;
            if let Some(existing) = &cells[flat] {
                return Err(HypotheticError::Aggregate(format!(
                    "{} and {} share the same replacement coordinates",
                    existing, uri
                )));
            }
            cells[flat] = Some(uri.to_string());
        }

        Ok(Hypotheticube {
            axes,
            group,
            lazy: LazyArray {
                variable: request.variable.map(str::to_string),
                structure: request.template.structure(),
                axis_lens,
                cells: Arc::new(cells),
                fetcher: self.fetcher.clone(),
                reader: self.reader.clone(),
                options: request.storage_options.clone(),
            },
            realized: None,
        })
    }
}

#[async_trait]
impl AggregateBuilder for HypotheticubeBuilder {
    #[instrument(skip_all, fields(rows = request.coordinates.len(), group_by = ?request.group_by))]
    async fn build(&self, request: AggregateRequest<'_>) -> HypotheticResult<DatasetHandle> {
        if request.coordinates.len() != request.uris.len() {
            return Err(HypotheticError::Aggregate(format!(
                "{} coordinate rows but {} uris",
                request.coordinates.len(),
                request.uris.len()
            )));
        }

        let groups = request
            .group_by
            .and_then(|column| Some((column, request.coordinates.column_index(column)?)));

        let handle = match groups {
            Some((column, index)) => {
                let groups = request.coordinates.group_rows(column).unwrap_or_default();
                let cubes = groups
                    .into_iter()
                    .map(|(value, rows)| {
                        self.build_one(&request, &rows, Some(index), Some((column.to_string(), value)))
                    })
                    .collect::<HypotheticResult<Vec<_>>>()?;
                DatasetHandle::List(cubes)
            }
            None => {
                let rows: Vec<usize> = (0..request.coordinates.len()).collect();
                DatasetHandle::Single(self.build_one(&request, &rows, None, None)?)
            }
        };

        debug!(
            aggregates = handle.cubes().len(),
            npartitions = handle.npartitions(),
            "Built hypotheticube"
        );
        Ok(handle)
    }
}
