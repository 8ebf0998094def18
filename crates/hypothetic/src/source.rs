//! The hypothetic data source.
//!
//! Ties the pipeline together: metadata table, template discovery,
//! coordinate reduction and the aggregate builder. The dataset is built on
//! first access and kept until [`HypotheticSource::close`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cube_reader::CubeReader;
use metrics::counter;
use ndarray::ArrayD;
use serde::Serialize;
use storage::ObjectFetcher;
use tracing::{info, instrument};

use hypothetic_common::{HypotheticError, HypotheticResult};

use crate::aggregate::{
    AggregateBuilder, AggregateRequest, DatasetHandle, HypotheticubeBuilder, LazyData,
    ReplacementAxis,
};
use crate::config::SourceConfig;
use crate::coords::reduce_coordinates;
use crate::key_generator::KeyGeneratorRegistry;
use crate::metadata::{build_metadata_table_at, MetadataTable, URI_COLUMN};
use crate::partition::PartitionIndex;
use crate::table::Table;
use crate::template::{find_template, TemplateHandle};

/// Element type of every aggregate.
pub const DTYPE: &str = "float32";

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Description of an opened dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub dtype: &'static str,
    pub npartitions: usize,
    pub template_uri: String,
    pub aggregates: Vec<AggregateSchema>,
}

/// Shape and dimensions of one aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSchema {
    pub variable: String,
    pub shape: Vec<usize>,
    pub dims: Vec<String>,
    pub axes: Vec<ReplacementAxis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

struct OpenState {
    metadata: MetadataTable,
    coordinates: Table,
    template: TemplateHandle,
    dataset: DatasetHandle,
}

/// A lazily assembled dataset over many remote objects.
pub struct HypotheticSource {
    name: String,
    config: SourceConfig,
    registry: Arc<KeyGeneratorRegistry>,
    fetcher: Arc<dyn ObjectFetcher>,
    reader: Arc<dyn CubeReader>,
    builder: Arc<dyn AggregateBuilder>,
    clock: Clock,
    state: Option<OpenState>,
    schema: Option<Schema>,
}

impl HypotheticSource {
    pub fn new(
        name: impl Into<String>,
        config: SourceConfig,
        registry: Arc<KeyGeneratorRegistry>,
        fetcher: Arc<dyn ObjectFetcher>,
        reader: Arc<dyn CubeReader>,
    ) -> HypotheticResult<Self> {
        config.validate()?;
        let builder = Arc::new(HypotheticubeBuilder::new(fetcher.clone(), reader.clone()));
        Ok(Self {
            name: name.into(),
            config,
            registry,
            fetcher,
            reader,
            builder,
            clock: Arc::new(Utc::now),
            state: None,
            schema: None,
        })
    }

    /// Use a different aggregate builder.
    pub fn with_aggregate_builder(mut self, builder: Arc<dyn AggregateBuilder>) -> Self {
        self.builder = builder;
        self
    }

    /// Use a different source of "now" for the reference time window.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Build the dataset if it is not already open and return it.
    pub async fn open(&mut self) -> HypotheticResult<&DatasetHandle> {
        if self.state.is_none() {
            let state = self.assemble().await?;
            self.state = Some(state);
        }
        Ok(&self.opened()?.dataset)
    }

    /// The dataset handle, opening on demand.
    pub async fn read(&mut self) -> HypotheticResult<&DatasetHandle> {
        self.open().await
    }

    /// Same as [`read`](Self::read): the handle stays lazy until indexed.
    pub async fn to_lazy(&mut self) -> HypotheticResult<&DatasetHandle> {
        self.open().await
    }

    /// Fetch every object of every aggregate and keep the arrays in memory.
    ///
    /// Later partition reads are served from memory until [`close`](Self::close).
    #[instrument(skip(self), fields(source = %self.name))]
    pub async fn realize(&mut self) -> HypotheticResult<&DatasetHandle> {
        self.open().await?;
        let state = self.state.as_mut().ok_or_else(|| {
            HypotheticError::configuration(format!("source '{}' is not open", self.name))
        })?;
        for cube in state.dataset.cubes_mut() {
            cube.realize().await?;
        }
        info!(npartitions = state.dataset.npartitions(), "Realized dataset");
        Ok(&self.opened()?.dataset)
    }

    /// Materialize one partition.
    ///
    /// For a list of aggregates the first component picks the aggregate and
    /// the rest index into it; a single aggregate takes the whole index.
    #[instrument(skip(self), fields(source = %self.name, index = %index))]
    pub async fn read_partition(&mut self, index: &PartitionIndex) -> HypotheticResult<ArrayD<f32>> {
        let dataset = self.open().await?;
        counter!("hypothetic_partition_reads_total").increment(1);

        let (cube, within) = match dataset {
            DatasetHandle::List(cubes) => {
                let (first, rest) = index.split_first()?;
                let cube = cubes.get(first).ok_or_else(|| {
                    HypotheticError::partition_index(format!(
                        "aggregate {} out of range ({} aggregates)",
                        first,
                        cubes.len()
                    ))
                })?;
                (cube, rest)
            }
            DatasetHandle::Single(cube) => (cube, index.as_slice()),
        };

        match cube.lazy_data() {
            LazyData::Realized(array) => Ok(array.clone()),
            LazyData::Deferred(lazy) => lazy.compute(within).await,
        }
    }

    /// Describe the dataset, opening it if needed. Cached until close.
    pub async fn schema(&mut self) -> HypotheticResult<Schema> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        self.open().await?;
        let state = self.opened()?;

        let aggregates: Vec<AggregateSchema> = state
            .dataset
            .cubes()
            .iter()
            .map(|cube| AggregateSchema {
                variable: cube.variable().to_string(),
                shape: cube.shape(),
                dims: cube.dim_names(),
                axes: cube.axes().to_vec(),
                group: cube.group().map(|(name, value)| format!("{}={}", name, value)),
            })
            .collect();
        let schema = Schema {
            dtype: DTYPE,
            npartitions: state.dataset.npartitions(),
            template_uri: state.template.uri().to_string(),
            aggregates,
        };

        self.schema = Some(schema.clone());
        Ok(schema)
    }

    /// Metadata table of the open dataset.
    pub fn metadata_table(&self) -> Option<&MetadataTable> {
        self.state.as_ref().map(|s| &s.metadata)
    }

    /// Replacement coordinates handed to the aggregate builder.
    pub fn coordinates(&self) -> Option<&Table> {
        self.state.as_ref().map(|s| &s.coordinates)
    }

    pub fn template(&self) -> Option<&TemplateHandle> {
        self.state.as_ref().map(|s| &s.template)
    }

    pub fn dataset(&self) -> Option<&DatasetHandle> {
        self.state.as_ref().map(|s| &s.dataset)
    }

    /// Drop the dataset, the template copy and the cached schema.
    ///
    /// The next access rebuilds everything, including the reference time
    /// window.
    pub fn close(&mut self) {
        if self.state.take().is_some() {
            info!(source = %self.name, "Closed source");
        }
        self.schema = None;
    }

    fn opened(&self) -> HypotheticResult<&OpenState> {
        self.state.as_ref().ok_or_else(|| {
            HypotheticError::configuration(format!("source '{}' is not open", self.name))
        })
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn assemble(&self) -> HypotheticResult<OpenState> {
        let key_generator = self.config.resolve_key_generator(&self.registry)?;
        let now = (self.clock)();

        let metadata = build_metadata_table_at(
            &self.config.metadata,
            &self.config.forecast_reference_time,
            key_generator.as_ref(),
            now,
        )?;

        let variable = self.config.variable.as_deref();
        let template = find_template(
            &metadata,
            variable,
            self.fetcher.as_ref(),
            self.reader.as_ref(),
            &self.config.storage_options,
        )
        .await?;

        let coordinates = reduce_coordinates(metadata.as_table(), &[URI_COLUMN]);
        let uris = metadata.uris();

        let dataset = self
            .builder
            .build(AggregateRequest {
                template: &template,
                variable,
                coordinates: &coordinates,
                uris: &uris,
                storage_options: &self.config.storage_options,
                group_by: self.config.group_by.as_deref(),
            })
            .await?;

        info!(
            rows = metadata.len(),
            template_row = template.row_index(),
            coordinates = ?coordinates.columns(),
            aggregates = dataset.cubes().len(),
            "Opened source"
        );

        Ok(OpenState {
            metadata,
            coordinates,
            template,
            dataset,
        })
    }
}

impl std::fmt::Debug for HypotheticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypotheticSource")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("reader", &self.reader.name())
            .field("open", &self.is_open())
            .finish()
    }
}
