//! Metadata space enumeration.
//!
//! A [`MetadataDeclaration`] names the fields that describe one partition.
//! Axis fields carry an ordered list of candidate values and scalar fields
//! a single value. [`build_metadata_table`] expands the axes into their full
//! cartesian product (first declared axis outermost, last declared axis
//! cycling fastest), fills in the generated forecast reference times, and
//! asks the key generator for each row's URI.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, instrument};

use hypothetic_common::{
    generate_reference_times_at, HypotheticError, HypotheticResult, MetadataValue,
    ScheduleDescription,
};

use crate::key_generator::{KeyGenerator, KeyRecord};
use crate::table::Table;

/// Field filled in from the schedule, always as an axis.
pub const FORECAST_REFERENCE_TIME: &str = "forecast_reference_time";

/// Column holding each row's generated URI.
pub const URI_COLUMN: &str = "uri";

/// One declared metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataField {
    /// Ordered candidate values; one table row per value per combination
    Axis(Vec<MetadataValue>),
    /// The same value on every row
    Scalar(MetadataValue),
}

/// Ordered declaration of axis and scalar metadata fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataDeclaration {
    fields: Vec<(String, MetadataField)>,
}

impl MetadataDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an axis field.
    pub fn with_axis<I, V>(mut self, name: impl Into<String>, values: I) -> HypotheticResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<MetadataValue>,
    {
        let values: Vec<MetadataValue> = values.into_iter().map(Into::into).collect();
        self.push(name.into(), MetadataField::Axis(values))?;
        Ok(self)
    }

    /// Add a scalar field.
    pub fn with_scalar(
        mut self,
        name: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> HypotheticResult<Self> {
        self.push(name.into(), MetadataField::Scalar(value.into()))?;
        Ok(self)
    }

    /// Build a declaration from an ordered YAML mapping: sequences become
    /// axes, plain values become scalars.
    pub fn from_yaml_mapping(mapping: &Mapping) -> HypotheticResult<Self> {
        let mut declaration = Self::new();
        for (key, value) in mapping {
            let name = key.as_str().ok_or_else(|| {
                HypotheticError::configuration(format!("metadata field name must be a string, got {:?}", key))
            })?;
            let field = match value {
                Value::Sequence(items) => MetadataField::Axis(
                    items
                        .iter()
                        .map(|item| yaml_to_value(name, item))
                        .collect::<HypotheticResult<_>>()?,
                ),
                other => MetadataField::Scalar(yaml_to_value(name, other)?),
            };
            declaration.push(name.to_string(), field)?;
        }
        Ok(declaration)
    }

    fn push(&mut self, name: String, field: MetadataField) -> HypotheticResult<()> {
        if name == URI_COLUMN {
            return Err(HypotheticError::configuration(format!(
                "metadata field name '{}' is reserved",
                URI_COLUMN
            )));
        }
        if self.get(&name).is_some() {
            return Err(HypotheticError::configuration(format!(
                "metadata field '{}' declared twice",
                name
            )));
        }
        if let MetadataField::Axis(values) = &field {
            check_axis(&name, values)?;
        }
        self.fields.push((name, field));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetadataField> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    /// Axis fields in declaration order.
    pub fn axes(&self) -> impl Iterator<Item = (&str, &[MetadataValue])> {
        self.fields.iter().filter_map(|(name, field)| match field {
            MetadataField::Axis(values) => Some((name.as_str(), values.as_slice())),
            MetadataField::Scalar(_) => None,
        })
    }

    /// Scalar fields in declaration order.
    pub fn scalars(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.fields.iter().filter_map(|(name, field)| match field {
            MetadataField::Scalar(value) => Some((name.as_str(), value)),
            MetadataField::Axis(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy of this declaration with `name` set to the axis `values`.
    ///
    /// An existing field of that name is replaced where it stands; otherwise
    /// the axis is appended.
    pub fn replaced_axis(&self, name: &str, values: Vec<MetadataValue>) -> HypotheticResult<Self> {
        check_axis(name, &values)?;
        let mut out = self.clone();
        match out.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, field)) => *field = MetadataField::Axis(values),
            None => out.push(name.to_string(), MetadataField::Axis(values))?,
        }
        Ok(out)
    }
}

impl<'de> serde::Deserialize<'de> for MetadataDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mapping = Mapping::deserialize(deserializer)?;
        Self::from_yaml_mapping(&mapping).map_err(serde::de::Error::custom)
    }
}

/// Axes must be non-empty and their values distinct once rendered.
fn check_axis(name: &str, values: &[MetadataValue]) -> HypotheticResult<()> {
    if values.is_empty() {
        return Err(HypotheticError::configuration(format!(
            "metadata axis '{}' has no values",
            name
        )));
    }
    let mut seen = HashSet::with_capacity(values.len());
    for value in values {
        let rendered = value.render();
        if !seen.insert(rendered.clone()) {
            return Err(HypotheticError::configuration(format!(
                "metadata axis '{}' repeats the value '{}'",
                name, rendered
            )));
        }
    }
    Ok(())
}

fn yaml_to_value(field: &str, value: &Value) -> HypotheticResult<MetadataValue> {
    match value {
        Value::Bool(b) => Ok(MetadataValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(MetadataValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(MetadataValue::Float(f))
            } else {
                Err(HypotheticError::configuration(format!(
                    "metadata field '{}': number {} out of range",
                    field, n
                )))
            }
        }
        Value::String(s) => Ok(MetadataValue::Text(s.clone())),
        Value::Tagged(tagged) => yaml_to_value(field, &tagged.value),
        other => Err(HypotheticError::configuration(format!(
            "metadata field '{}': unsupported value {:?}",
            field, other
        ))),
    }
}

/// One row per partition: every metadata column, then `uri`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataTable {
    table: Table,
}

impl MetadataTable {
    /// The full table, `uri` column included.
    pub fn as_table(&self) -> &Table {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        self.table.columns()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&MetadataValue>> {
        self.table.column(name)
    }

    pub fn row(&self, index: usize) -> Option<&[MetadataValue]> {
        self.table.row(index)
    }

    /// URI of row `index`.
    pub fn uri(&self, index: usize) -> Option<&str> {
        self.table.row(index).and_then(|row| row.last()).and_then(|v| v.as_str())
    }

    /// Every row's URI, in row order.
    pub fn uris(&self) -> Vec<&str> {
        (0..self.len()).filter_map(|i| self.uri(i)).collect()
    }
}

/// Build the metadata table for the reference time window ending now.
pub fn build_metadata_table(
    declaration: &MetadataDeclaration,
    schedule: &ScheduleDescription,
    key_generator: &dyn KeyGenerator,
) -> HypotheticResult<MetadataTable> {
    build_metadata_table_at(declaration, schedule, key_generator, Utc::now())
}

/// Build the metadata table for the reference time window ending at `now`.
#[instrument(skip(declaration, key_generator), fields(fields = declaration.len()))]
pub fn build_metadata_table_at(
    declaration: &MetadataDeclaration,
    schedule: &ScheduleDescription,
    key_generator: &dyn KeyGenerator,
    now: DateTime<Utc>,
) -> HypotheticResult<MetadataTable> {
    let times = generate_reference_times_at(schedule, now)?;
    let declaration = declaration.replaced_axis(
        FORECAST_REFERENCE_TIME,
        times.iso_strings().map(MetadataValue::Text).collect(),
    )?;

    let (axis_names, axis_values): (Vec<&str>, Vec<&[MetadataValue]>) = declaration.axes().unzip();
    let scalars: Vec<(&str, &MetadataValue)> = declaration.scalars().collect();

    let mut columns: Vec<String> = axis_names.iter().map(|n| n.to_string()).collect();
    columns.extend(scalars.iter().map(|(n, _)| n.to_string()));
    columns.push(URI_COLUMN.to_string());
    let mut table = Table::new(columns.clone());

    for combination in axis_values
        .iter()
        .map(|values| values.iter())
        .multi_cartesian_product()
    {
        let mut row: Vec<MetadataValue> = combination.into_iter().cloned().collect();
        row.extend(scalars.iter().map(|(_, v)| (*v).clone()));

        let record: KeyRecord = columns
            .iter()
            .zip(row.iter())
            .map(|(name, value)| (name.clone(), value.render()))
            .collect();
        let uri = key_generator.generate(&record)?;
        row.push(MetadataValue::Text(uri));
        table.push_row(row)?;
    }

    debug!(
        rows = table.len(),
        axes = axis_names.len(),
        window = times.len(),
        "Built metadata table"
    );
    Ok(MetadataTable { table })
}
