//! Source catalog configuration.
//!
//! A catalog is a YAML file naming one or more sources:
//!
//! ```yaml
//! sources:
//!   mogreps_soil:
//!     variable: soil_temperature
//!     key_template: "s3://mogreps-uk/{forecast_reference_time}/{forecast_period}.grib2"
//!     forecast_reference_time:
//!       interval_seconds: 21600
//!       model_start_offset_seconds: 0
//!       retention_seconds: 86400
//!     metadata:
//!       model: mogreps-uk
//!       forecast_period: [0, 3, 6]
//!     storage_options:
//!       anon: true
//!       timeout_secs: ${HYPOTHETIC_TIMEOUT_SECS:-30}
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are substituted from the environment
//! before parsing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use storage::StorageOptions;

use hypothetic_common::{HypotheticError, HypotheticResult, ScheduleDescription};

use crate::key_generator::{KeyGenerator, KeyGeneratorRegistry, TemplateKeyGenerator};
use crate::metadata::{MetadataDeclaration, URI_COLUMN};

/// Configuration of one source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub description: Option<String>,
    /// Variable to read from each object; any variable when unset
    #[serde(default)]
    pub variable: Option<String>,
    /// Name of a registered key generator
    #[serde(default)]
    pub key_generator: Option<String>,
    /// `{field}` placeholder template used instead of a registered generator
    #[serde(default)]
    pub key_template: Option<String>,
    /// Model run schedule feeding `forecast_reference_time`
    pub forecast_reference_time: ScheduleDescription,
    #[serde(default)]
    pub metadata: MetadataDeclaration,
    #[serde(default)]
    pub storage_options: StorageOptions,
    /// Split the dataset into one aggregate per value of this field
    #[serde(default)]
    pub group_by: Option<String>,
}

impl SourceConfig {
    pub fn new(schedule: ScheduleDescription, metadata: MetadataDeclaration) -> Self {
        Self {
            description: None,
            variable: None,
            key_generator: None,
            key_template: None,
            forecast_reference_time: schedule,
            metadata,
            storage_options: StorageOptions::default(),
            group_by: None,
        }
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    pub fn with_key_generator(mut self, name: impl Into<String>) -> Self {
        self.key_generator = Some(name.into());
        self.key_template = None;
        self
    }

    pub fn with_key_template(mut self, template: impl Into<String>) -> Self {
        self.key_template = Some(template.into());
        self.key_generator = None;
        self
    }

    pub fn with_storage_options(mut self, options: StorageOptions) -> Self {
        self.storage_options = options;
        self
    }

    pub fn with_group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn validate(&self) -> HypotheticResult<()> {
        self.forecast_reference_time.validate()?;

        match (&self.key_generator, &self.key_template) {
            (Some(_), Some(_)) => {
                return Err(HypotheticError::configuration(
                    "set either key_generator or key_template, not both",
                ))
            }
            (None, None) => {
                return Err(HypotheticError::configuration(
                    "one of key_generator or key_template is required",
                ))
            }
            (None, Some(template)) => {
                TemplateKeyGenerator::parse(template)?;
            }
            (Some(_), None) => {}
        }

        if self.group_by.as_deref() == Some(URI_COLUMN) {
            return Err(HypotheticError::configuration("cannot group by uri"));
        }
        Ok(())
    }

    /// The key generator for this source: the parsed template, or the named
    /// generator looked up in `registry`.
    pub fn resolve_key_generator(
        &self,
        registry: &KeyGeneratorRegistry,
    ) -> HypotheticResult<Arc<dyn KeyGenerator>> {
        match (&self.key_generator, &self.key_template) {
            (None, Some(template)) => Ok(Arc::new(TemplateKeyGenerator::parse(template)?)),
            (Some(name), None) => registry.resolve(name),
            _ => {
                self.validate()?;
                Err(HypotheticError::configuration("no key generator configured"))
            }
        }
    }
}

/// Every source defined in one catalog file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Catalog {
    /// Load a catalog from a YAML file, substituting environment variables.
    pub fn load(path: impl AsRef<Path>) -> HypotheticResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HypotheticError::configuration(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
            .map_err(|e| HypotheticError::configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(content: &str) -> HypotheticResult<Self> {
        let expanded = shellexpand::env(content)
            .map_err(|e| HypotheticError::configuration(format!("environment substitution failed: {}", e)))?;

        let catalog: Catalog = serde_yaml::from_str(&expanded)
            .map_err(|e| HypotheticError::configuration(format!("invalid catalog YAML: {}", e)))?;

        for (name, source) in &catalog.sources {
            source
                .validate()
                .map_err(|e| HypotheticError::configuration(format!("source '{}': {}", name, e)))?;
        }
        Ok(catalog)
    }

    pub fn source(&self, name: &str) -> HypotheticResult<&SourceConfig> {
        self.sources.get(name).ok_or_else(|| {
            HypotheticError::configuration(format!(
                "unknown source '{}' (available: {:?})",
                name,
                self.sources.keys().collect::<Vec<_>>()
            ))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypothetic_common::MetadataValue;

    const CATALOG: &str = r#"
sources:
  mogreps_soil:
    description: MOGREPS-UK soil temperature
    variable: soil_temperature
    key_template: "s3://mogreps-uk/{forecast_reference_time}/{forecast_period}-{level}.grib2"
    forecast_reference_time:
      interval_seconds: 21600
      retention_seconds: 86400
    metadata:
      model: mogreps-uk
      level: [10, 35]
      forecast_period: [0, 3, 6]
    storage_options:
      anon: true
      requester_pays: false
  custom:
    key_generator: my_keys
    forecast_reference_time:
      interval_seconds: 3600
      retention_seconds: 3600
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["custom", "mogreps_soil"]);

        let source = catalog.source("mogreps_soil").unwrap();
        assert_eq!(source.variable.as_deref(), Some("soil_temperature"));
        assert_eq!(source.forecast_reference_time.model_start_offset_seconds, 0);
        assert!(source.storage_options.anon);
        assert!(source.storage_options.extra.contains_key("requester_pays"));

        let axes: Vec<&str> = source.metadata.axes().map(|(n, _)| n).collect();
        assert_eq!(axes, vec!["level", "forecast_period"]);
        assert_eq!(
            source.metadata.scalars().next(),
            Some(("model", &MetadataValue::Text("mogreps-uk".into())))
        );

        let custom = catalog.source("custom").unwrap();
        assert!(custom.metadata.is_empty());
        assert!(catalog.source("missing").is_err());
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("HYPOTHETIC_TEST_BUCKET", "staging-bucket");
        let catalog = Catalog::from_yaml_str(
            r#"
sources:
  a:
    key_template: "s3://${HYPOTHETIC_TEST_BUCKET}/{forecast_reference_time}"
    forecast_reference_time: {interval_seconds: 3600, retention_seconds: 3600}
    storage_options:
      timeout_secs: ${HYPOTHETIC_TEST_UNSET_TIMEOUT:-45}
"#,
        )
        .unwrap();

        let source = catalog.source("a").unwrap();
        assert_eq!(
            source.key_template.as_deref(),
            Some("s3://staging-bucket/{forecast_reference_time}")
        );
        assert_eq!(source.storage_options.timeout_secs, Some(45));
    }

    #[test]
    fn test_unset_variable_is_configuration_error() {
        let err = Catalog::from_yaml_str("sources:\n  a:\n    key_generator: ${HYPOTHETIC_TEST_DEFINITELY_UNSET}\n")
            .unwrap_err();
        assert!(matches!(err, HypotheticError::Configuration(_)));
    }

    #[test]
    fn test_validation() {
        let schedule = ScheduleDescription::new(3600, 0, 3600);
        let base = SourceConfig::new(schedule, MetadataDeclaration::new());
        assert!(base.validate().is_err());
        assert!(base.clone().with_key_generator("x").validate().is_ok());
        assert!(base.clone().with_key_template("{a").validate().is_err());
        assert!(base
            .clone()
            .with_key_generator("x")
            .with_group_by("uri")
            .validate()
            .is_err());

        let mut both = base.with_key_generator("x");
        both.key_template = Some("{a}".into());
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let err = Catalog::from_yaml_str(
            "sources:\n  a:\n    key_generator: x\n    forecast_reference_time: {interval_seconds: 7200, retention_seconds: 60}\n",
        )
        .unwrap_err();
        assert!(matches!(err, HypotheticError::Configuration(_)));
    }
}
