//! GRIB2 cube reader built on the `grib` crate.
//!
//! Each GRIB2 submessage holds one 2-D field. The reader picks the first
//! submessage whose parameter matches the requested variable name and
//! decodes it into a `[y, x]` cube.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hypothetic_common::{HypotheticError, HypotheticResult};
use ndarray::{ArrayD, IxDyn};
use tracing::debug;

use crate::cube::{Cube, Dimension};
use crate::reader::CubeReader;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Reads GRIB2 files, naming fields through a parameter table.
///
/// Fields without a registered name are addressable as
/// `"{discipline}.{category}.{number}"`.
#[derive(Debug, Clone)]
pub struct Grib2CubeReader {
    names: HashMap<ParamKey, String>,
}

impl Default for Grib2CubeReader {
    fn default() -> Self {
        Self::empty()
            .with_parameter((0, 0, 0), "air_temperature")
            .with_parameter((0, 1, 1), "relative_humidity")
            .with_parameter((0, 2, 2), "x_wind")
            .with_parameter((0, 2, 3), "y_wind")
            .with_parameter((0, 3, 0), "air_pressure")
            .with_parameter((0, 3, 1), "air_pressure_at_sea_level")
            .with_parameter((2, 0, 192), "moisture_content_of_soil_layer")
            .with_parameter((2, 3, 18), "soil_temperature")
    }
}

impl Grib2CubeReader {
    /// Reader with the standard parameter names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader with no parameter names; every field uses its numeric key.
    pub fn empty() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: ParamKey, name: impl Into<String>) -> Self {
        self.names.insert(key, name.into());
        self
    }

    /// Name a field is addressed by.
    pub fn parameter_name(&self, key: ParamKey) -> String {
        self.names
            .get(&key)
            .cloned()
            .unwrap_or_else(|| numeric_name(key))
    }

    fn is_wanted(&self, key: ParamKey, variable: Option<&str>) -> bool {
        match variable {
            None => true,
            Some(wanted) => wanted == self.parameter_name(key) || wanted == numeric_name(key),
        }
    }
}

fn numeric_name(key: ParamKey) -> String {
    format!("{}.{}.{}", key.0, key.1, key.2)
}

impl CubeReader for Grib2CubeReader {
    fn load(&self, path: &Path, variable: Option<&str>) -> HypotheticResult<Cube> {
        let file = File::open(path)?;
        let grib2 = grib::from_reader(BufReader::new(file)).map_err(|e| {
            HypotheticError::cube_read(format!("{}: not a GRIB2 file: {}", path.display(), e))
        })?;

        for (index, submessage) in grib2.iter() {
            let prod_def = submessage.prod_def();
            let key = (
                submessage.indicator().discipline,
                prod_def.parameter_category().unwrap_or(u8::MAX),
                prod_def.parameter_number().unwrap_or(u8::MAX),
            );
            if !self.is_wanted(key, variable) {
                continue;
            }

            let name = self.parameter_name(key);
            let grid_template = submessage.grid_def().grid_tmpl_num();
            let product_template = prod_def.prod_tmpl_num();
            let grid_shape = submessage.grid_shape().ok();
            debug!(path = %path.display(), ?index, variable = %name, "Decoding GRIB2 field");

            let decoder = grib::Grib2SubmessageDecoder::from(submessage).map_err(|e| {
                HypotheticError::cube_read(format!("{}: {}: {}", path.display(), name, e))
            })?;
            let values: Vec<f32> = decoder
                .dispatch()
                .map_err(|e| {
                    HypotheticError::cube_read(format!("{}: {}: {}", path.display(), name, e))
                })?
                .collect();

            let dims = match grid_shape {
                Some((ni, nj)) if ni * nj == values.len() => {
                    let (y, x) = if grid_template == 0 {
                        ("latitude", "longitude")
                    } else {
                        ("projection_y_coordinate", "projection_x_coordinate")
                    };
                    vec![Dimension::new(y, nj), Dimension::new(x, ni)]
                }
                _ => vec![Dimension::new("points", values.len())],
            };
            let shape: Vec<usize> = dims.iter().map(|d| d.len).collect();
            let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
                HypotheticError::cube_read(format!("{}: {}: {}", path.display(), name, e))
            })?;

            let mut attributes = BTreeMap::new();
            attributes.insert("grib_parameter".to_string(), numeric_name(key));
            attributes.insert("grid_template".to_string(), grid_template.to_string());
            attributes.insert("product_template".to_string(), product_template.to_string());

            return Ok(Cube {
                variable: name,
                units: None,
                dims,
                attributes,
                data,
            });
        }

        Err(HypotheticError::cube_read(format!(
            "{}: no field matching {}",
            path.display(),
            variable.unwrap_or("<any>")
        )))
    }

    fn name(&self) -> &'static str {
        "grib2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parameter_names() {
        let reader = Grib2CubeReader::new();
        assert_eq!(reader.parameter_name((2, 3, 18)), "soil_temperature");
        assert_eq!(reader.parameter_name((0, 19, 0)), "0.19.0");

        let reader = reader.with_parameter((0, 19, 0), "visibility");
        assert_eq!(reader.parameter_name((0, 19, 0)), "visibility");
        assert!(reader.is_wanted((0, 19, 0), Some("0.19.0")));
        assert!(reader.is_wanted((0, 19, 0), Some("visibility")));
        assert!(!reader.is_wanted((0, 19, 0), Some("soil_temperature")));
        assert!(reader.is_wanted((0, 19, 0), None));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Grib2CubeReader::new()
            .load(&dir.path().join("absent.grib2"), None)
            .unwrap_err();
        assert!(matches!(err, HypotheticError::NotFound(_)));
    }

    #[test]
    fn test_garbage_file_is_cube_read_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not a grib file at all").unwrap();
        let err = Grib2CubeReader::new().load(file.path(), None).unwrap_err();
        assert!(matches!(err, HypotheticError::CubeRead(_)));
    }
}
