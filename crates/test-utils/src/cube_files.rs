//! JSON cube files and a reader for them.
//!
//! Real readers need real GRIB2/NetCDF files. The assembly tests only care
//! about shapes and values, so they write tiny JSON "cubes" and read them back
//! with [`JsonCubeReader`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cube_reader::{Cube, CubeReader, Dimension};
use hypothetic_common::{HypotheticError, HypotheticResult};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

/// On-disk form of a JSON cube.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubeFile {
    pub variable: String,
    #[serde(default)]
    pub units: Option<String>,
    pub dims: Vec<Dimension>,
    pub values: Vec<f32>,
}

impl CubeFile {
    /// A cube whose every value is `fill`.
    pub fn filled(variable: &str, dims: &[(&str, usize)], fill: f32) -> Self {
        let dims: Vec<Dimension> = dims.iter().map(|(n, l)| Dimension::new(*n, *l)).collect();
        let size = dims.iter().map(|d| d.len).product();
        Self {
            variable: variable.to_string(),
            units: None,
            dims,
            values: vec![fill; size],
        }
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        let json = serde_json::to_vec(self).expect("serialize cube file");
        std::fs::write(path, json).expect("write cube file");
        path.to_path_buf()
    }
}

/// Write a cube file whose values are all `fill` to `dir/name`.
pub fn write_cube_file(
    dir: &Path,
    name: &str,
    variable: &str,
    dims: &[(&str, usize)],
    fill: f32,
) -> PathBuf {
    CubeFile::filled(variable, dims, fill).write(&dir.join(name))
}

/// Reads [`CubeFile`] JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCubeReader;

impl CubeReader for JsonCubeReader {
    fn load(&self, path: &Path, variable: Option<&str>) -> HypotheticResult<Cube> {
        let bytes = std::fs::read(path)?;
        let file: CubeFile = serde_json::from_slice(&bytes).map_err(|e| {
            HypotheticError::cube_read(format!("{}: not a JSON cube: {}", path.display(), e))
        })?;

        if let Some(wanted) = variable {
            if wanted != file.variable {
                return Err(HypotheticError::cube_read(format!(
                    "{}: variable '{}' not found (file holds '{}')",
                    path.display(),
                    wanted,
                    file.variable
                )));
            }
        }

        let shape: Vec<usize> = file.dims.iter().map(|d| d.len).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), file.values)
            .map_err(|e| HypotheticError::cube_read(format!("{}: {}", path.display(), e)))?;

        Ok(Cube {
            variable: file.variable,
            units: file.units,
            dims: file.dims,
            attributes: BTreeMap::new(),
            data,
        })
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cube_file(
            dir.path(),
            "a.json",
            "soil_temperature",
            &[("latitude", 2), ("longitude", 3)],
            280.5,
        );

        let cube = JsonCubeReader.load(&path, Some("soil_temperature")).unwrap();
        assert_eq!(cube.shape(), vec![2, 3]);
        assert!(cube.data.iter().all(|&v| v == 280.5));
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = JsonCubeReader.load(&dir.path().join("nope.json"), None).unwrap_err();
        assert!(matches!(missing, HypotheticError::NotFound(_)));

        let path = write_cube_file(dir.path(), "a.json", "x_wind", &[("points", 4)], 0.0);
        let wrong_var = JsonCubeReader.load(&path, Some("y_wind")).unwrap_err();
        assert!(matches!(wrong_var, HypotheticError::CubeRead(_)));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, b"GRIB").unwrap();
        let err = JsonCubeReader.load(&garbage, None).unwrap_err();
        assert!(matches!(err, HypotheticError::CubeRead(_)));
    }
}
