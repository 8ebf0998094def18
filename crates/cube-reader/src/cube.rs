//! The structural cube: one variable, its named dimensions and its values.

use std::collections::BTreeMap;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// A named dimension of a cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

impl Dimension {
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
        }
    }
}

/// A single-file cube as returned by a [`crate::CubeReader`].
#[derive(Debug, Clone)]
pub struct Cube {
    /// Variable name (e.g. "soil_temperature")
    pub variable: String,
    /// Physical units, if the file declares them
    pub units: Option<String>,
    /// Dimensions, outermost first
    pub dims: Vec<Dimension>,
    /// Free-form attributes carried over from the file
    pub attributes: BTreeMap<String, String>,
    /// Values, shaped as `dims`
    pub data: ArrayD<f32>,
}

impl Cube {
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.len).collect()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dim_names(&self) -> Vec<String> {
        self.dims.iter().map(|d| d.name.clone()).collect()
    }

    /// Structural description of the cube, without its values.
    pub fn structure(&self) -> CubeStructure {
        CubeStructure {
            variable: self.variable.clone(),
            units: self.units.clone(),
            dims: self.dims.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Everything about a cube except its values.
///
/// This is what a template contributes to an aggregate: the shape, names and
/// encoding every partition is expected to share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeStructure {
    pub variable: String,
    pub units: Option<String>,
    pub dims: Vec<Dimension>,
    pub attributes: BTreeMap<String, String>,
}

impl CubeStructure {
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.len).collect()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Whether a freshly read cube matches this structure.
    pub fn matches(&self, cube: &Cube) -> bool {
        self.variable == cube.variable && self.dims == cube.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_structure_matches_own_cube() {
        let cube = Cube {
            variable: "soil_temperature".into(),
            units: Some("K".into()),
            dims: vec![Dimension::new("latitude", 2), Dimension::new("longitude", 3)],
            attributes: BTreeMap::new(),
            data: ArrayD::zeros(IxDyn(&[2, 3])),
        };

        let structure = cube.structure();
        assert_eq!(structure.shape(), vec![2, 3]);
        assert!(structure.matches(&cube));

        let mut other = cube.clone();
        other.dims[1].len = 4;
        assert!(!structure.matches(&other));
    }
}
