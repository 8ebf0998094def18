//! Single-file cube readers.
//!
//! A cube is one variable read from one local file: named dimensions, a few
//! attributes and an n-dimensional array of values. The assembly layer only
//! talks to readers through the [`CubeReader`] trait; [`Grib2CubeReader`] is
//! the bundled implementation for GRIB2 model output.

pub mod cube;
pub mod grib;
pub mod reader;

pub use cube::{Cube, CubeStructure, Dimension};
pub use grib::{Grib2CubeReader, ParamKey};
pub use reader::CubeReader;
