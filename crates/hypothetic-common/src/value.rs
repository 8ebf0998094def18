//! Scalar metadata values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One metadata field value, as declared in a catalog or produced by the
/// time-window generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Canonical string form handed to key generators.
    ///
    /// Integral values always render as plain decimal text, whether they were
    /// declared as integers or as floats (`6.0` renders as `6`).
    pub fn render(&self) -> String {
        match self {
            MetadataValue::Bool(b) => b.to_string(),
            MetadataValue::Integer(i) => i.to_string(),
            MetadataValue::Float(f) => render_float(*f),
            MetadataValue::Text(s) => s.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(i) => Some(*i),
            MetadataValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }
}

fn render_float(f: f64) -> String {
    // i64 covers every integral float we can print exactly
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Integer(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Integer(v as i64)
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        MetadataValue::Integer(v as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_values_render_without_decimal_point() {
        assert_eq!(MetadataValue::Integer(3600).render(), "3600");
        assert_eq!(MetadataValue::Float(6.0).render(), "6");
        assert_eq!(MetadataValue::Float(-12.0).render(), "-12");
    }

    #[test]
    fn test_non_integral_values_render_canonically() {
        assert_eq!(MetadataValue::Float(0.25).render(), "0.25");
        assert_eq!(MetadataValue::Text("mogreps-uk".into()).render(), "mogreps-uk");
        assert_eq!(MetadataValue::Bool(true).render(), "true");
    }

    #[test]
    fn test_untagged_deserialize() {
        let values: Vec<MetadataValue> =
            serde_json::from_str(r#"[1, 2.5, "a", false]"#).unwrap();
        assert_eq!(
            values,
            vec![
                MetadataValue::Integer(1),
                MetadataValue::Float(2.5),
                MetadataValue::Text("a".into()),
                MetadataValue::Bool(false),
            ]
        );
    }
}
