//! Partition coordinates.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use hypothetic_common::{HypotheticError, HypotheticResult};

/// Ordered index of one partition, outermost dimension first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PartitionIndex(Vec<usize>);

impl PartitionIndex {
    pub fn new(components: Vec<usize>) -> Self {
        Self(components)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First component and the rest.
    pub fn split_first(&self) -> HypotheticResult<(usize, &[usize])> {
        self.0
            .split_first()
            .map(|(first, rest)| (*first, rest))
            .ok_or_else(|| {
                HypotheticError::partition_index("an aggregate list needs at least one index component")
            })
    }
}

impl From<Vec<usize>> for PartitionIndex {
    fn from(components: Vec<usize>) -> Self {
        Self(components)
    }
}

impl<const N: usize> From<[usize; N]> for PartitionIndex {
    fn from(components: [usize; N]) -> Self {
        Self(components.to_vec())
    }
}

impl From<&[usize]> for PartitionIndex {
    fn from(components: &[usize]) -> Self {
        Self(components.to_vec())
    }
}

impl TryFrom<&Value> for PartitionIndex {
    type Error = HypotheticError;

    /// Accepts only a JSON array of non-negative integers.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let items = value.as_array().ok_or_else(|| {
            HypotheticError::partition_index(format!(
                "partition must be given as a list of integers, got {}",
                value
            ))
        })?;

        items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| {
                        HypotheticError::partition_index(format!(
                            "partition component {} is not a non-negative integer",
                            item
                        ))
                    })
            })
            .collect::<HypotheticResult<Vec<_>>>()
            .map(PartitionIndex)
    }
}

impl FromStr for PartitionIndex {
    type Err = HypotheticError;

    /// Parses a JSON array such as `[1, 0, 0]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(s).map_err(|e| {
            HypotheticError::partition_index(format!("'{}' is not a JSON list: {}", s, e))
        })?;
        PartitionIndex::try_from(&value)
    }
}

impl fmt::Display for PartitionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
