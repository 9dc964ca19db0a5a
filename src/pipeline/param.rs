//! Node parameter values.
//!
//! Parameters reach nodes as loosely typed [`ConfigValue`]s, either from code
//! or from a pipeline description file. Accessors are lenient where the
//! intent is unambiguous (an integer where a float is wanted).

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::Extent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Float or integer as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Any list as floats.
    pub fn as_f64_list(&self) -> Option<Vec<f64>> {
        match self {
            ConfigValue::FloatList(v) => Some(v.clone()),
            ConfigValue::IntList(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }

    pub fn as_triple(&self) -> Option<[f64; 3]> {
        match self.as_f64_list()?.as_slice() {
            [a, b, c] => Some([*a, *b, *c]),
            _ => None,
        }
    }

    /// 2, 4 or 6 integers, or a string such as `"0 31 0 31 0 31"`.
    pub fn as_extent(&self) -> PipelineResult<Extent> {
        match self {
            ConfigValue::IntList(v) => {
                let bounds = v
                    .iter()
                    .map(|&x| {
                        i32::try_from(x).map_err(|_| {
                            PipelineError::MalformedExtent(format!("bound {} out of range", x))
                        })
                    })
                    .collect::<PipelineResult<Vec<i32>>>()?;
                Extent::from_slice(&bounds)
            }
            ConfigValue::String(s) => s.parse(),
            other => Err(PipelineError::MalformedExtent(format!(
                "expected a list of integers, got {:?}",
                other
            ))),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

impl From<Extent> for ConfigValue {
    fn from(e: Extent) -> Self {
        ConfigValue::IntList(e.0.iter().map(|&x| x as i64).collect())
    }
}

impl From<[f64; 3]> for ConfigValue {
    fn from(v: [f64; 3]) -> Self {
        ConfigValue::FloatList(v.to_vec())
    }
}

impl From<Vec<f64>> for ConfigValue {
    fn from(v: Vec<f64>) -> Self {
        ConfigValue::FloatList(v)
    }
}

/// Shorthand for the usual "wrong type" parameter error.
pub(crate) fn invalid(key: &str, expected: &str, got: &ConfigValue) -> PipelineError {
    PipelineError::InvalidParameter {
        key: key.to_string(),
        message: format!("expected {}, got {:?}", expected, got),
    }
}
