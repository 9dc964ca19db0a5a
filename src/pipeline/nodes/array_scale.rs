//! ArrayScaleNode: multiplies one point array by a constant.
//!
//! Works on either dataset kind. Information and requests pass straight
//! through; only `execute` is implemented.

use super::assign;
use crate::pipeline::data::DataSet;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::{Algorithm, Capabilities, ExecuteContext};
use crate::pipeline::param::{invalid, ConfigValue};
use crate::pipeline::port::{PortDescriptor, PortKind};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", PortKind::Any),
    PortDescriptor::output("out", PortKind::Any),
];

pub struct ArrayScaleNode {
    /// Array to scale. `None` = the first point array.
    array: Option<String>,
    factor: f64,
}

impl ArrayScaleNode {
    pub fn new() -> Self {
        Self {
            array: None,
            factor: 1.0,
        }
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_array(mut self, name: impl Into<String>) -> Self {
        self.array = Some(name.into());
        self
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl Algorithm for ArrayScaleNode {
    fn name(&self) -> &str {
        "ArrayScale"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::EXECUTE_ONLY
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let input = ctx.required_input(0)?;
        // Upstream may hand over more than was asked for.
        let mut output = match (input, ctx.request(0).extent) {
            (DataSet::Image(image), Some(wanted)) if image.extent != wanted => {
                DataSet::Image(image.extract(&wanted))
            }
            _ => input.clone(),
        };

        let arrays = output.point_data_mut();
        let target = match &self.array {
            Some(name) => arrays.iter_mut().find(|a| &a.name == name),
            None => arrays.first_mut(),
        };
        let Some(target) = target else {
            return Err(PipelineError::UnsupportedData(format!(
                "no point array {} to scale",
                self.array.as_deref().unwrap_or("(first)")
            )));
        };
        for v in &mut target.values {
            *v *= self.factor;
        }

        ctx.set_output(0, output);
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            "factor" => {
                let v = value.as_f64().ok_or_else(|| invalid(key, "a number", value))?;
                Ok(assign(&mut self.factor, v))
            }
            "array" => {
                let v = value.as_str().ok_or_else(|| invalid(key, "a string", value))?;
                let v = if v.is_empty() { None } else { Some(v.to_string()) };
                Ok(assign(&mut self.array, v))
            }
            _ => Err(PipelineError::UnknownParameter {
                node: self.name().to_string(),
                key: key.to_string(),
            }),
        }
    }
}

impl Default for ArrayScaleNode {
    fn default() -> Self {
        Self::new()
    }
}
