//! WaveletSourceNode: analytic structured source.
//!
//! Produces a Gaussian bump modulated by sinusoids over a regular grid, as the
//! point array `RTData`. Only the requested sub-extent is computed, so a piece
//! request costs proportionally to its size.

use super::assign;
use crate::pipeline::data::{DataArray, DataSet, ImageData};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::Extent;
use crate::pipeline::node::{Algorithm, Capabilities, ExecuteContext, InformationContext};
use crate::pipeline::param::{invalid, ConfigValue};
use crate::pipeline::port::{PortDescriptor, PortKind};

static PORTS: &[PortDescriptor] = &[PortDescriptor::output("out", PortKind::ImageData)];

/// Name of the generated point array.
pub const ARRAY_NAME: &str = "RTData";

/// Analytic image source.
pub struct WaveletSourceNode {
    whole_extent: Extent,
    center: [f64; 3],
    maximum: f64,
    standard_deviation: f64,
    frequencies: [f64; 3],
    magnitudes: [f64; 3],
    time_steps: Vec<f64>,
}

impl WaveletSourceNode {
    pub fn new() -> Self {
        Self {
            whole_extent: Extent::new(-10, 10, -10, 10, -10, 10),
            center: [0.0; 3],
            maximum: 255.0,
            standard_deviation: 0.5,
            frequencies: [60.0, 30.0, 40.0],
            magnitudes: [10.0, 18.0, 5.0],
            time_steps: Vec::new(),
        }
    }

    pub fn with_whole_extent(mut self, extent: Extent) -> Self {
        self.whole_extent = extent;
        self
    }

    pub fn with_time_steps(mut self, steps: Vec<f64>) -> Self {
        self.time_steps = steps;
        self
    }

    pub fn whole_extent(&self) -> Extent {
        self.whole_extent
    }

    /// Field value at index `ijk`, shifted by `time`.
    pub fn value_at(&self, ijk: [i32; 3], time: f64) -> f64 {
        let scale = |axis: usize| {
            let (lo, hi) = self.whole_extent.axis(axis);
            if hi > lo {
                1.0 / (hi - lo) as f64
            } else {
                1.0
            }
        };
        let x = (self.center[0] - ijk[0] as f64) * scale(0);
        let y = (self.center[1] - ijk[1] as f64) * scale(1);
        let z = (self.center[2] - ijk[2] as f64) * scale(2);
        let sum = x * x + y * y + z * z;
        let falloff = 1.0 / (2.0 * self.standard_deviation * self.standard_deviation);

        self.maximum * (-sum * falloff).exp()
            + self.magnitudes[0] * (self.frequencies[0] * x).sin()
            + self.magnitudes[1] * (self.frequencies[1] * y).sin()
            + self.magnitudes[2] * (self.frequencies[2] * z).cos()
            + time
    }
}

impl Algorithm for WaveletSourceNode {
    fn name(&self) -> &str {
        "WaveletSource"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            information: true,
            update_extent: false,
            executes: true,
        }
    }

    fn request_information(&mut self, ctx: &mut InformationContext) -> PipelineResult<()> {
        let out = ctx.output_mut(0);
        out.set_whole_extent(self.whole_extent);
        out.set_geometry([0.0; 3], [1.0; 3]);
        out.set_time_steps(self.time_steps.clone());
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let request = ctx.request(0);
        let extent = request.extent.unwrap_or(self.whole_extent);
        let time = request.time.unwrap_or(0.0);

        let info = ctx.output_info(0);
        let mut image = ImageData::new(extent);
        image.origin = info.origin();
        image.spacing = info.spacing();
        let values = extent.iter_points().map(|ijk| self.value_at(ijk, time)).collect();
        image.point_data.push(DataArray::scalars(ARRAY_NAME, values));

        tracing::trace!("WaveletSource generated {} points for {}", extent.num_points(), extent);
        ctx.set_output(0, DataSet::Image(image));
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            "whole_extent" => Ok(assign(&mut self.whole_extent, value.as_extent()?)),
            "center" => {
                let v = value.as_triple().ok_or_else(|| invalid(key, "three numbers", value))?;
                Ok(assign(&mut self.center, v))
            }
            "maximum" => {
                let v = value.as_f64().ok_or_else(|| invalid(key, "a number", value))?;
                Ok(assign(&mut self.maximum, v))
            }
            "standard_deviation" => {
                let v = value.as_f64().ok_or_else(|| invalid(key, "a number", value))?;
                if v <= 0.0 {
                    return Err(PipelineError::InvalidParameter {
                        key: key.to_string(),
                        message: "must be positive".to_string(),
                    });
                }
                Ok(assign(&mut self.standard_deviation, v))
            }
            "frequencies" => {
                let v = value.as_triple().ok_or_else(|| invalid(key, "three numbers", value))?;
                Ok(assign(&mut self.frequencies, v))
            }
            "magnitudes" => {
                let v = value.as_triple().ok_or_else(|| invalid(key, "three numbers", value))?;
                Ok(assign(&mut self.magnitudes, v))
            }
            "time_steps" => {
                let v = value.as_f64_list().ok_or_else(|| invalid(key, "a list of numbers", value))?;
                Ok(assign(&mut self.time_steps, v))
            }
            _ => Err(PipelineError::UnknownParameter {
                node: self.name().to_string(),
                key: key.to_string(),
            }),
        }
    }
}

impl Default for WaveletSourceNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::data::DataKind;
    use crate::pipeline::information::{PortInformation, UpdateRequest};

    fn run(node: &mut WaveletSourceNode, request: UpdateRequest) -> ExecuteContext {
        let mut info = PortInformation::new(Some(DataKind::Image));
        info.set_whole_extent(node.whole_extent());
        let mut ctx = ExecuteContext::new(vec![], vec![], vec![], vec![request], vec![info]);
        node.execute(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn test_generates_only_requested_extent() {
        let mut node = WaveletSourceNode::new().with_whole_extent(Extent::new(0, 9, 0, 9, 0, 9));
        let sub = Extent::new(0, 9, 0, 9, 5, 9);
        let outputs = run(&mut node, UpdateRequest::for_extent(sub)).into_outputs();
        let image = outputs[0].as_ref().unwrap();
        assert_eq!(image.num_points(), 500);
        assert_eq!(image.point_array(ARRAY_NAME).unwrap().values.len(), 500);
    }

    #[test]
    fn test_piece_values_match_whole() {
        let mut node = WaveletSourceNode::new().with_whole_extent(Extent::new(0, 4, 0, 4, 0, 4));
        let whole = run(&mut node, UpdateRequest::whole()).into_outputs().remove(0).unwrap();
        let sub = Extent::new(2, 3, 1, 1, 4, 4);
        let part = run(&mut node, UpdateRequest::for_extent(sub)).into_outputs().remove(0).unwrap();
        let cropped = whole.as_image().unwrap().extract(&sub);
        assert_eq!(part.as_image().unwrap().point_data, cropped.point_data);
    }

    #[test]
    fn test_parameter_changes_are_reported() {
        let mut node = WaveletSourceNode::new();
        assert!(node.set_parameter("maximum", &ConfigValue::Float(100.0)).unwrap());
        assert!(!node.set_parameter("maximum", &ConfigValue::Int(100)).unwrap());
        assert!(node.set_parameter("standard_deviation", &ConfigValue::Float(0.0)).is_err());
        assert!(node.set_parameter("bogus", &ConfigValue::Bool(true)).is_err());
    }
}
