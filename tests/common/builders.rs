//! Test nodes and pipeline builders

use std::sync::{Arc, Mutex};
use vispipe::pipeline::nodes::{
    AppendPolyDataNode, ExtractVoiNode, ImageToPointsNode, PointCloudSourceNode, WaveletSourceNode,
};
use vispipe::pipeline::{
    Algorithm, AnyNode, BuiltinNode, Capabilities, ConfigValue, DataSet, ExecuteContext, Extent,
    ImageData, InformationContext, NodeId, Pipeline, PipelineError, PipelineResult,
    PortDescriptor, PortKind, UpdateExtentContext, UpdateRequest,
};
use vispipe::ExecutiveConfig;

/// Requests seen by a node's execute hook, shared with the test
pub type RequestLog = Arc<Mutex<Vec<UpdateRequest>>>;

pub fn request_log() -> RequestLog {
    Arc::new(Mutex::new(Vec::new()))
}

static IMAGE_FILTER: &[PortDescriptor] = &[
    PortDescriptor::input("in", PortKind::ImageData),
    PortDescriptor::output("out", PortKind::ImageData),
];

static ANY_SINK: &[PortDescriptor] = &[PortDescriptor::input("in", PortKind::Any)];

static IMAGE_SOURCE: &[PortDescriptor] = &[PortDescriptor::output("out", PortKind::ImageData)];

/// Image filter that crops to its request, logs it, and can be told to fail.
pub struct CropFilter {
    log: RequestLog,
    fail: bool,
    level: i64,
}

impl CropFilter {
    pub fn new(log: RequestLog) -> Self {
        Self {
            log,
            fail: false,
            level: 0,
        }
    }
}

impl Algorithm for CropFilter {
    fn name(&self) -> &str {
        "CropFilter"
    }

    fn ports(&self) -> &[PortDescriptor] {
        IMAGE_FILTER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::EXECUTE_ONLY
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let request = ctx.request(0);
        self.log.lock().unwrap().push(request);
        if self.fail {
            return Err(PipelineError::UnsupportedData("told to fail".to_string()));
        }
        let image = ctx
            .required_input(0)?
            .as_image()
            .ok_or_else(|| PipelineError::UnsupportedData("expected image".to_string()))?;
        let out = match request.extent {
            Some(extent) => image.extract(&extent),
            None => image.clone(),
        };
        ctx.set_output(0, DataSet::Image(out));
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            "fail" => {
                let v = value.as_bool().unwrap_or(false);
                let changed = v != self.fail;
                self.fail = v;
                Ok(changed)
            }
            "level" => {
                let v = value.as_int().unwrap_or(0);
                let changed = v != self.level;
                self.level = v;
                Ok(changed)
            }
            _ => Err(PipelineError::UnknownParameter {
                node: self.name().to_string(),
                key: key.to_string(),
            }),
        }
    }
}

/// Consumer without outputs that records how many points it was handed.
pub struct RecordingSink {
    pub seen: Arc<Mutex<Vec<usize>>>,
}

impl Algorithm for RecordingSink {
    fn name(&self) -> &str {
        "RecordingSink"
    }

    fn ports(&self) -> &[PortDescriptor] {
        ANY_SINK
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let points = ctx.required_input(0)?.num_points();
        self.seen.lock().unwrap().push(points);
        Ok(())
    }
}

/// Image filter whose update-extent hook rejects every request.
pub struct RefusingFilter;

impl Algorithm for RefusingFilter {
    fn name(&self) -> &str {
        "RefusingFilter"
    }

    fn ports(&self) -> &[PortDescriptor] {
        IMAGE_FILTER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            information: false,
            update_extent: true,
            executes: true,
        }
    }

    fn request_update_extent(&mut self, _ctx: &mut UpdateExtentContext) -> PipelineResult<()> {
        Err(PipelineError::UnsupportedData("no request accepted".to_string()))
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let input = ctx.required_input(0)?.clone();
        ctx.set_output(0, input);
        Ok(())
    }
}

/// Source whose declared whole extent is empty.
pub struct BrokenSource;

impl Algorithm for BrokenSource {
    fn name(&self) -> &str {
        "BrokenSource"
    }

    fn ports(&self) -> &[PortDescriptor] {
        IMAGE_SOURCE
    }

    fn request_information(&mut self, ctx: &mut InformationContext) -> PipelineResult<()> {
        ctx.output_mut(0).set_whole_extent(Extent::EMPTY);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        ctx.set_output(0, DataSet::Image(ImageData::new(Extent::EMPTY)));
        Ok(())
    }
}

pub fn wavelet(whole: Extent) -> BuiltinNode {
    BuiltinNode::WaveletSource(WaveletSourceNode::new().with_whole_extent(whole))
}

pub fn voi(extent: Extent) -> BuiltinNode {
    BuiltinNode::ExtractVoi(ExtractVoiNode::new(extent))
}

pub fn image_to_points() -> BuiltinNode {
    BuiltinNode::ImageToPoints(ImageToPointsNode::new())
}

pub fn append() -> BuiltinNode {
    BuiltinNode::AppendPolyData(AppendPolyDataNode::new())
}

pub fn point_cloud(n: u32) -> BuiltinNode {
    BuiltinNode::PointCloudSource(PointCloudSourceNode::new(n).with_seed(7))
}

pub fn crop(log: &RequestLog) -> AnyNode {
    AnyNode::plugin(CropFilter::new(log.clone()))
}

/// wavelet -> crop, returning (pipeline, source, crop, log)
pub fn source_and_crop(whole: Extent, config: ExecutiveConfig) -> (Pipeline, NodeId, NodeId, RequestLog) {
    let mut pipeline = Pipeline::new(config);
    let log = request_log();
    let source = pipeline.add_node(wavelet(whole));
    let filter = pipeline.add_node(crop(&log));
    pipeline.connect_nodes(source, filter).unwrap();
    (pipeline, source, filter, log)
}
