//! PieceReaderNode: reads a partitioned dataset back through its manifest.
//!
//! The information pass only touches the manifest. Execution loads just the
//! fragments the current request needs and merges them.

use super::assign;
use crate::pipeline::data::{DataArray, DataKind, DataSet, ImageData, PolyData};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::Extent;
use crate::pipeline::io::manifest::{fragments_for, Fragment, PieceManifest};
use crate::pipeline::node::{Algorithm, Capabilities, ExecuteContext, InformationContext};
use crate::pipeline::param::{invalid, ConfigValue};
use crate::pipeline::port::{PortDescriptor, PortKind};
use std::path::{Path, PathBuf};

static PORTS: &[PortDescriptor] = &[PortDescriptor::output("out", PortKind::Any)];

pub struct PieceReaderNode {
    manifest_path: PathBuf,
    manifest: Option<PieceManifest>,
}

impl PieceReaderNode {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            manifest: None,
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Manifest read by the last information pass.
    pub fn manifest(&self) -> Option<&PieceManifest> {
        self.manifest.as_ref()
    }

    fn load_fragments(&self, manifest: &PieceManifest, indices: &[usize]) -> PipelineResult<Vec<Fragment>> {
        indices
            .iter()
            .map(|&i| {
                let path = PieceManifest::fragment_path(&self.manifest_path, &manifest.fragments[i]);
                tracing::debug!("Reading fragment {}", path.display());
                Fragment::load(&path)
            })
            .collect()
    }
}

/// Copy every fragment's points that fall inside `target` into one image.
fn assemble_image(manifest: &PieceManifest, fragments: &[Fragment], target: Extent) -> PipelineResult<ImageData> {
    let mut image = ImageData::new(target);
    image.origin = manifest.origin;
    image.spacing = manifest.spacing;
    let n = target.num_points();

    for fragment in fragments {
        let src = fragment.data.as_image().ok_or_else(|| {
            PipelineError::UnsupportedData(format!(
                "fragment {} holds {} data in an image manifest",
                fragment.piece,
                fragment.data.kind()
            ))
        })?;
        let overlap = src.extent.intersection(&target);
        for array in &src.point_data {
            let c = array.components as usize;
            let pos = match image.point_data.iter().position(|a| a.name == array.name) {
                Some(pos) => pos,
                None => {
                    image.point_data.push(DataArray {
                        name: array.name.clone(),
                        components: array.components,
                        values: vec![0.0; n * c],
                    });
                    image.point_data.len() - 1
                }
            };
            let dst = &mut image.point_data[pos];
            for ijk in overlap.iter_points() {
                if let (Some(s), Some(d)) = (src.extent.point_index(ijk), target.point_index(ijk)) {
                    dst.values[d * c..(d + 1) * c].copy_from_slice(&array.values[s * c..(s + 1) * c]);
                }
            }
        }
    }
    Ok(image)
}

impl Algorithm for PieceReaderNode {
    fn name(&self) -> &str {
        "PieceReader"
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
        let manifest = PieceManifest::load(&self.manifest_path)?;
        let out = ctx.output_mut(0);
        out.set_data_kind(manifest.data_kind);
        if let Some(whole) = manifest.whole_extent {
            out.set_whole_extent(whole);
        }
        out.set_geometry(manifest.origin, manifest.spacing);
        out.set_number_of_pieces(manifest.number_of_pieces);
        out.set_max_ghost_level(manifest.ghost_level);
        out.set_time_steps(manifest.time_steps.clone());
        self.manifest = Some(manifest);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let Some(manifest) = self.manifest.as_ref() else {
            return Err(PipelineError::PassOrder(
                "piece reader executed before reading its manifest".to_string(),
            ));
        };
        let request = ctx.request(0);
        let indices = fragments_for(manifest, &request)?;
        let fragments = self.load_fragments(manifest, &indices)?;
        tracing::debug!(
            "PieceReader merging {} of {} fragments",
            fragments.len(),
            manifest.fragments.len()
        );

        let data = match manifest.data_kind {
            DataKind::Image => {
                let whole = manifest.whole_extent.unwrap_or(Extent::EMPTY);
                let target = request.extent.unwrap_or(whole).intersection(&whole);
                DataSet::Image(assemble_image(manifest, &fragments, target)?)
            }
            DataKind::Poly => {
                let mut poly = PolyData::new();
                for fragment in &fragments {
                    let part = fragment.data.as_poly().ok_or_else(|| {
                        PipelineError::UnsupportedData(format!(
                            "fragment {} holds {} data in a poly manifest",
                            fragment.piece,
                            fragment.data.kind()
                        ))
                    })?;
                    poly.append(part);
                }
                DataSet::Poly(poly)
            }
        };
        ctx.set_output(0, data);
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            "manifest" => {
                let v = value.as_str().ok_or_else(|| invalid(key, "a path", value))?;
                let changed = assign(&mut self.manifest_path, PathBuf::from(v));
                if changed {
                    self.manifest = None;
                }
                Ok(changed)
            }
            _ => Err(PipelineError::UnknownParameter {
                node: self.name().to_string(),
                key: key.to_string(),
            }),
        }
    }
}
