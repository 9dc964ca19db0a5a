//! Parallel piece writer.
//!
//! A writer owns a contiguous range of pieces out of a fixed decomposition.
//! For each owned piece it requests that piece from the pipeline, updates,
//! and hands the result to a [`FragmentSink`] before moving to the next
//! piece. Separate processes may run writers over disjoint ranges; the one
//! owning piece 0 also records the manifest for the whole decomposition.

use crate::pipeline::data::{DataKind, DataSet};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::events::PipelineEvent;
use crate::pipeline::executive::Pipeline;
use crate::pipeline::extent::PieceRequest;
use crate::pipeline::id::NodeId;
use crate::pipeline::information::UpdateRequest;
use crate::pipeline::io::manifest::{Fragment, FragmentRecord, PieceManifest};
use crate::pipeline::translator::compute_local_extent_with_ghosts;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Destination for serialized pieces.
pub trait FragmentSink {
    /// Name the fragment of `piece` is stored under, relative to the manifest.
    fn fragment_name(&self, piece: u32) -> String;

    fn write_fragment(&mut self, fragment: &Fragment) -> PipelineResult<()>;

    fn write_manifest(&mut self, manifest: &PieceManifest) -> PipelineResult<()>;
}

/// Writes `<prefix>_<piece:04>.json` fragments and `<prefix>.manifest.json` into a directory.
pub struct DirectorySink {
    dir: PathBuf,
    prefix: String,
}

impl DirectorySink {
    /// Creates `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> PipelineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::Io(format!("{}: {}", dir.display(), e)))?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}.manifest.json", self.prefix))
    }
}

impl FragmentSink for DirectorySink {
    fn fragment_name(&self, piece: u32) -> String {
        format!("{}_{:04}.json", self.prefix, piece)
    }

    fn write_fragment(&mut self, fragment: &Fragment) -> PipelineResult<()> {
        let path = self.dir.join(self.fragment_name(fragment.piece.piece));
        tracing::debug!("Writing fragment {}", path.display());
        fragment.save(&path)
    }

    fn write_manifest(&mut self, manifest: &PieceManifest) -> PipelineResult<()> {
        let path = self.manifest_path();
        tracing::info!("Writing manifest {}", path.display());
        manifest.save(&path)
    }
}

/// Keeps everything in memory.
#[derive(Default)]
pub struct MemorySink {
    pub fragments: Vec<Fragment>,
    pub manifest: Option<PieceManifest>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FragmentSink for MemorySink {
    fn fragment_name(&self, piece: u32) -> String {
        format!("piece_{:04}", piece)
    }

    fn write_fragment(&mut self, fragment: &Fragment) -> PipelineResult<()> {
        self.fragments.push(fragment.clone());
        Ok(())
    }

    fn write_manifest(&mut self, manifest: &PieceManifest) -> PipelineResult<()> {
        self.manifest = Some(manifest.clone());
        Ok(())
    }
}

/// What a writer produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    /// Records of the pieces this writer wrote, in piece order.
    pub written: Vec<FragmentRecord>,
    /// Set when this writer owned piece 0.
    pub manifest: Option<PieceManifest>,
}

impl WriteSummary {
    pub fn total_points(&self) -> usize {
        self.written.iter().filter_map(|r| r.num_points).sum()
    }

    pub fn total_cells(&self) -> usize {
        self.written.iter().filter_map(|r| r.num_cells).sum()
    }
}

/// Sequential writer over pieces `start_piece..=end_piece` of `number_of_pieces`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelPieceWriter {
    start_piece: u32,
    end_piece: u32,
    number_of_pieces: u32,
    ghost_level: u32,
    time: Option<f64>,
}

impl ParallelPieceWriter {
    pub fn new(start_piece: u32, end_piece: u32, number_of_pieces: u32) -> PipelineResult<Self> {
        if number_of_pieces == 0 {
            return Err(PipelineError::InvalidArgument(
                "number of pieces must be at least 1".to_string(),
            ));
        }
        if start_piece > end_piece || end_piece >= number_of_pieces {
            return Err(PipelineError::InvalidArgument(format!(
                "piece range {}..={} invalid for {} pieces",
                start_piece, end_piece, number_of_pieces
            )));
        }
        Ok(Self {
            start_piece,
            end_piece,
            number_of_pieces,
            ghost_level: 0,
            time: None,
        })
    }

    /// Writer owning every piece.
    pub fn all(number_of_pieces: u32) -> PipelineResult<Self> {
        Self::new(0, number_of_pieces.saturating_sub(1), number_of_pieces)
    }

    pub fn with_ghost_level(mut self, ghost_level: u32) -> Self {
        self.ghost_level = ghost_level;
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn pieces(&self) -> RangeInclusive<u32> {
        self.start_piece..=self.end_piece
    }

    pub fn number_of_pieces(&self) -> u32 {
        self.number_of_pieces
    }

    pub fn owns_first_piece(&self) -> bool {
        self.start_piece == 0
    }

    /// Write every owned piece of output port 0 of `node`.
    ///
    /// Stops at the first failing piece; earlier fragments stay written.
    pub fn write(
        &self,
        pipeline: &mut Pipeline,
        node: NodeId,
        sink: &mut dyn FragmentSink,
    ) -> PipelineResult<WriteSummary> {
        let port = node.output(0);
        let mut written = Vec::new();

        for p in self.pieces() {
            let piece = PieceRequest::new(p, self.number_of_pieces)?.with_ghost_level(self.ghost_level);
            let mut request = UpdateRequest::for_piece(piece);
            request.time = self.time;
            pipeline.set_update_request(node, request)?;
            pipeline.update(node)?;

            let data = pipeline.output(port).ok_or_else(|| PipelineError::Execution {
                node_id: node,
                message: format!("no output for piece {}", p),
            })?;
            let resolved = pipeline
                .information(port)
                .and_then(|info| info.requested())
                .copied()
                .unwrap_or(request);
            let data = match (data.as_ref(), resolved.extent) {
                // A cached superset is cut down to this piece.
                (DataSet::Image(image), Some(extent)) if image.extent != extent => {
                    DataSet::Image(image.extract(&extent))
                }
                _ => (*data).clone(),
            };

            let fragment = Fragment {
                piece,
                time: resolved.time,
                data,
            };
            sink.write_fragment(&fragment)?;
            tracing::info!(
                "Wrote piece {}/{}: {} points, {} cells",
                p,
                self.number_of_pieces,
                fragment.num_points(),
                fragment.num_cells()
            );
            pipeline.publish(PipelineEvent::PieceWritten {
                piece: p,
                num_points: fragment.num_points(),
                num_cells: fragment.num_cells(),
            });
            written.push(FragmentRecord {
                piece: p,
                file: sink.fragment_name(p),
                extent: fragment.extent(),
                num_points: Some(fragment.num_points()),
                num_cells: Some(fragment.num_cells()),
            });
        }

        let manifest = if self.owns_first_piece() {
            let manifest = self.manifest(pipeline, node, &written, &*sink)?;
            sink.write_manifest(&manifest)?;
            Some(manifest)
        } else {
            None
        };
        Ok(WriteSummary { written, manifest })
    }

    /// Manifest for the full decomposition; pieces written elsewhere get predicted extents.
    fn manifest(
        &self,
        pipeline: &Pipeline,
        node: NodeId,
        written: &[FragmentRecord],
        sink: &dyn FragmentSink,
    ) -> PipelineResult<PieceManifest> {
        let info = pipeline
            .information(node.output(0))
            .ok_or(PipelineError::UnknownNode(node))?;
        let kind = info.data_kind().unwrap_or(DataKind::Poly);
        let mut manifest = PieceManifest::new(kind, self.number_of_pieces);
        manifest.ghost_level = self.ghost_level;
        manifest.time_steps = self.time.map(|t| info.snap_time(t)).into_iter().collect();
        if kind == DataKind::Image {
            manifest.whole_extent = info.whole_extent();
            manifest.origin = info.origin();
            manifest.spacing = info.spacing();
        }

        let split = pipeline.config().split_mode;
        for p in 0..self.number_of_pieces {
            if let Some(record) = written.iter().find(|r| r.piece == p) {
                manifest.fragments.push(record.clone());
                continue;
            }
            let extent = match manifest.whole_extent {
                Some(whole) if kind == DataKind::Image => Some(compute_local_extent_with_ghosts(
                    &whole,
                    self.number_of_pieces,
                    p,
                    self.ghost_level,
                    split,
                )?),
                _ => None,
            };
            manifest.fragments.push(FragmentRecord {
                piece: p,
                file: sink.fragment_name(p),
                extent,
                num_points: None,
                num_cells: None,
            });
        }
        Ok(manifest)
    }
}
