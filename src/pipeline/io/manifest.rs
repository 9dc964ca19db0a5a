//! Piece manifests and fragment files.
//!
//! A parallel write produces one fragment per piece plus a manifest listing
//! every fragment of the decomposition. Readers use the manifest alone to
//! answer the information pass and to decide which fragments a request needs.

use crate::pipeline::data::{DataKind, DataSet};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::{Extent, PieceRequest};
use crate::pipeline::information::UpdateRequest;
use crate::pipeline::translator::compute_piece_range;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// One serialized piece: the data plus the request it was produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub piece: PieceRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    pub data: DataSet,
}

impl Fragment {
    pub fn num_points(&self) -> usize {
        self.data.num_points()
    }

    pub fn num_cells(&self) -> usize {
        self.data.num_cells()
    }

    /// Structured extent covered by this fragment, if it holds image data.
    pub fn extent(&self) -> Option<Extent> {
        self.data.as_image().map(|img| img.extent)
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Io(format!("{}: {}", path.display(), e)))?;
        let fragment: Fragment = serde_json::from_str(&json)
            .map_err(|e| PipelineError::Serialization(format!("{}: {}", path.display(), e)))?;
        fragment.data.validate().map_err(|e| {
            PipelineError::Serialization(format!("{}: {}", path.display(), e))
        })?;
        Ok(fragment)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .map_err(|e| PipelineError::Io(format!("{}: {}", path.display(), e)))
    }
}

/// Manifest entry for one piece.
///
/// Counts are `None` for pieces this process did not write itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub piece: u32,
    /// Path relative to the manifest's directory.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,
    #[serde(default)]
    pub num_points: Option<usize>,
    #[serde(default)]
    pub num_cells: Option<usize>,
}

/// Summary of a partitioned dataset on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceManifest {
    pub version: u32,
    pub data_kind: DataKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whole_extent: Option<Extent>,
    #[serde(default = "default_origin")]
    pub origin: [f64; 3],
    #[serde(default = "default_spacing")]
    pub spacing: [f64; 3],
    pub number_of_pieces: u32,
    #[serde(default)]
    pub ghost_level: u32,
    #[serde(default)]
    pub time_steps: Vec<f64>,
    pub created_at: DateTime<Utc>,
    pub fragments: Vec<FragmentRecord>,
}

fn default_origin() -> [f64; 3] {
    [0.0; 3]
}

fn default_spacing() -> [f64; 3] {
    [1.0; 3]
}

impl PieceManifest {
    pub fn new(data_kind: DataKind, number_of_pieces: u32) -> Self {
        Self {
            version: MANIFEST_VERSION,
            data_kind,
            whole_extent: None,
            origin: default_origin(),
            spacing: default_spacing(),
            number_of_pieces,
            ghost_level: 0,
            time_steps: Vec::new(),
            created_at: Utc::now(),
            fragments: Vec::new(),
        }
    }

    /// Check internal consistency after loading.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.version > MANIFEST_VERSION {
            return Err(PipelineError::Serialization(format!(
                "manifest version {} is newer than supported version {}",
                self.version, MANIFEST_VERSION
            )));
        }
        if self.number_of_pieces == 0 {
            return Err(PipelineError::InvalidArgument(
                "manifest lists zero pieces".to_string(),
            ));
        }
        if self.fragments.len() != self.number_of_pieces as usize {
            return Err(PipelineError::InvalidArgument(format!(
                "manifest declares {} pieces but lists {} fragments",
                self.number_of_pieces,
                self.fragments.len()
            )));
        }
        if self.data_kind == DataKind::Image {
            let whole = self.whole_extent.ok_or_else(|| {
                PipelineError::InvalidArgument("image manifest has no whole extent".to_string())
            })?;
            whole.validate()?;
            if let Some(bad) = self
                .fragments
                .iter()
                .find(|f| f.extent.map_or(true, |e| !whole.contains(&e)))
            {
                return Err(PipelineError::InvalidArgument(format!(
                    "fragment {} lies outside whole extent {}",
                    bad.piece, whole
                )));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Io(format!("{}: {}", path.display(), e)))?;
        let manifest: PieceManifest = serde_json::from_str(&json)
            .map_err(|e| PipelineError::Serialization(format!("{}: {}", path.display(), e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| PipelineError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Location of `record`'s file for a manifest stored at `manifest_path`.
    pub fn fragment_path(manifest_path: &Path, record: &FragmentRecord) -> PathBuf {
        match manifest_path.parent() {
            Some(dir) => dir.join(&record.file),
            None => PathBuf::from(&record.file),
        }
    }

    pub fn total_points(&self) -> Option<usize> {
        self.fragments.iter().map(|f| f.num_points).sum()
    }

    pub fn total_cells(&self) -> Option<usize> {
        self.fragments.iter().map(|f| f.num_cells).sum()
    }
}

/// Indices into `manifest.fragments` that a request needs.
///
/// Image requests select fragments whose extent intersects the requested
/// extent (the whole extent when unrestricted). Poly requests divide the
/// fragment list among the requested pieces the same way a source divides
/// its points, so every fragment is read by exactly one piece.
pub fn fragments_for(manifest: &PieceManifest, request: &UpdateRequest) -> PipelineResult<Vec<usize>> {
    match manifest.data_kind {
        DataKind::Image => {
            let whole = manifest.whole_extent.unwrap_or(Extent::EMPTY);
            let wanted = request.extent.unwrap_or(whole);
            Ok(manifest
                .fragments
                .iter()
                .enumerate()
                .filter(|(_, f)| f.extent.is_some_and(|e| e.intersects(&wanted)))
                .map(|(i, _)| i)
                .collect())
        }
        DataKind::Poly => {
            let piece = request.piece.unwrap_or(PieceRequest::WHOLE);
            let range = compute_piece_range(
                manifest.fragments.len() as u32,
                piece.num_pieces,
                piece.piece,
            )?;
            Ok(range.map(|i| i as usize).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::data::{DataArray, ImageData};

    fn image_manifest() -> PieceManifest {
        let mut m = PieceManifest::new(DataKind::Image, 4);
        m.whole_extent = Some(Extent::new(0, 31, 0, 31, 0, 31));
        for (p, z) in [(0, 0), (1, 8), (2, 16), (3, 24)] {
            m.fragments.push(FragmentRecord {
                piece: p,
                file: format!("out_{:04}.json", p),
                extent: Some(Extent::new(0, 31, 0, 31, z, z + 7)),
                num_points: Some(32 * 32 * 8),
                num_cells: None,
            });
        }
        m
    }

    #[test]
    fn test_image_request_selects_intersecting_fragments() {
        let m = image_manifest();
        let request = UpdateRequest::for_extent(Extent::new(0, 31, 0, 31, 6, 17));
        assert_eq!(fragments_for(&m, &request).unwrap(), vec![0, 1, 2]);
        assert_eq!(fragments_for(&m, &UpdateRequest::whole()).unwrap().len(), 4);
    }

    #[test]
    fn test_poly_pieces_split_fragment_list() {
        let mut m = PieceManifest::new(DataKind::Poly, 4);
        for p in 0..4 {
            m.fragments.push(FragmentRecord {
                piece: p,
                file: format!("out_{:04}.json", p),
                extent: None,
                num_points: Some(10),
                num_cells: Some(10),
            });
        }
        let half = |p| UpdateRequest::for_piece(PieceRequest::new(p, 2).unwrap());
        assert_eq!(fragments_for(&m, &half(0)).unwrap(), vec![0, 1]);
        assert_eq!(fragments_for(&m, &half(1)).unwrap(), vec![2, 3]);
        assert_eq!(m.total_points(), Some(40));
    }

    #[test]
    fn test_validate_rejects_missing_fragments() {
        let mut m = image_manifest();
        m.fragments.pop();
        assert!(m.validate().is_err());
        assert!(image_manifest().validate().is_ok());
    }

    fn write_json(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("fragment.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_fragment_load_rejects_short_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = ImageData::new(Extent::new(0, 3, 0, 0, 0, 0));
        image.point_data.push(DataArray::scalars("RTData", vec![1.0]));
        let fragment = Fragment {
            piece: PieceRequest::WHOLE,
            time: None,
            data: DataSet::Image(image),
        };
        let path = dir.path().join("short.json");
        fragment.save(&path).unwrap();

        let err = Fragment::load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Serialization(_)));
        assert!(err.to_string().contains("RTData"));
    }

    #[test]
    fn test_fragment_load_rejects_bad_piece() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            dir.path(),
            r#"{"piece":{"piece":5,"num_pieces":2},"data":{"type":"poly","points":[]}}"#,
        );
        assert!(matches!(
            Fragment::load(&path),
            Err(PipelineError::Serialization(_))
        ));
    }

    #[test]
    fn test_fragment_path_is_relative_to_manifest() {
        let m = image_manifest();
        let path = PieceManifest::fragment_path(Path::new("/data/run/out.manifest.json"), &m.fragments[2]);
        assert_eq!(path, PathBuf::from("/data/run/out_0002.json"));
    }
}
