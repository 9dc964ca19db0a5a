//! Dataset payloads carried between nodes.
//!
//! Outputs are published as `Arc<DataSet>` and never mutated afterwards;
//! a re-execution replaces the `Arc` instead of writing through it.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::Extent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which family of dataset a port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Structured, addressed by extents.
    Image,
    /// Unstructured, addressed by pieces.
    Poly,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Image => f.write_str("image"),
            DataKind::Poly => f.write_str("poly"),
        }
    }
}

/// A named attribute array with `components` values per tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArray {
    pub name: String,
    pub components: u8,
    pub values: Vec<f64>,
}

impl DataArray {
    pub fn scalars(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            components: 1,
            values,
        }
    }

    pub fn num_tuples(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.values.len() / self.components as usize
        }
    }

    /// Check that the array holds exactly `tuples` tuples.
    pub fn check_tuples(&self, tuples: usize) -> PipelineResult<()> {
        let expected = tuples * self.components as usize;
        if self.components == 0 || self.values.len() != expected {
            return Err(PipelineError::UnsupportedData(format!(
                "array '{}' has {} values, expected {} ({} tuples of {} components)",
                self.name,
                self.values.len(),
                expected,
                tuples,
                self.components
            )));
        }
        Ok(())
    }

    pub fn tuple(&self, index: usize) -> &[f64] {
        let c = self.components as usize;
        &self.values[index * c..(index + 1) * c]
    }

    /// Min and max over all values, `None` when empty.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.values.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// Regular grid over an extent with per-point arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub extent: Extent,
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    #[serde(default)]
    pub point_data: Vec<DataArray>,
}

impl ImageData {
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            origin: [0.0; 3],
            spacing: [1.0; 3],
            point_data: Vec::new(),
        }
    }

    /// World coordinates of index `ijk`.
    pub fn point_coordinates(&self, ijk: [i32; 3]) -> [f64; 3] {
        [
            self.origin[0] + self.spacing[0] * ijk[0] as f64,
            self.origin[1] + self.spacing[1] * ijk[1] as f64,
            self.origin[2] + self.spacing[2] * ijk[2] as f64,
        ]
    }

    /// Copy of the points inside `sub` (clipped to this image's extent).
    pub fn extract(&self, sub: &Extent) -> ImageData {
        let target = self.extent.intersection(sub);
        let mut out = ImageData {
            extent: target,
            origin: self.origin,
            spacing: self.spacing,
            point_data: Vec::with_capacity(self.point_data.len()),
        };
        for array in &self.point_data {
            let c = array.components as usize;
            let mut values = Vec::with_capacity(target.num_points() * c);
            for ijk in target.iter_points() {
                if let Some(idx) = self.extent.point_index(ijk) {
                    values.extend_from_slice(&array.values[idx * c..(idx + 1) * c]);
                }
            }
            out.point_data.push(DataArray {
                name: array.name.clone(),
                components: array.components,
                values,
            });
        }
        out
    }
}

/// Points with vertex and polygon cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolyData {
    pub points: Vec<[f64; 3]>,
    #[serde(default)]
    pub verts: Vec<u32>,
    #[serde(default)]
    pub polys: Vec<Vec<u32>>,
    #[serde(default)]
    pub point_data: Vec<DataArray>,
    #[serde(default)]
    pub cell_data: Vec<DataArray>,
}

impl PolyData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_cells(&self) -> usize {
        self.verts.len() + self.polys.len()
    }

    /// Concatenate `other`, renumbering its cells. Arrays present in both are kept.
    pub fn append(&mut self, other: &PolyData) {
        let offset = self.points.len() as u32;
        let first = self.points.is_empty() && self.num_cells() == 0;

        self.points.extend_from_slice(&other.points);
        self.verts.extend(other.verts.iter().map(|v| v + offset));
        self.polys.extend(
            other
                .polys
                .iter()
                .map(|cell| cell.iter().map(|v| v + offset).collect::<Vec<_>>()),
        );

        if first {
            self.point_data = other.point_data.clone();
            self.cell_data = other.cell_data.clone();
        } else {
            merge_arrays(&mut self.point_data, &other.point_data);
            merge_arrays(&mut self.cell_data, &other.cell_data);
        }
    }
}

fn merge_arrays(into: &mut Vec<DataArray>, from: &[DataArray]) {
    into.retain(|a| from.iter().any(|b| b.name == a.name && b.components == a.components));
    for array in into.iter_mut() {
        if let Some(src) = from.iter().find(|b| b.name == array.name) {
            array.values.extend_from_slice(&src.values);
        }
    }
}

/// The concrete payload for one requested extent or piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSet {
    Image(ImageData),
    Poly(PolyData),
}

impl DataSet {
    pub fn kind(&self) -> DataKind {
        match self {
            DataSet::Image(_) => DataKind::Image,
            DataSet::Poly(_) => DataKind::Poly,
        }
    }

    pub fn num_points(&self) -> usize {
        match self {
            DataSet::Image(img) => img.extent.num_points(),
            DataSet::Poly(poly) => poly.points.len(),
        }
    }

    pub fn num_cells(&self) -> usize {
        match self {
            DataSet::Image(img) => img.extent.num_cells(),
            DataSet::Poly(poly) => poly.num_cells(),
        }
    }

    pub fn point_data(&self) -> &[DataArray] {
        match self {
            DataSet::Image(img) => &img.point_data,
            DataSet::Poly(poly) => &poly.point_data,
        }
    }

    pub fn point_data_mut(&mut self) -> &mut Vec<DataArray> {
        match self {
            DataSet::Image(img) => &mut img.point_data,
            DataSet::Poly(poly) => &mut poly.point_data,
        }
    }

    pub fn point_array(&self, name: &str) -> Option<&DataArray> {
        self.point_data().iter().find(|a| a.name == name)
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            DataSet::Image(img) => Some(img),
            DataSet::Poly(_) => None,
        }
    }

    pub fn as_poly(&self) -> Option<&PolyData> {
        match self {
            DataSet::Poly(poly) => Some(poly),
            DataSet::Image(_) => None,
        }
    }

    /// Check array lengths against the geometry and cell indices against the points.
    pub fn validate(&self) -> PipelineResult<()> {
        match self {
            DataSet::Image(img) => {
                let n = img.extent.num_points();
                img.point_data.iter().try_for_each(|a| a.check_tuples(n))
            }
            DataSet::Poly(poly) => {
                let n = poly.points.len();
                poly.point_data.iter().try_for_each(|a| a.check_tuples(n))?;
                poly.cell_data
                    .iter()
                    .try_for_each(|a| a.check_tuples(poly.num_cells()))?;
                let bad = poly
                    .verts
                    .iter()
                    .chain(poly.polys.iter().flatten())
                    .find(|&&v| v as usize >= n);
                match bad {
                    Some(v) => Err(PipelineError::UnsupportedData(format!(
                        "cell references point {} of {}",
                        v, n
                    ))),
                    None => Ok(()),
                }
            }
        }
    }

    /// An empty dataset of `kind`.
    pub fn empty(kind: DataKind) -> DataSet {
        match kind {
            DataKind::Image => DataSet::Image(ImageData::new(Extent::EMPTY)),
            DataKind::Poly => DataSet::Poly(PolyData::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(extent: Extent) -> ImageData {
        let mut img = ImageData::new(extent);
        let values = extent
            .iter_points()
            .map(|[i, j, k]| (i + 10 * j + 100 * k) as f64)
            .collect();
        img.point_data.push(DataArray::scalars("ramp", values));
        img
    }

    #[test]
    fn test_image_extract() {
        let img = ramp(Extent::new(0, 3, 0, 3, 0, 1));
        let sub = img.extract(&Extent::new(1, 2, 2, 3, 1, 1));
        assert_eq!(sub.extent.num_points(), 4);
        assert_eq!(sub.point_data[0].values, vec![121.0, 122.0, 131.0, 132.0]);
    }

    #[test]
    fn test_extract_clips_to_available() {
        let img = ramp(Extent::new(0, 3, 0, 3, 0, 0));
        let sub = img.extract(&Extent::new(2, 9, 0, 0, 0, 0));
        assert_eq!(sub.extent, Extent::new(2, 3, 0, 0, 0, 0));
        assert_eq!(sub.point_data[0].values.len(), 2);
    }

    #[test]
    fn test_poly_append_renumbers() {
        let mut a = PolyData::new();
        a.points = vec![[0.0; 3], [1.0, 0.0, 0.0]];
        a.verts = vec![0, 1];
        a.point_data.push(DataArray::scalars("s", vec![1.0, 2.0]));

        let mut b = PolyData::new();
        b.points = vec![[2.0, 0.0, 0.0]];
        b.verts = vec![0];
        b.polys = vec![vec![0, 0, 0]];
        b.point_data.push(DataArray::scalars("s", vec![3.0]));

        a.append(&b);
        assert_eq!(a.points.len(), 3);
        assert_eq!(a.verts, vec![0, 1, 2]);
        assert_eq!(a.polys, vec![vec![2, 2, 2]]);
        assert_eq!(a.point_data[0].values, vec![1.0, 2.0, 3.0]);
        assert_eq!(a.num_cells(), 4);
    }

    #[test]
    fn test_append_drops_unshared_arrays() {
        let mut a = PolyData::new();
        a.points = vec![[0.0; 3]];
        a.point_data.push(DataArray::scalars("only_a", vec![1.0]));
        let mut b = PolyData::new();
        b.points = vec![[1.0; 3]];
        a.append(&b);
        assert!(a.point_data.is_empty());
    }

    #[test]
    fn test_dataset_serde_is_tagged() {
        let ds = DataSet::Poly(PolyData::new());
        let json = serde_json::to_string(&ds).unwrap();
        assert!(json.contains("\"type\":\"poly\""));
        let back: DataSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), DataKind::Poly);
    }

    #[test]
    fn test_validate_array_lengths() {
        let extent = Extent::new(0, 3, 0, 0, 0, 0);
        assert!(DataSet::Image(ramp(extent)).validate().is_ok());

        let mut short = ImageData::new(extent);
        short.point_data.push(DataArray::scalars("s", vec![1.0]));
        assert!(matches!(
            DataSet::Image(short).validate(),
            Err(PipelineError::UnsupportedData(_))
        ));

        let mut poly = PolyData::new();
        poly.points = vec![[0.0; 3]; 2];
        poly.verts = vec![0, 2];
        assert!(DataSet::Poly(poly.clone()).validate().is_err());
        poly.verts = vec![0, 1];
        poly.point_data.push(DataArray::scalars("ids", vec![0.0, 1.0]));
        assert!(DataSet::Poly(poly).validate().is_ok());
    }

    #[test]
    fn test_array_range() {
        let a = DataArray::scalars("x", vec![3.0, -1.0, 7.5]);
        assert_eq!(a.range(), Some((-1.0, 7.5)));
        assert_eq!(DataArray::scalars("e", vec![]).range(), None);
    }
}
