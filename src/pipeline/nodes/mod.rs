//! Built-in pipeline node implementations.

pub mod append_poly_data;
pub mod array_scale;
pub mod extract_voi;
pub mod image_to_points;
pub mod piece_reader;
pub mod point_cloud_source;
pub mod wavelet_source;

pub use append_poly_data::AppendPolyDataNode;
pub use array_scale::ArrayScaleNode;
pub use extract_voi::ExtractVoiNode;
pub use image_to_points::ImageToPointsNode;
pub use piece_reader::PieceReaderNode;
pub use point_cloud_source::PointCloudSourceNode;
pub use wavelet_source::WaveletSourceNode;

/// Store `value` in `field`, reporting whether it differed.
pub(crate) fn assign<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        false
    } else {
        *field = value;
        true
    }
}
