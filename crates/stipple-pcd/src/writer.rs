//! PCD writer
//!
//! Writes `x y z` and, when the dataset has colours, a packed unsigned `rgb`
//! field using the numeric packing `r + g * 256 + b * 65536`.

use std::fmt::Write as _;

use stipple_core::PointCloudDataset;

use crate::error::{DecodeError, DecodeResult};
use crate::header::{DataEncoding, FieldType, PcdHeader};
use crate::lzf;

/// Build the header describing a dataset
pub fn header_for(dataset: &PointCloudDataset, encoding: DataEncoding) -> PcdHeader {
    let mut fields = vec!["x".to_string(), "y".to_string(), "z".to_string()];
    let mut types = vec![FieldType::Float; 3];
    if dataset.has_colors() {
        fields.push("rgb".to_string());
        types.push(FieldType::Unsigned);
    }
    let n = fields.len();

    PcdHeader {
        version: "0.7".to_string(),
        fields,
        sizes: vec![4; n],
        types,
        counts: vec![1; n],
        width: dataset.len(),
        height: 1,
        viewpoint: PcdHeader::DEFAULT_VIEWPOINT,
        points: dataset.len(),
        data: encoding,
    }
}

/// Encode a dataset as a complete PCD file.
///
/// Empty datasets are refused since no decoder accepts a file without points.
pub fn encode(dataset: &PointCloudDataset, encoding: DataEncoding) -> DecodeResult<Vec<u8>> {
    if dataset.is_empty() {
        return Err(DecodeError::EmptyPointCloud);
    }
    let header = header_for(dataset, encoding);
    let mut bytes = header.to_text().into_bytes();

    match encoding {
        DataEncoding::Ascii => bytes.extend(ascii_body(dataset).into_bytes()),
        DataEncoding::Binary => bytes.extend(binary_body(dataset)),
        DataEncoding::BinaryCompressed => {
            let raw = binary_body(dataset);
            let compressed = lzf::compress(&raw);
            let prefix = |len: usize| {
                u32::try_from(len).map_err(|_| {
                    DecodeError::InvalidCompressionHeader(format!("{} bytes do not fit the size prefix", len))
                })
            };
            bytes.extend(prefix(compressed.len())?.to_le_bytes());
            bytes.extend(prefix(raw.len())?.to_le_bytes());
            bytes.extend(compressed);
        }
    }

    log::debug!(
        "Encoded {} points as {} ({} bytes)",
        dataset.len(),
        encoding,
        bytes.len()
    );
    Ok(bytes)
}

fn packed_rgb(rgb: [u8; 3]) -> u32 {
    rgb[0] as u32 | (rgb[1] as u32) << 8 | (rgb[2] as u32) << 16
}

fn ascii_body(dataset: &PointCloudDataset) -> String {
    let mut body = String::with_capacity(dataset.len() * 32);
    for (i, p) in dataset.points().iter().enumerate() {
        // Writing to a String cannot fail
        let _ = write!(body, "{} {} {}", p.x, p.y, p.z);
        if let Some(color) = dataset.colors().get(i) {
            let _ = write!(body, " {}", packed_rgb(color.to_rgb8()));
        }
        body.push('\n');
    }
    body
}

fn binary_body(dataset: &PointCloudDataset) -> Vec<u8> {
    let stride = if dataset.has_colors() { 16 } else { 12 };
    let mut body = Vec::with_capacity(dataset.len() * stride);
    for (i, p) in dataset.points().iter().enumerate() {
        body.extend(p.x.to_le_bytes());
        body.extend(p.y.to_le_bytes());
        body.extend(p.z.to_le_bytes());
        if let Some(color) = dataset.colors().get(i) {
            body.extend(packed_rgb(color.to_rgb8()).to_le_bytes());
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use glam::Vec3;
    use stipple_core::Color;

    fn sample(with_colors: bool) -> PointCloudDataset {
        let points: Vec<Vec3> = (0..500)
            .map(|i| Vec3::new(i as f32 * 0.1, (i % 7) as f32 - 3.5, -(i as f32) / 3.0))
            .collect();
        let colors = if with_colors {
            (0..500)
                .map(|i| Color::from_rgb8(i as u8, (i * 3) as u8, 200))
                .collect()
        } else {
            Vec::new()
        };
        PointCloudDataset::new(points, colors).unwrap()
    }

    #[test]
    fn test_every_encoding_decodes_to_the_same_points() {
        let dataset = sample(true);
        for encoding in [DataEncoding::Ascii, DataEncoding::Binary, DataEncoding::BinaryCompressed] {
            let decoded = decode(&encode(&dataset, encoding).unwrap()).unwrap();
            assert_eq!(decoded.points(), dataset.points(), "{}", encoding);
            assert_eq!(decoded.colors(), dataset.colors(), "{}", encoding);
        }
    }

    #[test]
    fn test_header_without_colors() {
        let dataset = sample(false);
        let header = header_for(&dataset, DataEncoding::Binary);
        assert_eq!(header.fields, vec!["x", "y", "z"]);
        assert_eq!(header.points, 500);

        let (parsed, _) = PcdHeader::parse(&encode(&dataset, DataEncoding::Binary).unwrap()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_empty_dataset_is_refused() {
        let empty = PointCloudDataset::new(Vec::new(), Vec::new()).unwrap();
        for encoding in [DataEncoding::Ascii, DataEncoding::Binary, DataEncoding::BinaryCompressed] {
            assert_eq!(encode(&empty, encoding), Err(DecodeError::EmptyPointCloud));
        }
    }

    #[test]
    fn test_packed_rgb_layout() {
        assert_eq!(packed_rgb([10, 20, 30]), 10 + 20 * 256 + 30 * 65_536);
    }
}
