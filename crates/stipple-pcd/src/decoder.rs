//! PCD body decoding
//!
//! Dispatches on the header's `DATA` encoding and produces a
//! [`PointCloudDataset`]. Invalid individual points are dropped and counted;
//! only file-level problems are errors.

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stipple_core::{Color, PointCloudDataset};

use crate::error::{DecodeError, DecodeResult};
use crate::header::{DataEncoding, FieldType, PcdHeader};
use crate::layout::{ColorSource, FieldLayout, FieldSpec};
use crate::lzf;

/// How a packed `rgb` field is unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackedColorMode {
    /// Treat the field as a number: r = `floor(v) & 0xff`,
    /// g = `floor(v / 256) & 0xff`, b = `floor(v / 65536) & 0xff`
    #[default]
    Numeric,
    /// Reinterpret the 32 field bits as `0x00RRGGBB`
    Bitcast,
}

/// Decoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Points with any coordinate of larger magnitude are dropped
    pub max_coordinate_magnitude: f32,
    /// Upper bound on the declared uncompressed size of a compressed body
    pub max_uncompressed_bytes: usize,
    /// Packed colour convention
    pub packed_color: PackedColorMode,
    /// Records decoded between progress reports
    pub progress_interval: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_coordinate_magnitude: 1e8,
            max_uncompressed_bytes: 1_000_000_000,
            packed_color: PackedColorMode::Numeric,
            progress_interval: 250_000,
        }
    }
}

/// Progress callback: `(percentage 0-100, message)`
pub type ProgressFn<'a> = dyn FnMut(f32, &str) + 'a;

const HEADER_DONE: f32 = 5.0;
const INFLATE_DONE: f32 = 20.0;
const BODY_DONE: f32 = 95.0;

/// PCD decoder
#[derive(Debug, Clone, Default)]
pub struct PcdDecoder {
    options: DecodeOptions,
}

impl PcdDecoder {
    /// Create a decoder with the given options
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    /// Get the decoder options
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decode a complete PCD file
    pub fn decode(&self, bytes: &[u8]) -> DecodeResult<PointCloudDataset> {
        self.decode_with_progress(bytes, &mut |_, _| {})
    }

    /// Decode a complete PCD file, reporting progress along the way
    pub fn decode_with_progress(
        &self,
        bytes: &[u8],
        progress: &mut ProgressFn<'_>,
    ) -> DecodeResult<PointCloudDataset> {
        let (header, body_offset) = PcdHeader::parse(bytes)?;
        let layout = FieldLayout::from_header(&header)?;
        let body = &bytes[body_offset..];

        log::debug!(
            "PCD v{} {} with {} points, fields [{}], stride {}",
            header.version,
            header.data,
            header.points,
            header.fields.join(" "),
            layout.stride()
        );
        progress(HEADER_DONE, "Header parsed");

        let has_color = layout.color_source() != ColorSource::None;
        let mut sink;
        match header.data {
            DataEncoding::Ascii => {
                // Each token takes at least one byte plus a separator
                let line_bytes = layout.tokens_per_record().saturating_mul(2);
                sink = PointSink::new(has_color, reservation(header.points, body.len(), line_bytes));
                self.read_ascii(&header, &layout, body, &mut sink, progress, HEADER_DONE);
            }
            DataEncoding::Binary => {
                sink = PointSink::new(has_color, reservation(header.points, body.len(), layout.stride()));
                self.read_binary(&header, &layout, body, &mut sink, progress, HEADER_DONE)?;
            }
            DataEncoding::BinaryCompressed => {
                let inflated = self.inflate(body)?;
                progress(INFLATE_DONE, "Decompressed");
                sink = PointSink::new(has_color, reservation(header.points, inflated.len(), layout.stride()));
                self.read_binary(&header, &layout, &inflated, &mut sink, progress, INFLATE_DONE)?;
            }
        }

        let dataset = sink.finish()?;
        if dataset.skipped_points() > 0 {
            log::warn!("Skipped {} invalid points", dataset.skipped_points());
        }
        progress(100.0, "Decoded");
        Ok(dataset)
    }

    fn read_ascii(
        &self,
        header: &PcdHeader,
        layout: &FieldLayout,
        body: &[u8],
        sink: &mut PointSink,
        progress: &mut ProgressFn<'_>,
        start: f32,
    ) {
        let text = String::from_utf8_lossy(body);
        let [x, y, z] = layout.axes().map(|f| f.token_index);
        let interval = self.options.progress_interval.max(1);
        let mut tokens: Vec<&str> = Vec::with_capacity(layout.tokens_per_record().min(64));
        let mut lines = 0usize;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tokens.clear();
            tokens.extend(line.split_whitespace());
            lines += 1;

            let coordinate = |index: usize| tokens.get(index).and_then(|t| t.parse::<f64>().ok());
            let point = match (coordinate(x), coordinate(y), coordinate(z)) {
                (Some(x), Some(y), Some(z)) => self.accept(x, y, z),
                _ => None,
            };

            let color = point.filter(|_| sink.has_color).map(|_| self.token_color(layout, &tokens));
            sink.push(point, color);

            if lines % interval == 0 {
                progress(span(start, lines, header.points), "Reading ASCII points");
            }
        }
    }

    fn read_binary(
        &self,
        header: &PcdHeader,
        layout: &FieldLayout,
        body: &[u8],
        sink: &mut PointSink,
        progress: &mut ProgressFn<'_>,
        start: f32,
    ) -> DecodeResult<()> {
        let stride = layout.stride();
        if header.points == 0 {
            return Ok(());
        }

        let readable = body.len() / stride.max(1);
        if readable == 0 {
            return Err(DecodeError::TruncatedBinaryData {
                stride,
                available: body.len(),
            });
        }

        let count = header.points.min(readable);
        if count < header.points {
            log::warn!(
                "Body holds {} of {} declared points, reading what is available",
                count,
                header.points
            );
        }

        let with_color = sink.has_color;
        let batch = self.options.progress_interval.max(1).saturating_mul(stride);
        let mut done = 0;
        for records in body[..count * stride].chunks(batch) {
            let decoded: Vec<(Option<Vec3>, Option<Color>)> = records
                .par_chunks_exact(stride)
                .map(|record| self.decode_record(layout, record, with_color))
                .collect();
            done += decoded.len();
            for (point, color) in decoded {
                sink.push(point, color);
            }
            progress(span(start, done, count), "Reading binary points");
        }

        Ok(())
    }

    fn decode_record(
        &self,
        layout: &FieldLayout,
        record: &[u8],
        with_color: bool,
    ) -> (Option<Vec3>, Option<Color>) {
        let [x, y, z] = layout.axes().map(|f| f.read(record, 0));
        let point = self.accept(x, y, z);
        let color = point
            .filter(|_| with_color)
            .map(|_| self.record_color(layout, record));
        (point, color)
    }

    /// Split the size prefix off a compressed body and inflate it
    fn inflate(&self, body: &[u8]) -> DecodeResult<Vec<u8>> {
        if body.len() < 8 {
            return Err(DecodeError::InvalidCompressionHeader(format!(
                "body is {} bytes, too short for the size prefix",
                body.len()
            )));
        }

        let word = |at: usize| u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]]) as usize;
        let compressed_len = word(0);
        let uncompressed_len = word(4);
        let payload = &body[8..];

        if compressed_len == 0 || uncompressed_len == 0 {
            return Err(DecodeError::InvalidCompressionHeader(format!(
                "zero length (compressed {}, uncompressed {})",
                compressed_len, uncompressed_len
            )));
        }
        if compressed_len > payload.len() {
            return Err(DecodeError::InvalidCompressionHeader(format!(
                "compressed length {} overruns the {} available bytes",
                compressed_len,
                payload.len()
            )));
        }
        if uncompressed_len > self.options.max_uncompressed_bytes {
            return Err(DecodeError::InvalidCompressionHeader(format!(
                "uncompressed length {} exceeds the {} byte limit",
                uncompressed_len, self.options.max_uncompressed_bytes
            )));
        }

        log::debug!("Inflating {} -> {} bytes", compressed_len, uncompressed_len);
        lzf::decompress(&payload[..compressed_len], uncompressed_len)
    }

    /// Validate a decoded position
    fn accept(&self, x: f64, y: f64, z: f64) -> Option<Vec3> {
        let limit = self.options.max_coordinate_magnitude as f64;
        let valid = |c: f64| c.is_finite() && c.abs() <= limit;
        if !(valid(x) && valid(y) && valid(z)) {
            return None;
        }
        Some(Vec3::new(x as f32, y as f32, z as f32))
    }

    fn record_color(&self, layout: &FieldLayout, record: &[u8]) -> Color {
        let fields = layout.fields();
        match layout.color_source() {
            ColorSource::Packed(index) => {
                let field = &fields[index];
                match self.options.packed_color {
                    PackedColorMode::Numeric => unpack_numeric(field.read(record, 0)),
                    PackedColorMode::Bitcast if field.ty == FieldType::Float && field.size == 4 => {
                        unpack_bits(field.read_bits(record, 0))
                    }
                    PackedColorMode::Bitcast => unpack_bits(field.read(record, 0) as u32),
                }
            }
            ColorSource::Separate([r, g, b]) => Color::rgb(
                normalize_channel(fields[r].read(record, 0)),
                normalize_channel(fields[g].read(record, 0)),
                normalize_channel(fields[b].read(record, 0)),
            ),
            ColorSource::None => Color::WHITE,
        }
    }

    fn token_color(&self, layout: &FieldLayout, tokens: &[&str]) -> Color {
        let fields = layout.fields();
        let value = |field: &FieldSpec| {
            tokens
                .get(field.token_index)
                .and_then(|t| t.parse::<f64>().ok())
        };

        match layout.color_source() {
            ColorSource::Packed(index) => {
                let field = &fields[index];
                let Some(v) = value(field) else {
                    return Color::WHITE;
                };
                match self.options.packed_color {
                    PackedColorMode::Numeric => unpack_numeric(v),
                    PackedColorMode::Bitcast if field.ty == FieldType::Float => {
                        unpack_bits((v as f32).to_bits())
                    }
                    PackedColorMode::Bitcast => unpack_bits(v as u32),
                }
            }
            ColorSource::Separate([r, g, b]) => {
                match (value(&fields[r]), value(&fields[g]), value(&fields[b])) {
                    (Some(r), Some(g), Some(b)) => Color::rgb(
                        normalize_channel(r),
                        normalize_channel(g),
                        normalize_channel(b),
                    ),
                    _ => Color::WHITE,
                }
            }
            ColorSource::None => Color::WHITE,
        }
    }
}

/// Decode a PCD file with default options
pub fn decode(bytes: &[u8]) -> DecodeResult<PointCloudDataset> {
    PcdDecoder::default().decode(bytes)
}

/// Accumulates accepted points
struct PointSink {
    points: Vec<Vec3>,
    colors: Vec<Color>,
    has_color: bool,
    skipped: usize,
}

impl PointSink {
    fn new(has_color: bool, expected: usize) -> Self {
        // Header counts are untrusted; cap the up-front reservation
        let reserve = expected.min(1 << 24);
        Self {
            points: Vec::with_capacity(reserve),
            colors: if has_color { Vec::with_capacity(reserve) } else { Vec::new() },
            has_color,
            skipped: 0,
        }
    }

    fn push(&mut self, point: Option<Vec3>, color: Option<Color>) {
        let Some(point) = point else {
            self.skipped += 1;
            return;
        };
        self.points.push(point);
        if self.has_color {
            self.colors.push(color.unwrap_or(Color::WHITE));
        }
    }

    fn finish(self) -> DecodeResult<PointCloudDataset> {
        if self.points.is_empty() {
            return Err(DecodeError::EmptyPointCloud);
        }
        let skipped = self.skipped;
        PointCloudDataset::new(self.points, self.colors)
            .map(|dataset| dataset.with_skipped(skipped))
            .map_err(|_| DecodeError::EmptyPointCloud)
    }
}

/// Points worth reserving for: the declared count, capped by what the body can hold
fn reservation(declared: usize, body_len: usize, record_len: usize) -> usize {
    declared.min(body_len / record_len.max(1))
}

fn span(start: f32, done: usize, total: usize) -> f32 {
    let fraction = if total == 0 { 1.0 } else { (done as f32 / total as f32).min(1.0) };
    start + (BODY_DONE - start) * fraction
}

fn unpack_numeric(value: f64) -> Color {
    if !value.is_finite() {
        return Color::WHITE;
    }
    let channel = |divisor: f64| ((value / divisor).floor() as i64 & 0xff) as u8;
    Color::from_rgb8(channel(1.0), channel(256.0), channel(65_536.0))
}

fn unpack_bits(bits: u32) -> Color {
    Color::from_rgb8((bits >> 16) as u8, (bits >> 8) as u8, bits as u8)
}

/// Values above 1 are taken as 0-255; values in `[0, 1]` as already normalised
fn normalize_channel(value: f64) -> f32 {
    if !value.is_finite() {
        return 1.0;
    }
    let value = if value > 1.0 { value / 255.0 } else { value };
    value.clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii(fields: &str, points: usize, body: &str) -> String {
        format!(
            "# .PCD v0.7\nVERSION 0.7\nFIELDS {}\nPOINTS {}\nDATA ascii\n{}",
            fields, points, body
        )
    }

    /// Binary file with fields x:F4 y:F8 z:I4 intensity:U2 rgb:U4
    fn mixed_binary(records: &[(f32, f64, i32, u16, u32)], declared: usize) -> Vec<u8> {
        let mut bytes = format!(
            "VERSION 0.7\nFIELDS x y z intensity rgb\nSIZE 4 8 4 2 4\nTYPE F F I U U\n\
             COUNT 1 1 1 1 1\nWIDTH {0}\nHEIGHT 1\nPOINTS {0}\nDATA binary\n",
            declared
        )
        .into_bytes();
        for &(x, y, z, intensity, rgb) in records {
            bytes.extend(x.to_le_bytes());
            bytes.extend(y.to_le_bytes());
            bytes.extend(z.to_le_bytes());
            bytes.extend(intensity.to_le_bytes());
            bytes.extend(rgb.to_le_bytes());
        }
        bytes
    }

    fn compressed(points: usize, payload: &[u8], declared_uncompressed: u32) -> Vec<u8> {
        let stream = lzf::compress(payload);
        let mut bytes = format!(
            "VERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\nPOINTS {}\nDATA binary_compressed\n",
            points
        )
        .into_bytes();
        bytes.extend((stream.len() as u32).to_le_bytes());
        bytes.extend(declared_uncompressed.to_le_bytes());
        bytes.extend(stream);
        bytes
    }

    fn xyz_payload(points: &[[f32; 3]]) -> Vec<u8> {
        points.iter().flatten().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_ascii_three_points() {
        let file = ascii("x y z", 3, "0 0 0\n1 1 1\n2 2 2\n");
        let dataset = decode(file.as_bytes()).unwrap();

        assert_eq!(dataset.len(), 3);
        assert!(!dataset.has_colors());
        assert!(dataset.colors().is_empty());
        assert_eq!(dataset.bounds().min, Vec3::ZERO);
        assert_eq!(dataset.bounds().max, Vec3::splat(2.0));
        assert_eq!(dataset.bounds().center(), Vec3::ONE);
    }

    #[test]
    fn test_ascii_bounds_are_exact() {
        let body = "3.5 -1 0\n\n-7.25 4 2\n0 0 -9.5\n1 12.125 3\n";
        let dataset = decode(ascii("x y z", 4, body).as_bytes()).unwrap();

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.bounds().min, Vec3::new(-7.25, -1.0, -9.5));
        assert_eq!(dataset.bounds().max, Vec3::new(3.5, 12.125, 3.0));
    }

    #[test]
    fn test_ascii_drops_unparseable_points() {
        let body = "0 0 0\nfoo 1 1\n2 2\n3 3 3\nnan 1 1\n";
        let dataset = decode(ascii("x y z", 5, body).as_bytes()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.skipped_points(), 3);
    }

    #[test]
    fn test_ascii_packed_rgb_numeric() {
        // 10 + 20 * 256 + 30 * 65536
        let packed = 10 + 20 * 256 + 30 * 65_536;
        let file = ascii("x y z rgb", 1, &format!("1 2 3 {}\n", packed));
        let dataset = decode(file.as_bytes()).unwrap();
        assert_eq!(dataset.colors()[0].to_rgb8(), [10, 20, 30]);
    }

    #[test]
    fn test_binary_packed_rgb_bitcast() {
        let mut file = b"VERSION 0.7\nFIELDS x y z rgb\nSIZE 4 4 4 4\nTYPE F F F F\nPOINTS 1\nDATA binary\n".to_vec();
        for v in [1.0f32, 2.0, 3.0] {
            file.extend(v.to_le_bytes());
        }
        file.extend(0x00_0a_14_1eu32.to_le_bytes());

        let decoder = PcdDecoder::new(DecodeOptions {
            packed_color: PackedColorMode::Bitcast,
            ..DecodeOptions::default()
        });
        let dataset = decoder.decode(&file).unwrap();
        assert_eq!(dataset.colors()[0].to_rgb8(), [0x0a, 0x14, 0x1e]);
    }

    #[test]
    fn test_ascii_separate_channels() {
        let body = "0 0 0 255 0 51\n1 1 1 0.5 1 0\n2 2 2 x 1 1\n";
        let dataset = decode(ascii("x y z r g b", 3, body).as_bytes()).unwrap();
        let colors = dataset.colors();

        assert_eq!(colors.len(), 3);
        assert_eq!(colors[0].to_rgb8(), [255, 0, 51]);
        assert_eq!(colors[1], Color::rgb(0.5, 1.0, 0.0));
        assert_eq!(colors[2], Color::WHITE);
    }

    #[test]
    fn test_binary_exact_values() {
        let records = [
            (1.5f32, -2.25f64, 7i32, 100u16, 0x000000ffu32),
            (-0.125, 1e6, -42, 65535, 255 * 256),
            (3.0, 0.0, 0, 0, 255 * 65_536),
        ];
        let dataset = decode(&mixed_binary(&records, 3)).unwrap();

        assert_eq!(
            dataset.points(),
            &[
                Vec3::new(1.5, -2.25, 7.0),
                Vec3::new(-0.125, 1e6, -42.0),
                Vec3::new(3.0, 0.0, 0.0),
            ]
        );
        assert_eq!(dataset.colors()[0].to_rgb8(), [255, 0, 0]);
        assert_eq!(dataset.colors()[1].to_rgb8(), [0, 255, 0]);
        assert_eq!(dataset.colors()[2].to_rgb8(), [0, 0, 255]);
    }

    #[test]
    fn test_binary_reads_only_available_records() {
        let records = [(1.0f32, 1.0f64, 1i32, 0u16, 0u32), (2.0, 2.0, 2, 0, 0)];
        let mut bytes = mixed_binary(&records, 5);
        // Partial trailing record is ignored
        bytes.extend([0u8; 7]);
        let dataset = decode(&bytes).unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_binary_drops_out_of_range_points() {
        let records = [
            (1.0f32, 1.0f64, 1i32, 0u16, 0u32),
            (f32::NAN, 1.0, 1, 0, 0),
            (1.0, 1e9, 1, 0, 0),
            (f32::INFINITY, 0.0, 0, 0, 0),
            (4.0, 4.0, 4, 0, 0),
        ];
        let dataset = decode(&mixed_binary(&records, 5)).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.skipped_points(), 3);
        assert_eq!(dataset.bounds().max, Vec3::splat(4.0));
    }

    #[test]
    fn test_magnitude_limit_is_configurable() {
        let records = [(1.0f32, 50.0f64, 1i32, 0u16, 0u32), (1.0, 5.0, 1, 0, 0)];
        let decoder = PcdDecoder::new(DecodeOptions {
            max_coordinate_magnitude: 10.0,
            ..DecodeOptions::default()
        });
        let dataset = decoder.decode(&mixed_binary(&records, 2)).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_binary_truncated() {
        let mut bytes = mixed_binary(&[], 10);
        bytes.extend([0u8; 21]);
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::TruncatedBinaryData { stride: 22, available: 21 })
        );
    }

    #[test]
    fn test_all_points_invalid_is_empty() {
        let records = [(f32::NAN, 0.0f64, 0i32, 0u16, 0u32)];
        assert_eq!(decode(&mixed_binary(&records, 1)), Err(DecodeError::EmptyPointCloud));
        assert_eq!(decode(ascii("x y z", 0, "").as_bytes()), Err(DecodeError::EmptyPointCloud));
    }

    #[test]
    fn test_compressed_body() {
        let points = [[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [-1.0, -2.0, -3.0]];
        let payload = xyz_payload(&points);
        let dataset = decode(&compressed(3, &payload, payload.len() as u32)).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.points()[1], Vec3::new(3.0, 4.0, 5.0));
        assert_eq!(dataset.bounds().min, Vec3::new(-1.0, -2.0, -3.0));
    }

    #[test]
    fn test_compressed_body_half_missing() {
        let points = [[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]];
        let payload = xyz_payload(&points);
        // Header promises twice what the stream holds
        let file = compressed(4, &payload, (payload.len() * 2) as u32);

        assert_eq!(
            decode(&file),
            Err(DecodeError::SizeMismatch { expected: 48, actual: 24 })
        );
    }

    #[test]
    fn test_compression_header_checks() {
        let header = "VERSION 0.7\nFIELDS x y z\nPOINTS 1\nDATA binary_compressed\n";
        let with_prefix = |compressed: u32, uncompressed: u32, extra: usize| {
            let mut bytes = header.as_bytes().to_vec();
            bytes.extend(compressed.to_le_bytes());
            bytes.extend(uncompressed.to_le_bytes());
            bytes.extend(vec![0u8; extra]);
            bytes
        };

        let cases = [
            header.as_bytes().to_vec(),
            with_prefix(0, 12, 4),
            with_prefix(4, 0, 4),
            with_prefix(40, 12, 4),
            with_prefix(4, 2_000_000_000, 4),
        ];
        for file in cases {
            assert!(matches!(
                decode(&file),
                Err(DecodeError::InvalidCompressionHeader(_))
            ));
        }
    }

    #[test]
    fn test_malformed_header_aborts() {
        let file = "VERSION 0.7\nFIELDS x y\nPOINTS 1\nDATA ascii\n0 0\n";
        assert!(matches!(
            decode(file.as_bytes()),
            Err(DecodeError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_huge_field_count() {
        let overflowing = "VERSION 0.7\nFIELDS x y z n\nSIZE 4 4 4 8\nTYPE F F F F\n\
                           COUNT 1 1 1 2305843009213693952\nPOINTS 1\nDATA binary\n";
        let mut bytes = overflowing.as_bytes().to_vec();
        bytes.extend([0u8; 12]);
        assert!(matches!(decode(&bytes), Err(DecodeError::MalformedHeader(_))));

        let wide = "VERSION 0.7\nFIELDS x y z n\nCOUNT 1 1 1 100000000000000\nPOINTS 1\nDATA ascii\n1 2 3 4\n";
        let dataset = decode(wide.as_bytes()).unwrap();
        assert_eq!(dataset.points(), &[Vec3::new(1.0, 2.0, 3.0)]);

        let mut bytes = wide.replace("ascii\n1 2 3 4\n", "binary\n").into_bytes();
        bytes.extend([0u8; 16]);
        assert!(matches!(decode(&bytes), Err(DecodeError::TruncatedBinaryData { .. })));
    }

    #[test]
    fn test_reservation_is_bounded_by_body() {
        assert_eq!(reservation(3, 1_000, 12), 3);
        assert_eq!(reservation(usize::MAX, 120, 12), 10);
        assert_eq!(reservation(1_000_000_000, 0, 12), 0);
        assert_eq!(reservation(5, 100, 0), 5);
    }

    #[test]
    fn test_progress_reports() {
        let body: String = (0..10).map(|i| format!("{0} {0} {0}\n", i)).collect();
        let decoder = PcdDecoder::new(DecodeOptions {
            progress_interval: 4,
            ..DecodeOptions::default()
        });
        let mut reports = Vec::new();
        decoder
            .decode_with_progress(ascii("x y z", 10, &body).as_bytes(), &mut |pct, msg| {
                reports.push((pct, msg.to_string()))
            })
            .unwrap();

        assert_eq!(reports.first().unwrap().0, HEADER_DONE);
        assert_eq!(reports.last().unwrap(), &(100.0, "Decoded".to_string()));
        assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(reports.len(), 4);
    }

    #[test]
    fn test_unpack_helpers() {
        assert_eq!(unpack_numeric(f64::NAN), Color::WHITE);
        assert_eq!(unpack_numeric(257.9).to_rgb8(), [1, 1, 0]);
        assert_eq!(unpack_bits(0x00ff8000).to_rgb8(), [255, 128, 0]);
        assert_eq!(normalize_channel(0.25), 0.25);
        assert_eq!(normalize_channel(51.0), 0.2);
        assert_eq!(normalize_channel(-3.0), 0.0);
    }
}
