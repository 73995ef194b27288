//! Record field layout
//!
//! Fields are packed in header order with no padding. A field's byte offset
//! is the running sum of `size * count` over the fields before it, and the
//! record stride is the same sum over all fields.

use crate::error::{DecodeError, DecodeResult};
use crate::header::{FieldType, PcdHeader};

/// One field of a point record
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    /// Bytes per element
    pub size: usize,
    /// Elements per record
    pub count: usize,
    /// Byte offset within a binary record
    pub offset: usize,
    /// Token position within an ASCII line
    pub token_index: usize,
}

impl FieldSpec {
    /// Total bytes this field occupies in a record
    pub fn byte_len(&self) -> usize {
        self.size * self.count
    }

    /// Read one element of this field from a binary record as `f64`
    pub fn read(&self, record: &[u8], element: usize) -> f64 {
        let start = self.offset + element * self.size;
        read_value(self.ty, self.size, &record[start..start + self.size])
    }

    /// Raw little-endian bits of a 4-byte element
    pub fn read_bits(&self, record: &[u8], element: usize) -> u32 {
        let start = self.offset + element * self.size;
        u32::from_le_bytes(le_bytes(&record[start..]))
    }
}

/// Where point colours come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSource {
    None,
    /// Single packed `rgb`/`rgba` field (index into the field list)
    Packed(usize),
    /// Separate `r`, `g`, `b` fields
    Separate([usize; 3]),
}

/// Field offset table for a header
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    fields: Vec<FieldSpec>,
    stride: usize,
    tokens_per_record: usize,
    axes: [usize; 3],
    color: ColorSource,
}

impl FieldLayout {
    /// Compute offsets and validate field widths
    pub fn from_header(header: &PcdHeader) -> DecodeResult<Self> {
        let mut fields = Vec::with_capacity(header.fields.len());
        let mut offset = 0;
        let mut token_index = 0;

        for (i, name) in header.fields.iter().enumerate() {
            let (ty, size, count) = (header.types[i], header.sizes[i], header.counts[i]);
            let supported = match ty {
                FieldType::Float => matches!(size, 4 | 8),
                FieldType::Signed | FieldType::Unsigned => matches!(size, 1 | 2 | 4 | 8),
            };
            if !supported {
                return Err(DecodeError::header(format!(
                    "field '{}' has unsupported type {}{}",
                    name,
                    ty.tag(),
                    size
                )));
            }

            fields.push(FieldSpec {
                name: name.clone(),
                ty,
                size,
                count,
                offset,
                token_index,
            });
            let overflow = || DecodeError::header(format!("COUNT {} of field '{}' is too large", count, name));
            offset = size
                .checked_mul(count)
                .and_then(|len| offset.checked_add(len))
                .ok_or_else(overflow)?;
            token_index = token_index.checked_add(count).ok_or_else(overflow)?;
        }

        let find = |name: &str| fields.iter().position(|f| f.name == name);
        let axis = |name: &str| {
            find(name).ok_or_else(|| DecodeError::header(format!("FIELDS has no '{}'", name)))
        };
        let axes = [axis("x")?, axis("y")?, axis("z")?];

        let color = match (find("rgb").or_else(|| find("rgba")), find("r"), find("g"), find("b")) {
            (Some(packed), _, _, _) => ColorSource::Packed(packed),
            (None, Some(r), Some(g), Some(b)) => ColorSource::Separate([r, g, b]),
            _ => ColorSource::None,
        };

        Ok(Self {
            fields,
            stride: offset,
            tokens_per_record: token_index,
            axes,
            color,
        })
    }

    /// Bytes per binary record
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Tokens per ASCII line
    pub fn tokens_per_record(&self) -> usize {
        self.tokens_per_record
    }

    /// All fields in record order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The x, y and z fields
    pub fn axes(&self) -> [&FieldSpec; 3] {
        self.axes.map(|i| &self.fields[i])
    }

    /// Colour source detected from the field names
    pub fn color_source(&self) -> ColorSource {
        self.color
    }
}

fn le_bytes<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Decode a little-endian scalar.
///
/// 8-byte integers are rebuilt from two 32-bit words as
/// `high * 2^32 + low`, losing precision beyond 2^53.
fn read_value(ty: FieldType, size: usize, bytes: &[u8]) -> f64 {
    const WORD: f64 = 4_294_967_296.0;
    match (ty, size) {
        (FieldType::Float, 4) => f32::from_le_bytes(le_bytes(bytes)) as f64,
        (FieldType::Float, 8) => f64::from_le_bytes(le_bytes(bytes)),
        (FieldType::Signed, 1) => bytes[0] as i8 as f64,
        (FieldType::Signed, 2) => i16::from_le_bytes(le_bytes(bytes)) as f64,
        (FieldType::Signed, 4) => i32::from_le_bytes(le_bytes(bytes)) as f64,
        (FieldType::Signed, 8) => {
            let low = u32::from_le_bytes(le_bytes(bytes)) as f64;
            let high = i32::from_le_bytes(le_bytes(&bytes[4..])) as f64;
            high * WORD + low
        }
        (FieldType::Unsigned, 1) => bytes[0] as f64,
        (FieldType::Unsigned, 2) => u16::from_le_bytes(le_bytes(bytes)) as f64,
        (FieldType::Unsigned, 4) => u32::from_le_bytes(le_bytes(bytes)) as f64,
        (FieldType::Unsigned, 8) => {
            let low = u32::from_le_bytes(le_bytes(bytes)) as f64;
            let high = u32::from_le_bytes(le_bytes(&bytes[4..])) as f64;
            high * WORD + low
        }
        // Widths are validated in `FieldLayout::from_header`
        _ => f64::NAN,
    }
}
