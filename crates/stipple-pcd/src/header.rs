//! PCD header parsing
//!
//! The header is plain text, one `KEY value...` entry per line, ending with
//! the `DATA` line. Everything after that line is the body.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, DecodeResult};

/// Field storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// `I`: signed integer
    Signed,
    /// `U`: unsigned integer
    Unsigned,
    /// `F`: IEEE float
    Float,
}

impl FieldType {
    /// Header tag character
    pub fn tag(&self) -> char {
        match self {
            Self::Signed => 'I',
            Self::Unsigned => 'U',
            Self::Float => 'F',
        }
    }
}

impl FromStr for FieldType {
    type Err = DecodeError;

    fn from_str(s: &str) -> DecodeResult<Self> {
        match s {
            "I" | "i" => Ok(Self::Signed),
            "U" | "u" => Ok(Self::Unsigned),
            "F" | "f" => Ok(Self::Float),
            other => Err(DecodeError::header(format!("unknown field type '{}'", other))),
        }
    }
}

/// Body encoding declared by the `DATA` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataEncoding {
    Ascii,
    Binary,
    BinaryCompressed,
}

impl FromStr for DataEncoding {
    type Err = DecodeError;

    fn from_str(s: &str) -> DecodeResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(Self::Ascii),
            "binary" => Ok(Self::Binary),
            "binary_compressed" => Ok(Self::BinaryCompressed),
            other => Err(DecodeError::header(format!("unknown DATA encoding '{}'", other))),
        }
    }
}

impl fmt::Display for DataEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascii => "ascii",
            Self::Binary => "binary",
            Self::BinaryCompressed => "binary_compressed",
        })
    }
}

/// Parsed PCD header
#[derive(Debug, Clone, PartialEq)]
pub struct PcdHeader {
    pub version: String,
    /// Field names, lowercased, in record order
    pub fields: Vec<String>,
    /// Byte size of one element of each field
    pub sizes: Vec<usize>,
    pub types: Vec<FieldType>,
    /// Elements per field
    pub counts: Vec<usize>,
    pub width: usize,
    pub height: usize,
    /// Translation (tx ty tz) followed by quaternion (qw qx qy qz)
    pub viewpoint: [f32; 7],
    pub points: usize,
    pub data: DataEncoding,
}

impl PcdHeader {
    /// Viewpoint used when the header omits one
    pub const DEFAULT_VIEWPOINT: [f32; 7] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];

    /// Parse the header at the start of `bytes`.
    ///
    /// Returns the header and the byte offset at which the body begins.
    pub fn parse(bytes: &[u8]) -> DecodeResult<(Self, usize)> {
        let mut raw = RawHeader::default();
        let mut cursor = 0;
        let mut body_offset = None;

        while cursor < bytes.len() {
            let line_end = bytes[cursor..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| cursor + p);
            let next = line_end.map_or(bytes.len(), |end| end + 1);
            let line = String::from_utf8_lossy(&bytes[cursor..line_end.unwrap_or(bytes.len())]);
            cursor = next;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            let values: Vec<&str> = tokens.collect();

            if raw.apply(key, &values)? {
                body_offset = Some(cursor);
                break;
            }
        }

        let body_offset = body_offset.ok_or_else(|| DecodeError::header("missing DATA"))?;
        Ok((raw.finish()?, body_offset))
    }

    /// Render the header as PCD text, ending with the `DATA` line
    pub fn to_text(&self) -> String {
        let join = |items: Vec<String>| items.join(" ");
        let mut text = String::new();
        text.push_str("# .PCD v0.7 - Point Cloud Data file format\n");
        text.push_str(&format!("VERSION {}\n", self.version));
        text.push_str(&format!("FIELDS {}\n", self.fields.join(" ")));
        text.push_str(&format!("SIZE {}\n", join(self.sizes.iter().map(|s| s.to_string()).collect())));
        text.push_str(&format!("TYPE {}\n", join(self.types.iter().map(|t| t.tag().to_string()).collect())));
        text.push_str(&format!("COUNT {}\n", join(self.counts.iter().map(|c| c.to_string()).collect())));
        text.push_str(&format!("WIDTH {}\n", self.width));
        text.push_str(&format!("HEIGHT {}\n", self.height));
        text.push_str(&format!("VIEWPOINT {}\n", join(self.viewpoint.iter().map(|v| v.to_string()).collect())));
        text.push_str(&format!("POINTS {}\n", self.points));
        text.push_str(&format!("DATA {}\n", self.data));
        text
    }
}

/// Header entries as they are collected, before defaults and validation
#[derive(Default)]
struct RawHeader {
    version: Option<String>,
    fields: Option<Vec<String>>,
    sizes: Option<Vec<usize>>,
    types: Option<Vec<FieldType>>,
    counts: Option<Vec<usize>>,
    width: Option<usize>,
    height: Option<usize>,
    viewpoint: Option<[f32; 7]>,
    points: Option<usize>,
    data: Option<DataEncoding>,
}

impl RawHeader {
    /// Apply one header line; returns true for the terminating `DATA` line
    fn apply(&mut self, key: &str, values: &[&str]) -> DecodeResult<bool> {
        match key.to_ascii_uppercase().as_str() {
            "VERSION" => {
                if values.is_empty() {
                    return Err(DecodeError::header("VERSION has no value"));
                }
                self.version = Some(values.join(" "));
            }
            "FIELDS" => {
                self.fields = Some(values.iter().map(|v| v.to_ascii_lowercase()).collect());
            }
            "SIZE" => self.sizes = Some(parse_all(key, values)?),
            "TYPE" => {
                self.types = Some(values.iter().map(|v| v.parse()).collect::<DecodeResult<_>>()?);
            }
            "COUNT" => self.counts = Some(parse_all(key, values)?),
            "WIDTH" => self.width = Some(parse_single(key, values)?),
            "HEIGHT" => self.height = Some(parse_single(key, values)?),
            "VIEWPOINT" => {
                let parsed: Vec<f32> = parse_all(key, values)?;
                match <[f32; 7]>::try_from(parsed) {
                    Ok(viewpoint) => self.viewpoint = Some(viewpoint),
                    Err(_) => log::warn!("Ignoring VIEWPOINT without 7 values"),
                }
            }
            "POINTS" => self.points = Some(parse_single(key, values)?),
            "DATA" => {
                let value = values
                    .first()
                    .ok_or_else(|| DecodeError::header("DATA has no value"))?;
                self.data = Some(value.parse()?);
                return Ok(true);
            }
            other => log::debug!("Ignoring unknown header key '{}'", other),
        }
        Ok(false)
    }

    fn finish(self) -> DecodeResult<PcdHeader> {
        let version = self.version.ok_or_else(|| DecodeError::header("missing VERSION"))?;
        let fields = self.fields.ok_or_else(|| DecodeError::header("missing FIELDS"))?;
        let points = self.points.ok_or_else(|| DecodeError::header("missing POINTS"))?;
        let data = self.data.ok_or_else(|| DecodeError::header("missing DATA"))?;

        for axis in ["x", "y", "z"] {
            if !fields.iter().any(|f| f == axis) {
                return Err(DecodeError::header(format!("FIELDS has no '{}'", axis)));
            }
        }

        let n = fields.len();
        let sizes = check_len("SIZE", self.sizes.unwrap_or_else(|| vec![4; n]), n)?;
        let types = check_len("TYPE", self.types.unwrap_or_else(|| vec![FieldType::Float; n]), n)?;
        let counts = check_len("COUNT", self.counts.unwrap_or_else(|| vec![1; n]), n)?;

        if counts.contains(&0) {
            return Err(DecodeError::header("COUNT entries must be at least 1"));
        }

        Ok(PcdHeader {
            version,
            fields,
            sizes,
            types,
            counts,
            width: self.width.unwrap_or(points),
            height: self.height.unwrap_or(1),
            viewpoint: self.viewpoint.unwrap_or(PcdHeader::DEFAULT_VIEWPOINT),
            points,
            data,
        })
    }
}

fn parse_all<T: FromStr>(key: &str, values: &[&str]) -> DecodeResult<Vec<T>> {
    values
        .iter()
        .map(|v| {
            v.parse()
                .map_err(|_| DecodeError::header(format!("invalid {} value '{}'", key, v)))
        })
        .collect()
}

fn parse_single<T: FromStr>(key: &str, values: &[&str]) -> DecodeResult<T> {
    match values {
        [value] => value
            .parse()
            .map_err(|_| DecodeError::header(format!("invalid {} value '{}'", key, value))),
        _ => Err(DecodeError::header(format!("{} expects exactly one value", key))),
    }
}

fn check_len<T>(key: &str, values: Vec<T>, expected: usize) -> DecodeResult<Vec<T>> {
    if values.len() != expected {
        return Err(DecodeError::header(format!(
            "{} has {} entries but FIELDS has {}",
            key,
            values.len(),
            expected
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "# .PCD v0.7\n\
        VERSION 0.7\n\
        FIELDS x y z rgb\n\
        SIZE 4 4 4 4\n\
        TYPE F F F U\n\
        COUNT 1 1 1 1\n\
        WIDTH 2\n\
        HEIGHT 1\n\
        VIEWPOINT 0 0 0 1 0 0 0\n\
        POINTS 2\n\
        DATA ascii\n";

    #[test]
    fn test_parse_full_header() {
        let bytes = format!("{}1 2 3 4\n", HEADER);
        let (header, offset) = PcdHeader::parse(bytes.as_bytes()).unwrap();

        assert_eq!(header.version, "0.7");
        assert_eq!(header.fields, vec!["x", "y", "z", "rgb"]);
        assert_eq!(header.sizes, vec![4, 4, 4, 4]);
        assert_eq!(header.types[3], FieldType::Unsigned);
        assert_eq!(header.points, 2);
        assert_eq!(header.data, DataEncoding::Ascii);
        assert_eq!(&bytes[offset..], "1 2 3 4\n");
    }

    #[test]
    fn test_case_insensitive_keys_and_data_value() {
        let text = "version 0.7\nfields x y z\npoints 0\ndata BINARY_COMPRESSED\n";
        let (header, offset) = PcdHeader::parse(text.as_bytes()).unwrap();
        assert_eq!(header.data, DataEncoding::BinaryCompressed);
        assert_eq!(offset, text.len());
    }

    #[test]
    fn test_defaults_for_optional_keys() {
        let text = "VERSION .7\nFIELDS x y z\nPOINTS 5\nDATA ascii";
        let (header, offset) = PcdHeader::parse(text.as_bytes()).unwrap();
        assert_eq!(header.sizes, vec![4, 4, 4]);
        assert_eq!(header.types, vec![FieldType::Float; 3]);
        assert_eq!(header.counts, vec![1, 1, 1]);
        assert_eq!(header.width, 5);
        assert_eq!(header.height, 1);
        assert_eq!(header.viewpoint, PcdHeader::DEFAULT_VIEWPOINT);
        assert_eq!(offset, text.len());
    }

    #[test]
    fn test_missing_required_keys() {
        let cases = [
            ("FIELDS x y z\nPOINTS 1\nDATA ascii\n", "VERSION"),
            ("VERSION 0.7\nPOINTS 1\nDATA ascii\n", "FIELDS"),
            ("VERSION 0.7\nFIELDS x y z\nDATA ascii\n", "POINTS"),
            ("VERSION 0.7\nFIELDS x y z\nPOINTS 1\n", "DATA"),
        ];
        for (text, key) in cases {
            match PcdHeader::parse(text.as_bytes()) {
                Err(DecodeError::MalformedHeader(msg)) => assert!(msg.contains(key), "{}", msg),
                other => panic!("expected MalformedHeader for {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_missing_axis_field() {
        let text = "VERSION 0.7\nFIELDS x y intensity\nPOINTS 1\nDATA ascii\n";
        assert!(matches!(
            PcdHeader::parse(text.as_bytes()),
            Err(DecodeError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_mismatched_array_lengths() {
        let text = "VERSION 0.7\nFIELDS x y z\nSIZE 4 4\nPOINTS 1\nDATA ascii\n";
        assert!(matches!(
            PcdHeader::parse(text.as_bytes()),
            Err(DecodeError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_header_text_round_trip() {
        let (header, _) = PcdHeader::parse(HEADER.as_bytes()).unwrap();
        let (reparsed, _) = PcdHeader::parse(header.to_text().as_bytes()).unwrap();
        assert_eq!(header, reparsed);
    }
}
