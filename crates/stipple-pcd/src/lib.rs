//! # Stipple PCD
//!
//! Reading and writing of Point Cloud Data (`.pcd`) files.
//!
//! This crate provides:
//! - **Header**: Parsing of the textual PCD header
//! - **Layout**: Byte offsets and scalar decoding for record fields
//! - **LZF**: The codec behind `binary_compressed` bodies
//! - **Decoder**: ASCII, binary and compressed bodies into a dataset
//! - **Writer**: Datasets back into PCD files
//! - **Service**: Decoding on worker threads with progress events

pub mod decoder;
pub mod error;
pub mod header;
pub mod layout;
pub mod lzf;
pub mod service;
pub mod writer;

pub use decoder::{DecodeOptions, PackedColorMode, PcdDecoder, decode};
pub use error::{DecodeError, DecodeResult};
pub use header::{DataEncoding, FieldType, PcdHeader};
pub use layout::{ColorSource, FieldLayout, FieldSpec};
pub use service::{DecodeEvent, DecodeService, DecodeTicket};
pub use writer::encode;
