//! LZF codec
//!
//! Byte-oriented LZ77 variant used by `binary_compressed` PCD bodies. Each
//! step reads one control byte:
//!
//! - `ctrl < 32`: a literal run of `ctrl + 1` bytes follows.
//! - otherwise: a back-reference. The length is `ctrl >> 5` (extended by the
//!   next byte when it equals 7) plus 2; the offset is
//!   `((ctrl & 0x1f) << 8) | next_byte`, counted back from the byte before
//!   the current output position.

use crate::error::{DecodeError, DecodeResult};

const MAX_LITERAL: usize = 1 << 5;
const MAX_OFFSET: usize = 1 << 13;
const MAX_MATCH: usize = (1 << 8) + (1 << 3);
const HASH_LOG: u32 = 14;

/// Output shortfall that is zero-padded instead of rejected, in percent
const SHORTFALL_TOLERANCE_PERCENT: usize = 1;

/// Decompress an LZF stream into exactly `expected_size` bytes.
///
/// Stops when the input is exhausted or `expected_size` bytes have been
/// produced. A shortfall of at most 1% is padded with zeros; anything larger
/// is a [`DecodeError::SizeMismatch`].
pub fn decompress(input: &[u8], expected_size: usize) -> DecodeResult<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size);
    let mut ip = 0;

    while ip < input.len() && output.len() < expected_size {
        let ctrl = input[ip] as usize;
        ip += 1;

        if ctrl < MAX_LITERAL {
            let run = ctrl + 1;
            let available = run.min(input.len() - ip);
            let room = available.min(expected_size - output.len());
            output.extend_from_slice(&input[ip..ip + room]);
            ip += available;
            continue;
        }

        let mut len = ctrl >> 5;
        if len == 7 {
            let Some(&extra) = input.get(ip) else {
                break;
            };
            len += extra as usize;
            ip += 1;
        }
        len += 2;

        let Some(&low) = input.get(ip) else {
            break;
        };
        ip += 1;

        let offset = ((ctrl & 0x1f) << 8) | low as usize;
        let position = output.len();
        let Some(source) = position.checked_sub(offset + 1) else {
            return Err(DecodeError::InvalidBackReference { position, offset });
        };

        // Source and destination may overlap; copy forward one byte at a time
        let len = len.min(expected_size - position);
        for i in 0..len {
            let byte = output[source + i];
            output.push(byte);
        }
    }

    let produced = output.len();
    if produced < expected_size {
        let shortfall = expected_size - produced;
        if shortfall * 100 > expected_size * SHORTFALL_TOLERANCE_PERCENT {
            return Err(DecodeError::SizeMismatch {
                expected: expected_size,
                actual: produced,
            });
        }
        log::debug!("LZF stream short by {} bytes, zero-padding", shortfall);
        output.resize(expected_size, 0);
    }

    Ok(output)
}

/// Compress bytes into an LZF stream that [`decompress`] reverses exactly.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() + input.len() / MAX_LITERAL + 1);
    let mut table: Vec<Option<usize>> = vec![None; 1 << HASH_LOG];
    let mut literals: Vec<u8> = Vec::with_capacity(MAX_LITERAL);
    let mut ip = 0;

    while ip + 2 < input.len() {
        let slot = hash(&input[ip..ip + 3]);
        let candidate = table[slot].replace(ip);

        let matched = candidate.filter(|&c| {
            ip - c <= MAX_OFFSET && input[c..c + 3] == input[ip..ip + 3]
        });

        let Some(candidate) = matched else {
            literals.push(input[ip]);
            if literals.len() == MAX_LITERAL {
                flush_literals(&mut output, &mut literals);
            }
            ip += 1;
            continue;
        };

        let limit = (input.len() - ip).min(MAX_MATCH);
        let mut len = 3;
        while len < limit && input[candidate + len] == input[ip + len] {
            len += 1;
        }

        flush_literals(&mut output, &mut literals);

        let offset = ip - candidate - 1;
        let encoded = len - 2;
        if encoded < 7 {
            output.push(((encoded << 5) | (offset >> 8)) as u8);
        } else {
            output.push(((7 << 5) | (offset >> 8)) as u8);
            output.push((encoded - 7) as u8);
        }
        output.push((offset & 0xff) as u8);

        ip += len;
    }

    for &byte in &input[ip..] {
        literals.push(byte);
        if literals.len() == MAX_LITERAL {
            flush_literals(&mut output, &mut literals);
        }
    }
    flush_literals(&mut output, &mut literals);

    output
}

fn flush_literals(output: &mut Vec<u8>, literals: &mut Vec<u8>) {
    if literals.is_empty() {
        return;
    }
    output.push((literals.len() - 1) as u8);
    output.append(literals);
}

fn hash(bytes: &[u8]) -> usize {
    let v = (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32;
    (v.wrapping_mul(2_654_435_761) >> (32 - HASH_LOG)) as usize
}
