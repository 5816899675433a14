//! LZP preprocessing
//!
//! Every position is predicted from the four bytes before it: a hash of that
//! context points at the last position that followed the same context. When
//! the predicted continuation matches for at least `min_len` bytes, the run is
//! replaced by an escape byte and its length. A literal escape byte is written
//! as the escape followed by `0`.
//!
//! Lengths are stored as `len - min_len + 1` in a 255-continuation code, so the
//! first length byte is never zero.

use crate::engine::{try_vec, try_with_capacity};
use crate::error::BscError;

const CONTEXT: usize = 4;

#[inline]
fn context(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos - 4], buf[pos - 3], buf[pos - 2], buf[pos - 1]])
}

#[inline]
fn hash(ctx: u32, bits: u32) -> usize {
    (ctx.wrapping_mul(0x9E37_79B1) >> (32 - bits)) as usize
}

/// Least frequent byte of `data`, lowest value on ties.
pub fn pick_escape(data: &[u8]) -> u8 {
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] += 1;
    }
    let mut best = 0usize;
    for (sym, &count) in freq.iter().enumerate() {
        if count < freq[best] {
            best = sym;
        }
    }
    best as u8
}

fn match_len(data: &[u8], candidate: usize, pos: usize) -> usize {
    data[pos..]
        .iter()
        .zip(&data[candidate..])
        .take_while(|(a, b)| a == b)
        .count()
}

fn write_len(out: &mut Vec<u8>, mut value: usize) {
    while value >= 255 {
        out.push(255);
        value -= 255;
    }
    out.push(value as u8);
}

pub fn encode(input: &[u8], hash_bits: u32, min_len: usize, escape: u8) -> Result<Vec<u8>, BscError> {
    let n = input.len();
    let mut out = try_with_capacity(n)?;
    out.extend_from_slice(&input[..n.min(CONTEXT)]);
    if n <= CONTEXT {
        return Ok(out);
    }

    let mut table = try_vec(1usize << hash_bits, 0u32)?;
    let mut i = CONTEXT;
    while i < n {
        let h = hash(context(input, i), hash_bits);
        let candidate = table[h] as usize;
        table[h] = i as u32;

        if candidate > 0 {
            let len = match_len(input, candidate, i);
            if len >= min_len {
                out.push(escape);
                write_len(&mut out, len - min_len + 1);
                i += len;
                continue;
            }
        }

        let byte = input[i];
        out.push(byte);
        if byte == escape {
            out.push(0);
        }
        i += 1;
    }
    Ok(out)
}

pub fn decode(
    input: &[u8],
    hash_bits: u32,
    min_len: usize,
    escape: u8,
    expected: usize,
) -> Result<Vec<u8>, BscError> {
    let prefix = expected.min(CONTEXT);
    if input.len() < prefix {
        return Err(BscError::UnexpectedEob);
    }
    let mut out = try_with_capacity(expected)?;
    out.extend_from_slice(&input[..prefix]);

    let mut table = try_vec(1usize << hash_bits, 0u32)?;
    let mut pos = prefix;
    let mut next = || -> Result<u8, BscError> {
        let byte = *input.get(pos).ok_or(BscError::UnexpectedEob)?;
        pos += 1;
        Ok(byte)
    };

    while out.len() < expected {
        let i = out.len();
        let h = hash(context(&out, i), hash_bits);
        let candidate = table[h] as usize;
        table[h] = i as u32;

        let byte = next()?;
        if byte != escape {
            out.push(byte);
            continue;
        }

        let first = next()?;
        if first == 0 {
            out.push(escape);
            continue;
        }
        let mut code = first as usize;
        let mut last = first;
        while last == 255 {
            last = next()?;
            code += last as usize;
        }

        let len = code + min_len - 1;
        if candidate == 0 || i + len > expected {
            return Err(BscError::DataCorrupt("lzp match outside block".into()));
        }
        for k in 0..len {
            let b = out[candidate + k];
            out.push(b);
        }
    }

    if pos != input.len() {
        return Err(BscError::DataCorrupt("trailing lzp data".into()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8], bits: u32, min_len: usize) -> Vec<u8> {
        let escape = pick_escape(data);
        let encoded = encode(data, bits, min_len, escape).unwrap();
        let decoded = decode(&encoded, bits, min_len, escape, data.len()).unwrap();
        assert_eq!(decoded, data);
        encoded
    }

    #[test]
    fn test_lzp_shrinks_long_repeats() {
        let data = b"the quick brown fox jumps over the lazy dog. ".repeat(200);
        let encoded = roundtrip(&data, 16, 32);
        assert!(encoded.len() < data.len() / 4);
    }

    #[test]
    fn test_lzp_escape_literals() {
        // Every byte value present, so the escape byte is a real literal.
        let mut data: Vec<u8> = (0..=255).collect();
        data.extend((0..=255u8).rev());
        data.extend(std::iter::repeat(7u8).take(600));
        roundtrip(&data, 12, 4);
    }

    #[test]
    fn test_lzp_long_match_length_codes() {
        // Matches long enough to need several continuation bytes.
        let data = vec![b'a'; 5000];
        roundtrip(&data, 10, 4);
        let mut mixed = b"header".to_vec();
        mixed.extend(std::iter::repeat(b'z').take(255 + 4 + 3));
        roundtrip(&mixed, 10, 4);
    }

    #[test]
    fn test_lzp_short_inputs() {
        roundtrip(b"", 10, 4);
        roundtrip(b"abc", 10, 4);
        roundtrip(b"abcd", 10, 4);
        roundtrip(b"abcde", 10, 4);
    }

    #[test]
    fn test_lzp_truncated_input() {
        let data = b"abcdabcdabcdabcdabcdabcdabcdabcd".repeat(4);
        let escape = pick_escape(&data);
        let encoded = encode(&data, 10, 4, escape).unwrap();
        let result = decode(&encoded[..encoded.len() - 1], 10, 4, escape, data.len());
        assert!(result.is_err());
    }

    #[test]
    fn test_pick_escape_prefers_unused_byte() {
        let data: Vec<u8> = (1..=255).collect();
        assert_eq!(pick_escape(&data), 0);
    }
}
