//! Move-to-front transform with zero-run coding.
//!
//! After block sorting, equal bytes cluster, so most move-to-front indices are
//! zero. Runs of zeros are written in bijective base 2: RUNA adds one times
//! the current digit weight, RUNB adds two times. Non-zero index `i` becomes
//! symbol `i + 1`, giving an alphabet of 257 symbols.

use crate::engine::try_with_capacity;
use crate::error::BscError;

pub const ALPHABET: usize = 257;

pub const RUNA: u16 = 0;
pub const RUNB: u16 = 1;

fn identity() -> [u8; 256] {
    std::array::from_fn(|i| i as u8)
}

fn push_run(out: &mut Vec<u16>, run: usize) {
    if run == 0 {
        return;
    }
    let mut n = run - 1;
    loop {
        out.push((n & 1) as u16);
        if n < 2 {
            break;
        }
        n = (n - 2) >> 1;
    }
}

pub fn encode(block: &[u8]) -> Vec<u16> {
    let mut order = identity();
    let mut out = Vec::with_capacity(block.len() / 2 + 16);
    let mut zeros = 0usize;

    for &byte in block {
        if order[0] == byte {
            zeros += 1;
            continue;
        }
        push_run(&mut out, zeros);
        zeros = 0;

        let mut idx = 1;
        while order[idx] != byte {
            idx += 1;
        }
        order.copy_within(0..idx, 1);
        order[0] = byte;
        out.push(idx as u16 + 1);
    }
    push_run(&mut out, zeros);
    out
}

fn flush_run(out: &mut Vec<u8>, byte: u8, run: usize, expected: usize) -> Result<(), BscError> {
    if out.len() + run > expected {
        return Err(BscError::DataCorrupt("zero run past block end".into()));
    }
    out.resize(out.len() + run, byte);
    Ok(())
}

pub fn decode(symbols: &[u16], expected: usize) -> Result<Vec<u8>, BscError> {
    let mut order = identity();
    let mut out = try_with_capacity(expected)?;
    let mut run = 0usize;
    let mut weight = 1usize;

    for &sym in symbols {
        match sym {
            RUNA => {
                run += weight;
                weight <<= 1;
            }
            RUNB => {
                run += weight << 1;
                weight <<= 1;
            }
            _ => {
                flush_run(&mut out, order[0], run, expected)?;
                run = 0;
                weight = 1;

                let idx = sym as usize - 1;
                if idx > 255 || out.len() >= expected {
                    return Err(BscError::DataCorrupt(format!("mtf symbol {}", sym)));
                }
                let byte = order[idx];
                order.copy_within(0..idx, 1);
                order[0] = byte;
                out.push(byte);
            }
        }
        if run > expected {
            return Err(BscError::DataCorrupt("zero run past block end".into()));
        }
    }
    flush_run(&mut out, order[0], run, expected)?;

    if out.len() != expected {
        return Err(BscError::DataCorrupt(format!(
            "mtf produced {} bytes, expected {}",
            out.len(),
            expected
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lengths_use_runa_runb() {
        // Byte 0 is at the front initially, so these are pure zero runs.
        assert_eq!(encode(&[0]), vec![RUNA]);
        assert_eq!(encode(&[0, 0]), vec![RUNB]);
        assert_eq!(encode(&[0, 0, 0]), vec![RUNA, RUNA]);
        assert_eq!(encode(&[0; 4]), vec![RUNB, RUNA]);
    }

    #[test]
    fn test_mtf_indices() {
        // 'b' and 'a' each start deep in the list, then 'b' sits right behind 'a'.
        let deep = b'b' as u16 + 1;
        assert_eq!(encode(b"bab"), vec![deep, deep, 2]);
    }

    #[test]
    fn test_roundtrip_runs_of_every_length() {
        for len in 0..300 {
            let mut data = vec![7u8; len];
            data.push(3);
            data.extend(std::iter::repeat(3u8).take(len));
            let symbols = encode(&data);
            assert_eq!(decode(&symbols, data.len()).unwrap(), data, "len {}", len);
        }
    }

    #[test]
    fn test_roundtrip_all_bytes() {
        let data: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).collect();
        let symbols = encode(&data);
        assert!(symbols.iter().all(|&s| (s as usize) < ALPHABET));
        assert_eq!(decode(&symbols, data.len()).unwrap(), data);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let symbols = encode(b"abcabc");
        assert!(decode(&symbols, 5).is_err());
        assert!(decode(&symbols, 7).is_err());
    }
}
