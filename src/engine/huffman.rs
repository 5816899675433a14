//! Static Huffman coder (coder level 1)
//!
//! One canonical code per block. The payload is the symbol count, the code
//! length of each of the 257 symbols in 5 bits, then the codes, MSB first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

use crate::engine::mtf::ALPHABET;
use crate::engine::try_with_capacity;
use crate::error::BscError;

pub const MAX_CODE_LEN: u8 = 20;
const LEN_BITS: u32 = 5;

#[derive(Debug)]
struct HuffNode {
    freq: u64,
    symbol: Option<u16>,
    left: Option<Box<HuffNode>>,
    right: Option<Box<HuffNode>>,
}

impl Eq for HuffNode {}
impl PartialEq for HuffNode {
    fn eq(&self, other: &Self) -> bool {
        self.freq == other.freq
    }
}
impl PartialOrd for HuffNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HuffNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other.freq.cmp(&self.freq) // min-heap
    }
}

fn leaf(freq: u64, symbol: u16) -> HuffNode {
    HuffNode {
        freq,
        symbol: Some(symbol),
        left: None,
        right: None,
    }
}

fn assign_depths(node: &HuffNode, depth: u8, lengths: &mut [u8; ALPHABET]) {
    if let Some(sym) = node.symbol {
        lengths[sym as usize] = depth.max(1);
        return;
    }
    if let Some(ref left) = node.left {
        assign_depths(left, depth.saturating_add(1), lengths);
    }
    if let Some(ref right) = node.right {
        assign_depths(right, depth.saturating_add(1), lengths);
    }
}

fn tree_lengths(freqs: &[u64; ALPHABET]) -> [u8; ALPHABET] {
    let mut lengths = [0u8; ALPHABET];
    let mut heap: BinaryHeap<HuffNode> = freqs
        .iter()
        .enumerate()
        .filter(|(_, &f)| f > 0)
        .map(|(sym, &f)| leaf(f, sym as u16))
        .collect();

    while heap.len() > 1 {
        let (Some(left), Some(right)) = (heap.pop(), heap.pop()) else {
            break;
        };
        heap.push(HuffNode {
            freq: left.freq + right.freq,
            symbol: None,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        });
    }
    if let Some(root) = heap.pop() {
        assign_depths(&root, 0, &mut lengths);
    }
    lengths
}

/// Code lengths no longer than [`MAX_CODE_LEN`]. Frequencies are flattened
/// until the tree fits.
pub fn code_lengths(freqs: &[u64; ALPHABET]) -> [u8; ALPHABET] {
    let mut weights = *freqs;
    loop {
        let lengths = tree_lengths(&weights);
        if lengths.iter().all(|&len| len <= MAX_CODE_LEN) {
            return lengths;
        }
        for w in weights.iter_mut().filter(|w| **w > 0) {
            *w = 1 + *w / 2;
        }
    }
}

/// Canonical `(code, length)` per symbol.
fn canonical_codes(lengths: &[u8; ALPHABET]) -> [(u32, u32); ALPHABET] {
    let mut count = [0u32; MAX_CODE_LEN as usize + 1];
    for &len in lengths.iter().filter(|&&len| len > 0) {
        count[len as usize] += 1;
    }
    let mut next = [0u32; MAX_CODE_LEN as usize + 1];
    let mut code = 0u32;
    for len in 1..=MAX_CODE_LEN as usize {
        code = (code + count[len - 1]) << 1;
        next[len] = code;
    }

    let mut codes = [(0u32, 0u32); ALPHABET];
    for (sym, &len) in lengths.iter().enumerate() {
        if len > 0 {
            codes[sym] = (next[len as usize], len as u32);
            next[len as usize] += 1;
        }
    }
    codes
}

/// Canonical decoding tables: codes of each length are consecutive.
struct DecodeTable {
    count: [u32; MAX_CODE_LEN as usize + 1],
    symbols: Vec<u16>,
}

impl DecodeTable {
    fn new(lengths: &[u8; ALPHABET]) -> Result<Self, BscError> {
        let mut count = [0u32; MAX_CODE_LEN as usize + 1];
        for &len in lengths.iter() {
            if len > MAX_CODE_LEN {
                return Err(BscError::DataCorrupt(format!("huffman code length {}", len)));
            }
            if len > 0 {
                count[len as usize] += 1;
            }
        }

        let mut left: i64 = 1;
        for &c in &count[1..] {
            left = (left << 1) - c as i64;
            if left < 0 {
                return Err(BscError::DataCorrupt("over-subscribed huffman table".into()));
            }
        }

        let mut symbols = Vec::with_capacity(ALPHABET);
        for len in 1..=MAX_CODE_LEN {
            for (sym, &l) in lengths.iter().enumerate() {
                if l == len {
                    symbols.push(sym as u16);
                }
            }
        }
        Ok(Self { count, symbols })
    }

    fn decode<R: BitRead>(&self, reader: &mut R) -> Result<u16, BscError> {
        let mut code: i64 = 0;
        let mut first: i64 = 0;
        let mut index: i64 = 0;
        for len in 1..=MAX_CODE_LEN as usize {
            code |= reader.read_bit().map_err(eob)? as i64;
            let count = self.count[len] as i64;
            if code - first < count {
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(BscError::DataCorrupt("invalid huffman code".into()))
    }
}

fn eob(_: io::Error) -> BscError {
    BscError::UnexpectedEob
}

pub fn encode(symbols: &[u16]) -> Result<Vec<u8>, BscError> {
    let mut freqs = [0u64; ALPHABET];
    for &s in symbols {
        freqs[s as usize] += 1;
    }
    let lengths = code_lengths(&freqs);
    let codes = canonical_codes(&lengths);

    let mut output = try_with_capacity(symbols.len() / 2 + 256)?;
    output.extend_from_slice(&(symbols.len() as u32).to_le_bytes());

    let mut writer = BitWriter::endian(output, BigEndian);
    for &len in lengths.iter() {
        writer.write(LEN_BITS, len)?;
    }
    for &s in symbols {
        let (code, len) = codes[s as usize];
        writer.write(len, code)?;
    }
    writer.byte_align()?;
    Ok(writer.into_writer())
}

/// Decodes at most `max_symbols` symbols; a larger stored count is corrupt.
pub fn decode(payload: &[u8], max_symbols: usize) -> Result<Vec<u16>, BscError> {
    if payload.len() < 4 {
        return Err(BscError::UnexpectedEob);
    }
    let count = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    if count > max_symbols {
        return Err(BscError::DataCorrupt(format!("{} coded symbols in a {} byte block", count, max_symbols)));
    }
    let mut reader = BitReader::endian(&payload[4..], BigEndian);

    let mut lengths = [0u8; ALPHABET];
    for len in lengths.iter_mut() {
        *len = reader.read::<u8>(LEN_BITS).map_err(eob)?;
    }
    let table = DecodeTable::new(&lengths)?;

    // Every symbol costs at least one bit.
    if count > (payload.len() - 4) * 8 {
        return Err(BscError::UnexpectedEob);
    }
    let mut symbols = try_with_capacity(count)?;
    for _ in 0..count {
        symbols.push(table.decode(&mut reader)?);
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huffman_roundtrip() {
        let symbols: Vec<u16> = vec![0, 1, 0, 0, 2, 256, 3, 0, 1, 1, 0, 200];
        let payload = encode(&symbols).unwrap();
        assert_eq!(decode(&payload, symbols.len()).unwrap(), symbols);
    }

    #[test]
    fn test_huffman_single_symbol() {
        let symbols = vec![5u16; 1000];
        let payload = encode(&symbols).unwrap();
        // 1 bit per symbol plus the length table.
        assert!(payload.len() < 4 + 170 + 130);
        assert_eq!(decode(&payload, symbols.len()).unwrap(), symbols);
    }

    #[test]
    fn test_huffman_empty() {
        let payload = encode(&[]).unwrap();
        assert!(decode(&payload, 0).unwrap().is_empty());
    }

    #[test]
    fn test_code_lengths_are_limited() {
        // Fibonacci weights force a maximally skewed tree.
        let mut freqs = [0u64; ALPHABET];
        let (mut a, mut b) = (1u64, 1u64);
        for f in freqs.iter_mut().take(40) {
            *f = a;
            let c = a + b;
            a = b;
            b = c;
        }
        let lengths = code_lengths(&freqs);
        assert!(lengths.iter().all(|&l| l <= MAX_CODE_LEN));
        assert!(lengths.iter().take(40).all(|&l| l > 0));

        let symbols: Vec<u16> = (0..40u16).flat_map(|s| std::iter::repeat(s).take(3)).collect();
        let payload = encode(&symbols).unwrap();
        assert_eq!(decode(&payload, symbols.len()).unwrap(), symbols);
    }

    #[test]
    fn test_canonical_codes_are_prefix_free() {
        let mut freqs = [0u64; ALPHABET];
        for (i, f) in freqs.iter_mut().enumerate() {
            *f = (i as u64 % 13) + 1;
        }
        let lengths = code_lengths(&freqs);
        let codes = canonical_codes(&lengths);
        for (i, &(ca, la)) in codes.iter().enumerate() {
            for &(cb, lb) in codes.iter().skip(i + 1) {
                let (short, long, ls, ll) = if la <= lb { (ca, cb, la, lb) } else { (cb, ca, lb, la) };
                assert_ne!(long >> (ll - ls), short, "prefix collision");
            }
        }
    }

    #[test]
    fn test_truncated_payload() {
        let symbols: Vec<u16> = (0..500).map(|i| (i % 17) as u16).collect();
        let payload = encode(&symbols).unwrap();
        assert!(decode(&payload[..payload.len() / 2], symbols.len()).is_err());
        assert!(decode(&payload, 10).is_err());
    }
}
