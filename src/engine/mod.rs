//! Block-sorting compression engine
//!
//! One block at a time: optional LZP, Burrows-Wheeler transform, move-to-front
//! with zero-run coding, then one of three entropy coders. Every compressed
//! block starts with a fixed 28-byte header that records how it was built, so
//! a block can be decoded without any outside parameters.

pub mod bwt;
pub mod entropy;
pub mod huffman;
pub mod lzp;
pub mod mtf;

use tracing::debug;

use crate::config::{CompressOptions, Coder, MAX_BLOCK_SIZE};
use crate::error::BscError;

use self::entropy::ModelParams;

pub const BLOCK_HEADER_SIZE: usize = 28;

/// LZP is skipped below this size; there is no context to predict from.
const LZP_MIN_INPUT: usize = 64;

const MODE_STORED: u8 = 0;
const SORTER_BWT: u8 = 1;

pub(crate) fn try_with_capacity<T>(capacity: usize) -> Result<Vec<T>, BscError> {
    let mut v = Vec::new();
    v.try_reserve_exact(capacity)
        .map_err(|_| BscError::NotEnoughMemory(capacity.saturating_mul(std::mem::size_of::<T>())))?;
    Ok(v)
}

pub(crate) fn try_vec<T: Clone>(len: usize, value: T) -> Result<Vec<T>, BscError> {
    let mut v = try_with_capacity(len)?;
    v.resize(len, value);
    Ok(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    /// Header plus payload.
    pub block_size: u32,
    pub data_size: u32,
    pub crc32: u32,
    /// 0 stored, otherwise the coder level.
    pub mode: u8,
    pub sorter: u8,
    /// 0 when LZP was not applied.
    pub lzp_hash_bits: u8,
    pub lzp_min_len: u8,
    pub lzp_escape: u8,
    pub primary: u32,
    /// Length of the buffer fed to the BWT.
    pub sorted_len: u32,
}

impl BlockHeader {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.block_size.to_le_bytes());
        out.extend_from_slice(&self.data_size.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&[
            self.mode,
            self.sorter,
            self.lzp_hash_bits,
            self.lzp_min_len,
            self.lzp_escape,
            0,
            0,
            0,
        ]);
        out.extend_from_slice(&self.primary.to_le_bytes());
        out.extend_from_slice(&self.sorted_len.to_le_bytes());
    }

    pub fn parse(data: &[u8]) -> Result<Self, BscError> {
        if data.len() < BLOCK_HEADER_SIZE {
            return Err(BscError::UnexpectedEob);
        }
        let u32_at = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let header = BlockHeader {
            block_size: u32_at(0),
            data_size: u32_at(4),
            crc32: u32_at(8),
            mode: data[12],
            sorter: data[13],
            lzp_hash_bits: data[14],
            lzp_min_len: data[15],
            lzp_escape: data[16],
            primary: u32_at(20),
            sorted_len: u32_at(24),
        };
        let block_size = header.block_size as usize;
        let data_size = header.data_size as usize;
        if block_size < BLOCK_HEADER_SIZE {
            return Err(BscError::DataCorrupt(format!("block size {}", block_size)));
        }
        if data_size > MAX_BLOCK_SIZE {
            return Err(BscError::DataCorrupt(format!("block data size {}", data_size)));
        }
        if header.mode == MODE_STORED {
            if block_size - BLOCK_HEADER_SIZE != data_size {
                return Err(BscError::DataCorrupt("stored block size mismatch".into()));
            }
        } else if header.sorted_len > header.data_size {
            // LZP only ever shrinks the sorted buffer.
            return Err(BscError::DataCorrupt(format!(
                "sorted length {} exceeds data size {}",
                header.sorted_len, data_size
            )));
        }
        Ok(header)
    }
}

/// `(block_size, data_size)` of the block at the start of `data`.
pub fn block_info(data: &[u8]) -> Result<(usize, usize), BscError> {
    let header = BlockHeader::parse(data)?;
    Ok((header.block_size as usize, header.data_size as usize))
}

fn model_for(coder: Coder) -> Option<ModelParams> {
    match coder {
        Coder::Static => None,
        Coder::Adaptive => Some(ModelParams::ADAPTIVE),
        Coder::Fast => Some(ModelParams::FAST),
    }
}

fn stored_block(input: &[u8], crc32: u32) -> Result<Vec<u8>, BscError> {
    let mut out = try_with_capacity(BLOCK_HEADER_SIZE + input.len())?;
    BlockHeader {
        block_size: (BLOCK_HEADER_SIZE + input.len()) as u32,
        data_size: input.len() as u32,
        crc32,
        mode: MODE_STORED,
        sorter: SORTER_BWT,
        sorted_len: input.len() as u32,
        ..BlockHeader::default()
    }
    .write_to(&mut out);
    out.extend_from_slice(input);
    Ok(out)
}

/// Compress one block. Options are assumed validated.
pub fn compress_block(input: &[u8], opts: &CompressOptions) -> Result<Vec<u8>, BscError> {
    if input.len() > u32::MAX as usize - BLOCK_HEADER_SIZE {
        return Err(BscError::BadParameter(format!("block of {} bytes", input.len())));
    }
    let crc32 = crc32fast::hash(input);

    let mut header = BlockHeader {
        crc32,
        data_size: input.len() as u32,
        mode: opts.coder.level() as u8,
        sorter: SORTER_BWT,
        ..BlockHeader::default()
    };

    let preprocessed = if opts.lzp_enabled() && input.len() >= LZP_MIN_INPUT {
        let escape = lzp::pick_escape(input);
        let min_len = opts.lzp_min_len as usize;
        let encoded = lzp::encode(input, opts.lzp_hash_size, min_len, escape)?;
        if encoded.len() < input.len() {
            header.lzp_hash_bits = opts.lzp_hash_size as u8;
            header.lzp_min_len = opts.lzp_min_len as u8;
            header.lzp_escape = escape;
            Some(encoded)
        } else {
            None
        }
    } else {
        None
    };
    let sorted_input = preprocessed.as_deref().unwrap_or(input);

    let (primary, transformed) = bwt::forward(sorted_input)?;
    let symbols = mtf::encode(&transformed);
    drop(transformed);

    let payload = match model_for(opts.coder) {
        None => huffman::encode(&symbols)?,
        Some(params) => entropy::encode(&symbols, &params)?,
    };

    if payload.len() >= input.len() {
        debug!(size = input.len(), "block not compressible, storing");
        return stored_block(input, crc32);
    }

    header.primary = primary;
    header.sorted_len = sorted_input.len() as u32;
    header.block_size = (BLOCK_HEADER_SIZE + payload.len()) as u32;

    let mut out = try_with_capacity(BLOCK_HEADER_SIZE + payload.len())?;
    header.write_to(&mut out);
    out.extend_from_slice(&payload);

    debug!(
        input = input.len(),
        output = out.len(),
        lzp = header.lzp_hash_bits != 0,
        coder = opts.coder.level(),
        "block compressed"
    );
    Ok(out)
}

/// Decompress one block produced by [`compress_block`]. `block` must hold
/// exactly one block.
pub fn decompress_block(block: &[u8]) -> Result<Vec<u8>, BscError> {
    let header = BlockHeader::parse(block)?;
    let block_size = header.block_size as usize;
    if block.len() < block_size {
        return Err(BscError::UnexpectedEob);
    }
    if block.len() > block_size {
        return Err(BscError::DataCorrupt("trailing bytes after block".into()));
    }
    let payload = &block[BLOCK_HEADER_SIZE..];
    let data_size = header.data_size as usize;

    let data = if header.mode == MODE_STORED {
        if payload.len() != data_size {
            return Err(BscError::DataCorrupt("stored block size mismatch".into()));
        }
        payload.to_vec()
    } else {
        if header.sorter != SORTER_BWT {
            return Err(BscError::NotSupported(format!("block sorter {}", header.sorter)));
        }
        let coder = Coder::try_from(i32::from(header.mode))
            .map_err(|_| BscError::NotSupported(format!("coder mode {}", header.mode)))?;

        let sorted_len = header.sorted_len as usize;
        let symbols = match model_for(coder) {
            None => huffman::decode(payload, sorted_len)?,
            Some(params) => entropy::decode(payload, &params, sorted_len)?,
        };
        let transformed = mtf::decode(&symbols, sorted_len)?;
        drop(symbols);
        let sorted = bwt::inverse(&transformed, header.primary)?;

        if header.lzp_hash_bits == 0 {
            if sorted.len() != data_size {
                return Err(BscError::DataCorrupt("block size mismatch".into()));
            }
            sorted
        } else {
            let bits = u32::from(header.lzp_hash_bits);
            let min_len = header.lzp_min_len as usize;
            if !(10..=28).contains(&bits) || !(4..=255).contains(&min_len) {
                return Err(BscError::DataCorrupt("invalid lzp parameters".into()));
            }
            lzp::decode(&sorted, bits, min_len, header.lzp_escape, data_size)?
        }
    };

    if crc32fast::hash(&data) != header.crc32 {
        return Err(BscError::DataCorrupt("crc32 mismatch".into()));
    }
    Ok(data)
}
