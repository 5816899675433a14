//! `bsc1` multi-block container
//!
//! ```text
//! "bsc1" | i32 block count | block frame*
//! block frame: u64 offset | i8 record size | i8 sorting contexts | engine block
//! ```
//!
//! All integers are little endian. Blocks are compressed and decompressed in
//! parallel on the current rayon pool; frames are always written in input
//! order.

use rayon::prelude::*;
use tracing::debug;

use crate::config::{CompressOptions, SortingContexts};
use crate::engine::{self, try_with_capacity, BLOCK_HEADER_SIZE};
use crate::error::BscError;

pub const MAGIC: [u8; 4] = *b"bsc1";
pub const CONTAINER_HEADER_SIZE: usize = 8;
pub const FRAME_HEADER_SIZE: usize = 10;

const RECORD_SIZE: u8 = 1;

pub fn has_magic(data: &[u8]) -> bool {
    data.len() >= MAGIC.len() && data[..MAGIC.len()] == MAGIC
}

fn compress_chunk(chunk: &[u8], opts: &CompressOptions) -> Result<Vec<u8>, BscError> {
    match opts.contexts {
        SortingContexts::Following => engine::compress_block(chunk, opts),
        SortingContexts::Preceding => {
            let mut reversed: Vec<u8> = try_with_capacity(chunk.len())?;
            reversed.extend(chunk.iter().rev());
            engine::compress_block(&reversed, opts)
        }
    }
}

/// Split `input` into blocks of `opts.block_size` bytes and compress them.
pub fn write(input: &[u8], opts: &CompressOptions) -> Result<Vec<u8>, BscError> {
    opts.validate()?;

    let chunks: Vec<&[u8]> = input.chunks(opts.block_size).collect();
    if chunks.len() > i32::MAX as usize {
        return Err(BscError::BadParameter(format!("{} blocks", chunks.len())));
    }

    let blocks: Vec<Vec<u8>> = chunks
        .par_iter()
        .map(|chunk| compress_chunk(chunk, opts))
        .collect::<Result<Vec<_>, _>>()?;

    let total = CONTAINER_HEADER_SIZE + blocks.iter().map(|b| FRAME_HEADER_SIZE + b.len()).sum::<usize>();
    let mut out = try_with_capacity(total)?;
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&(blocks.len() as i32).to_le_bytes());

    for (index, block) in blocks.iter().enumerate() {
        let offset = (index * opts.block_size) as u64;
        out.extend_from_slice(&offset.to_le_bytes());
        out.push(RECORD_SIZE);
        out.push(opts.contexts as u8);
        out.extend_from_slice(block);
    }

    debug!(blocks = blocks.len(), input = input.len(), output = out.len(), "container written");
    Ok(out)
}

struct Frame<'a> {
    offset: u64,
    contexts: SortingContexts,
    block: &'a [u8],
    data_size: usize,
}

fn parse_frames(data: &[u8]) -> Result<Vec<Frame<'_>>, BscError> {
    if !has_magic(data) {
        return Err(BscError::InvalidMagic);
    }
    if data.len() < CONTAINER_HEADER_SIZE {
        return Err(BscError::UnexpectedEob);
    }
    let count = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if count < 0 {
        return Err(BscError::DataCorrupt(format!("block count {}", count)));
    }

    let mut frames = Vec::new();
    let mut pos = CONTAINER_HEADER_SIZE;
    for _ in 0..count {
        let frame = data.get(pos..).unwrap_or_default();
        if frame.len() < FRAME_HEADER_SIZE + BLOCK_HEADER_SIZE {
            return Err(BscError::UnexpectedEob);
        }
        let offset = u64::from_le_bytes([
            frame[0], frame[1], frame[2], frame[3], frame[4], frame[5], frame[6], frame[7],
        ]);
        let record_size = frame[8];
        if record_size != RECORD_SIZE {
            return Err(BscError::NotSupported(format!("record size {}", record_size as i8)));
        }
        let contexts = SortingContexts::try_from(frame[9])?;

        let block_start = FRAME_HEADER_SIZE;
        let (block_size, data_size) = engine::block_info(&frame[block_start..])?;
        let block_end = block_start + block_size;
        if block_end > frame.len() {
            return Err(BscError::UnexpectedEob);
        }

        frames.push(Frame {
            offset,
            contexts,
            block: &frame[block_start..block_end],
            data_size,
        });
        pos += block_end;
    }

    if pos != data.len() {
        return Err(BscError::DataCorrupt(format!("{} trailing bytes", data.len() - pos)));
    }
    Ok(frames)
}

/// Decode a complete container.
///
/// Blocks are decoded before the output is assembled, so sizes claimed by
/// headers never drive an allocation on their own.
pub fn read(data: &[u8]) -> Result<Vec<u8>, BscError> {
    let frames = parse_frames(data)?;

    let mut expected = 0u64;
    for frame in &frames {
        if frame.offset != expected {
            return Err(BscError::DataCorrupt(format!(
                "block offset {} where {} was expected",
                frame.offset, expected
            )));
        }
        expected += frame.data_size as u64;
    }

    let blocks: Vec<Vec<u8>> = frames
        .par_iter()
        .map(|frame| -> Result<Vec<u8>, BscError> {
            let mut decoded = engine::decompress_block(frame.block)?;
            if decoded.len() != frame.data_size {
                return Err(BscError::DataCorrupt("block size mismatch".into()));
            }
            if frame.contexts == SortingContexts::Preceding {
                decoded.reverse();
            }
            Ok(decoded)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let out = if blocks.len() == 1 {
        blocks.into_iter().next().unwrap_or_default()
    } else {
        let total = blocks.iter().map(Vec::len).sum();
        let mut out = try_with_capacity(total)?;
        for block in blocks {
            out.extend_from_slice(&block);
        }
        out
    };

    debug!(blocks = frames.len(), output = out.len(), "container read");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Coder;

    fn sample() -> Vec<u8> {
        (0..20_000u32).map(|i| b"abcdefgh"[(i as usize * 7 + i as usize / 13) % 8]).collect()
    }

    fn small_blocks(coder: Coder) -> CompressOptions {
        CompressOptions {
            block_size: 4096,
            ..CompressOptions::with_coder(coder)
        }
    }

    #[test]
    fn test_header_layout() {
        let data = sample();
        let container = write(&data, &small_blocks(Coder::Static)).unwrap();
        assert_eq!(&container[..4], b"bsc1");
        assert_eq!(i32::from_le_bytes(container[4..8].try_into().unwrap()), 5);
        // First frame: offset 0, record size 1, following contexts.
        assert_eq!(&container[8..16], &0u64.to_le_bytes());
        assert_eq!(container[16], 1);
        assert_eq!(container[17], 1);
        let (block_size, data_size) = engine::block_info(&container[18..]).unwrap();
        assert_eq!(data_size, 4096);
        // Second frame starts right after the first block.
        let second = 18 + block_size;
        assert_eq!(&container[second..second + 8], &4096u64.to_le_bytes());
    }

    #[test]
    fn test_multi_block_roundtrip() {
        let data = sample();
        for coder in Coder::ALL {
            let container = write(&data, &small_blocks(coder)).unwrap();
            assert_eq!(read(&container).unwrap(), data);
        }
    }

    #[test]
    fn test_preceding_contexts() {
        let data = sample();
        let opts = CompressOptions {
            contexts: SortingContexts::Preceding,
            ..small_blocks(Coder::Adaptive)
        };
        let container = write(&data, &opts).unwrap();
        assert_eq!(container[17], 2);
        assert_eq!(read(&container).unwrap(), data);
    }

    #[test]
    fn test_empty_input() {
        let container = write(b"", &CompressOptions::default()).unwrap();
        assert_eq!(container, b"bsc1\0\0\0\0".to_vec());
        assert!(read(&container).unwrap().is_empty());
    }

    #[test]
    fn test_read_rejects_missing_magic() {
        assert!(matches!(read(b"bsc"), Err(BscError::InvalidMagic)));
        assert!(matches!(read(b"BSC1\0\0\0\0"), Err(BscError::InvalidMagic)));
        assert!(matches!(read(b"bsc1\0\0"), Err(BscError::UnexpectedEob)));
    }

    #[test]
    fn test_read_rejects_bad_frames() {
        let data = sample();
        let container = write(&data, &small_blocks(Coder::Static)).unwrap();

        let mut bad_record = container.clone();
        bad_record[16] = 4;
        assert!(matches!(read(&bad_record), Err(BscError::NotSupported(_))));

        let mut bad_contexts = container.clone();
        bad_contexts[17] = 0;
        assert!(matches!(read(&bad_contexts), Err(BscError::NotSupported(_))));

        let mut bad_offset = container.clone();
        bad_offset[8] = 1;
        assert!(matches!(read(&bad_offset), Err(BscError::DataCorrupt(_))));

        let mut negative = container.clone();
        negative[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(read(&negative), Err(BscError::DataCorrupt(_))));

        let mut trailing = container.clone();
        trailing.push(0);
        assert!(matches!(read(&trailing), Err(BscError::DataCorrupt(_))));

        assert!(matches!(
            read(&container[..container.len() - 1]),
            Err(BscError::UnexpectedEob)
        ));
    }

    #[test]
    fn test_read_rejects_inflated_stored_frame_without_allocating() {
        // One frame whose stored header claims 768 MiB behind an empty payload.
        let mut container = MAGIC.to_vec();
        container.extend_from_slice(&1i32.to_le_bytes());
        container.extend_from_slice(&0u64.to_le_bytes());
        container.extend_from_slice(&[RECORD_SIZE, SortingContexts::Following as u8]);
        engine::BlockHeader {
            block_size: BLOCK_HEADER_SIZE as u32,
            data_size: 768 * 1024 * 1024,
            sorter: 1,
            ..engine::BlockHeader::default()
        }
        .write_to(&mut container);
        assert_eq!(container.len(), 46);

        let started = std::time::Instant::now();
        assert!(matches!(read(&container), Err(BscError::DataCorrupt(_))));
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
    }

    #[test]
    fn test_read_decodes_before_trusting_sizes() {
        let data = sample();
        let mut container = write(&data, &small_blocks(Coder::Adaptive)).unwrap();
        // Claim one byte more for the first block than it decodes to.
        let data_size_at = CONTAINER_HEADER_SIZE + FRAME_HEADER_SIZE + 4;
        let claimed = u32::from_le_bytes(container[data_size_at..data_size_at + 4].try_into().unwrap());
        container[data_size_at..data_size_at + 4].copy_from_slice(&(claimed + 1).to_le_bytes());
        assert!(read(&container).is_err());
    }

    #[test]
    fn test_write_validates_options() {
        let opts = CompressOptions {
            block_size: 0,
            ..CompressOptions::default()
        };
        assert!(matches!(write(b"abc", &opts), Err(BscError::BadParameter(_))));
    }
}
