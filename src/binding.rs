//! Compressor binding
//!
//! The public compress/decompress surface. Input is either a borrowed buffer
//! or any `Read` stream; both go through the same container code and produce
//! identical bytes.

use std::io::Read;
use std::time::Instant;

use tracing::info;

use crate::config::{CompressOptions, DecompressOptions};
use crate::container;
use crate::error::BscError;

/// Data to compress or decompress.
pub enum Input<'a> {
    /// Used in place, no copy.
    Buffer(&'a [u8]),
    /// Read to the end into a new buffer first.
    Stream(&'a mut dyn Read),
}

impl<'a> From<&'a [u8]> for Input<'a> {
    fn from(data: &'a [u8]) -> Self {
        Input::Buffer(data)
    }
}

impl<'a> From<&'a Vec<u8>> for Input<'a> {
    fn from(data: &'a Vec<u8>) -> Self {
        Input::Buffer(data.as_slice())
    }
}

impl<'a> Input<'a> {
    /// Run `f` over the whole input as one contiguous slice.
    fn with_contiguous<T>(self, f: impl FnOnce(&[u8]) -> Result<T, BscError>) -> Result<T, BscError> {
        match self {
            Input::Buffer(data) => f(data),
            Input::Stream(reader) => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                f(&data)
            }
        }
    }
}

/// Run `op` on a dedicated pool of `threads` workers, or on the global pool
/// when `threads` is 0.
fn run_with_threads<T, F>(threads: usize, op: F) -> Result<T, BscError>
where
    T: Send,
    F: FnOnce() -> Result<T, BscError> + Send,
{
    if threads == 0 {
        return op();
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| BscError::BadParameter(format!("cannot start {} threads: {}", threads, e)))?;
    pool.install(op)
}

/// Compress `input` into a `bsc1` container.
pub fn compress(input: Input<'_>, opts: &CompressOptions) -> Result<Vec<u8>, BscError> {
    opts.validate()?;
    input.with_contiguous(|data| {
        let start = Instant::now();
        let out = run_with_threads(opts.num_threads, || container::write(data, opts))?;
        info!(
            input = data.len(),
            output = out.len(),
            coder = opts.coder.level(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "compressed"
        );
        Ok(out)
    })
}

/// Decompress a `bsc1` container. The magic is checked before any block work.
pub fn decompress(input: Input<'_>, opts: &DecompressOptions) -> Result<Vec<u8>, BscError> {
    input.with_contiguous(|data| {
        if !container::has_magic(data) {
            return Err(BscError::InvalidMagic);
        }
        let start = Instant::now();
        let out = run_with_threads(opts.num_threads, || container::read(data))?;
        info!(
            input = data.len(),
            output = out.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "decompressed"
        );
        Ok(out)
    })
}

pub fn compress_slice(data: &[u8], opts: &CompressOptions) -> Result<Vec<u8>, BscError> {
    compress(Input::Buffer(data), opts)
}

pub fn decompress_slice(data: &[u8], opts: &DecompressOptions) -> Result<Vec<u8>, BscError> {
    decompress(Input::Buffer(data), opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::config::Coder;

    #[test]
    fn test_buffer_and_stream_agree() {
        let data = b"stream and buffer input must agree. ".repeat(300);
        let opts = CompressOptions::with_coder(Coder::Fast);
        let from_buffer = compress(Input::from(&data), &opts).unwrap();
        let mut cursor = Cursor::new(data.clone());
        let from_stream = compress(Input::Stream(&mut cursor), &opts).unwrap();
        assert_eq!(from_buffer, from_stream);

        let mut cursor = Cursor::new(from_buffer.clone());
        let restored = decompress(Input::Stream(&mut cursor), &DecompressOptions::default()).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_decompress_checks_magic_first() {
        let opts = DecompressOptions::default();
        assert!(matches!(decompress_slice(b"", &opts), Err(BscError::InvalidMagic)));
        assert!(matches!(decompress_slice(b"bs", &opts), Err(BscError::InvalidMagic)));
        assert!(matches!(decompress_slice(b"plain text", &opts), Err(BscError::InvalidMagic)));
    }

    #[test]
    fn test_dedicated_thread_pool() {
        let data = b"0123456789".repeat(5000);
        let opts = CompressOptions {
            num_threads: 2,
            block_size: 8192,
            ..CompressOptions::default()
        };
        let compressed = compress_slice(&data, &opts).unwrap();
        let restored = decompress_slice(&compressed, &DecompressOptions { num_threads: 3 }).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_stream_read_error_maps_to_io() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            }
        }
        let err = compress(Input::Stream(&mut Failing), &CompressOptions::default()).unwrap_err();
        assert_eq!(err.status(), crate::error::STATUS_IO);
    }
}
