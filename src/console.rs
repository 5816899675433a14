//! Interactive console harness
//!
//! Asks for a file to compress, writes `<file>.bsc`, then asks for a file to
//! decompress and writes it next to the input with a `.dec` extension. Sizes
//! and timings are printed along the way. Any missing file or engine failure
//! ends the session.

use std::fs::{self, File};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::binding::{self, Input};
use crate::config::{Coder, CompressOptions, DecompressOptions};
use crate::error::BscError;

pub const CONSOLE_CODER: Coder = Coder::Adaptive;

/// Read one line and resolve it to an existing file.
fn read_path<R: BufRead>(input: &mut R) -> std::io::Result<Option<PathBuf>> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let trimmed = line.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Ok(None);
    }
    let path = PathBuf::from(trimmed);
    Ok(path.is_file().then_some(path))
}

fn compressed_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".bsc");
    PathBuf::from(name)
}

fn compress_file(input: &Path, output: &Path) -> Result<u64, BscError> {
    let mut file = File::open(input)?;
    let compressed = binding::compress(Input::Stream(&mut file), &CompressOptions::with_coder(CONSOLE_CODER))?;
    fs::write(output, &compressed)?;
    Ok(compressed.len() as u64)
}

fn decompress_file(input: &Path, output: &Path) -> Result<u64, BscError> {
    let mut file = File::open(input)?;
    let restored = binding::decompress(Input::Stream(&mut file), &DecompressOptions::default())?;
    fs::write(output, &restored)?;
    Ok(restored.len() as u64)
}

pub fn run<R: BufRead, W: Write>(mut input: R, mut out: W) -> anyhow::Result<()> {
    write!(out, "Enter a file path to compress: ")?;
    out.flush()?;
    let Some(source) = read_path(&mut input)? else {
        writeln!(out, "Input file not found.")?;
        return Ok(());
    };
    let target = compressed_path(&source);
    writeln!(out, "Original file: {} bytes", fs::metadata(&source)?.len())?;

    let start = Instant::now();
    match compress_file(&source, &target) {
        Ok(size) => writeln!(out, "Compressed size: {} bytes", size)?,
        Err(BscError::Io(err)) => {
            writeln!(out, "Error during compression: {}", err)?;
            return Ok(());
        }
        Err(err) => {
            writeln!(out, "Compression failed with code: {}", err.status())?;
            return Ok(());
        }
    }
    writeln!(out, "Compression took: {} ms", start.elapsed().as_millis())?;
    writeln!(out, "File saved to: {}", target.display())?;

    write!(out, "\nEnter file path to decompress: ")?;
    out.flush()?;
    let Some(source) = read_path(&mut input)? else {
        writeln!(out, "Input file not found.")?;
        return Ok(());
    };
    let target = source.with_extension("dec");

    let start = Instant::now();
    match decompress_file(&source, &target) {
        Ok(size) => writeln!(out, "Decompressed size: {} bytes", size)?,
        Err(BscError::Io(err)) => {
            writeln!(out, "Error during decompression: {}", err)?;
            return Ok(());
        }
        Err(err) => {
            writeln!(out, "Decompression failed with code: {}", err.status())?;
            return Ok(());
        }
    }
    writeln!(out, "Decompression took: {} ms", start.elapsed().as_millis())?;
    writeln!(out, "File saved to: {}", target.display())?;
    Ok(())
}
