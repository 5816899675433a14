//! Configuration for bsc-service
//!
//! `CompressOptions` names every engine tunable. `ServiceConfig` holds the
//! HTTP layer defaults and can be read from a JSON file.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::BscError;

pub const MB: usize = 1024 * 1024;

/// Largest block the engine accepts. Positions are stored as `u32`.
pub const MAX_BLOCK_SIZE: usize = 1024 * MB;

pub const DEFAULT_BLOCK_SIZE: usize = 10 * MB;
pub const DEFAULT_LZP_HASH_SIZE: u32 = 16;
pub const DEFAULT_LZP_MIN_LEN: u32 = 128;

/// Entropy coder strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Coder {
    /// Canonical Huffman, one table per block.
    Static = 1,
    /// Adaptive range coder with slow, precise statistics.
    Adaptive = 2,
    /// Adaptive range coder tuned for speed.
    Fast = 3,
}

impl Coder {
    pub const ALL: [Coder; 3] = [Coder::Static, Coder::Adaptive, Coder::Fast];

    pub fn level(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Coder {
    type Error = BscError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Coder::Static),
            2 => Ok(Coder::Adaptive),
            3 => Ok(Coder::Fast),
            other => Err(BscError::CoderOutOfRange(other)),
        }
    }
}

impl From<Coder> for i32 {
    fn from(coder: Coder) -> i32 {
        coder.level()
    }
}

/// Block sorting transform. Only the BWT is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockSorter {
    Bwt = 1,
}

impl TryFrom<i32> for BlockSorter {
    type Error = BscError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BlockSorter::Bwt),
            other => Err(BscError::BadParameter(format!("block sorter {}", other))),
        }
    }
}

/// Which side of a symbol forms its sorting context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortingContexts {
    Following = 1,
    /// Blocks are reversed before sorting.
    Preceding = 2,
}

impl TryFrom<u8> for SortingContexts {
    type Error = BscError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SortingContexts::Following),
            2 => Ok(SortingContexts::Preceding),
            other => Err(BscError::NotSupported(format!("sorting contexts {}", other))),
        }
    }
}

/// Parameters for a single compress call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressOptions {
    /// Maximum bytes per block. Each block is sorted independently.
    pub block_size: usize,
    /// 0 = use every available core.
    pub num_threads: usize,
    /// log2 of the LZP hash table size, 0 disables LZP.
    pub lzp_hash_size: u32,
    /// Minimum LZP match length, 0 disables LZP.
    pub lzp_min_len: u32,
    pub block_sorter: BlockSorter,
    pub coder: Coder,
    pub contexts: SortingContexts,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            num_threads: 0,
            lzp_hash_size: DEFAULT_LZP_HASH_SIZE,
            lzp_min_len: DEFAULT_LZP_MIN_LEN,
            block_sorter: BlockSorter::Bwt,
            coder: Coder::Static,
            contexts: SortingContexts::Following,
        }
    }
}

impl CompressOptions {
    pub fn with_coder(coder: Coder) -> Self {
        Self {
            coder,
            ..Self::default()
        }
    }

    pub fn lzp_enabled(&self) -> bool {
        self.lzp_hash_size != 0 && self.lzp_min_len != 0
    }

    pub fn validate(&self) -> Result<(), BscError> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(BscError::BadParameter(format!(
                "block size {} outside 1..={}",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        if self.lzp_hash_size != 0 && !(10..=28).contains(&self.lzp_hash_size) {
            return Err(BscError::BadParameter(format!(
                "lzp hash size {} outside 10..=28",
                self.lzp_hash_size
            )));
        }
        if self.lzp_min_len != 0 && !(4..=255).contains(&self.lzp_min_len) {
            return Err(BscError::BadParameter(format!(
                "lzp min length {} outside 4..=255",
                self.lzp_min_len
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompressOptions {
    /// 0 = use every available core.
    pub num_threads: usize,
}

/// Settings for the HTTP endpoint layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub ping_message: String,
    /// Used when `coder` is missing or outside 1..=3.
    pub default_coder: Coder,
    /// Used when `blockSize` is missing or outside 1..=max_block_size_mb.
    pub default_block_size_mb: usize,
    pub max_block_size_mb: usize,
    pub max_body_bytes: usize,
    pub num_threads: usize,
    pub lzp_hash_size: u32,
    pub lzp_min_len: u32,
    /// flate2 level used for gzip responses.
    pub gzip_level: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7071".to_string(),
            ping_message: "Welcome to the BSC compression service!".to_string(),
            default_coder: Coder::Static,
            default_block_size_mb: 25,
            max_block_size_mb: 150,
            max_body_bytes: 512 * MB,
            num_threads: 0,
            lzp_hash_size: DEFAULT_LZP_HASH_SIZE,
            lzp_min_len: DEFAULT_LZP_MIN_LEN,
            gzip_level: 1,
        }
    }
}

impl ServiceConfig {
    /// Load a config file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ServiceConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Check that every request built from this config passes
    /// [`CompressOptions::validate`].
    pub fn validate(&self) -> Result<(), BscError> {
        if self.max_block_size_mb == 0 || self.max_block_size_mb > MAX_BLOCK_SIZE / MB {
            return Err(BscError::BadParameter(format!(
                "max_block_size_mb {} outside 1..={}",
                self.max_block_size_mb,
                MAX_BLOCK_SIZE / MB
            )));
        }
        if self.default_block_size_mb == 0 || self.default_block_size_mb > self.max_block_size_mb {
            return Err(BscError::BadParameter(format!(
                "default_block_size_mb {} outside 1..={}",
                self.default_block_size_mb, self.max_block_size_mb
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(BscError::BadParameter("max_body_bytes is 0".into()));
        }
        if self.gzip_level > 9 {
            return Err(BscError::BadParameter(format!("gzip_level {} above 9", self.gzip_level)));
        }
        self.compress_options(self.default_coder, self.max_block_size_mb)
            .validate()
    }

    /// Engine options for one compress request.
    pub fn compress_options(&self, coder: Coder, block_size_mb: usize) -> CompressOptions {
        CompressOptions {
            block_size: block_size_mb * MB,
            num_threads: self.num_threads,
            lzp_hash_size: self.lzp_hash_size,
            lzp_min_len: self.lzp_min_len,
            block_sorter: BlockSorter::Bwt,
            coder,
            contexts: SortingContexts::Following,
        }
    }
}
