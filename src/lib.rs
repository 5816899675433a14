//! bsc-service: block-sorting compression behind a small HTTP service.
//!
//! Layers, bottom up:
//! - `engine`: LZP, Burrows-Wheeler sorting, MTF and entropy coding for one block
//! - `container`: the `bsc1` multi-block format, blocks coded in parallel
//! - `binding`: compress/decompress over buffers or streams
//! - `service` / `server`: PING, COMPRESS and DECOMPRESS over HTTP/1.1
//! - `client` / `console`: a remote client and an interactive file harness

pub mod binding;
pub mod client;
pub mod config;
pub mod console;
pub mod container;
pub mod engine;
pub mod error;
pub mod server;
pub mod service;

pub use crate::binding::{compress, compress_slice, decompress, decompress_slice, Input};
pub use crate::config::{BlockSorter, Coder, CompressOptions, DecompressOptions, ServiceConfig, SortingContexts};
pub use crate::error::{BscError, ClientError, ServiceError};
