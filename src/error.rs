//! Error types for bsc-service

use thiserror::Error;

/// Engine and binding errors. Every variant has a stable negative status
/// code, see [`BscError::status`].
#[derive(Error, Debug)]
pub enum BscError {
    #[error("bad parameter: {0}")]
    BadParameter(String),

    #[error("not enough memory to allocate {0} bytes")]
    NotEnoughMemory(usize),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("unexpected end of block")]
    UnexpectedEob,

    #[error("data corrupt: {0}")]
    DataCorrupt(String),

    #[error("compression level {0} unsupported, accepted values are 1, 2, 3")]
    CoderOutOfRange(i32),

    #[error("input does not contain BSC compressed data, expected header 'bsc1'")]
    InvalidMagic,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub const STATUS_BAD_PARAMETER: i32 = -1;
pub const STATUS_NOT_ENOUGH_MEMORY: i32 = -2;
pub const STATUS_NOT_SUPPORTED: i32 = -4;
pub const STATUS_UNEXPECTED_EOB: i32 = -5;
pub const STATUS_DATA_CORRUPT: i32 = -6;
pub const STATUS_COMPLVL_OUTRANGE: i32 = -20;
pub const STATUS_INVALID_MAGIC: i32 = -22;
pub const STATUS_IO: i32 = -23;

impl BscError {
    /// Negative status code for this error.
    pub fn status(&self) -> i32 {
        match self {
            BscError::BadParameter(_) => STATUS_BAD_PARAMETER,
            BscError::NotEnoughMemory(_) => STATUS_NOT_ENOUGH_MEMORY,
            BscError::NotSupported(_) => STATUS_NOT_SUPPORTED,
            BscError::UnexpectedEob => STATUS_UNEXPECTED_EOB,
            BscError::DataCorrupt(_) => STATUS_DATA_CORRUPT,
            BscError::CoderOutOfRange(_) => STATUS_COMPLVL_OUTRANGE,
            BscError::InvalidMagic => STATUS_INVALID_MAGIC,
            BscError::Io(_) => STATUS_IO,
        }
    }

    /// True for errors raised before any engine work was done.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BscError::BadParameter(_) | BscError::CoderOutOfRange(_) | BscError::InvalidMagic
        )
    }
}

/// Errors produced by the HTTP endpoint layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Empty request body.")]
    EmptyBody,

    #[error("Invalid gzip data.")]
    InvalidGzip,

    #[error("Input data is already compressed.")]
    AlreadyCompressed,

    #[error("Input does not contain BSC compressed data, expected header 'bsc1'.")]
    MissingMagic,

    #[error("Request body exceeds {0} bytes.")]
    PayloadTooLarge(usize),

    #[error("Error thrown during compression : {}", .0.status())]
    Compression(BscError),

    #[error("Error code thrown during decompression : {}", .0.status())]
    Decompression(BscError),

    #[error("Internal server error : {0}")]
    Internal(String),
}

impl ServiceError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            ServiceError::EmptyBody
            | ServiceError::InvalidGzip
            | ServiceError::AlreadyCompressed
            | ServiceError::MissingMagic => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Compression(_) | ServiceError::Decompression(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors returned by [`crate::client::RemoteCompressor`].
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
