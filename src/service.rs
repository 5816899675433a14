//! HTTP endpoint layer
//!
//! Three routes, PING, COMPRESS and DECOMPRESS, handled synchronously on a
//! fully buffered request. The handler knows nothing about sockets; see
//! [`crate::server`] for the hyper side.
//!
//! Paths match case-insensitively, with or without an `/api` prefix.

use std::borrow::Cow;
use std::convert::Infallible;
use std::io::{Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, ALLOW, CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_TYPE, VARY,
};
use http::{Method, Request, Response, StatusCode};
use hyper::body::{Body, Frame, SizeHint};
use tracing::{info, warn};

use crate::binding::{self, Input};
use crate::config::{Coder, DecompressOptions, ServiceConfig, MB};
use crate::container;
use crate::error::ServiceError;

const GZIP_ID: [u8; 2] = [0x1f, 0x8b];

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// A fully buffered response body.
///
/// The exact length is only advertised for bodies sent with a
/// `Content-Length`; gzip-encoded bodies go out chunked.
#[derive(Debug, Clone)]
pub struct ResponseBody {
    data: Option<Bytes>,
    len: usize,
    sized: bool,
}

impl ResponseBody {
    pub fn sized(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            len: data.len(),
            data: Some(data),
            sized: true,
        }
    }

    pub fn chunked(data: impl Into<Bytes>) -> Self {
        Self {
            sized: false,
            ..Self::sized(data)
        }
    }

    pub fn is_sized(&self) -> bool {
        self.sized
    }

    /// Remaining bytes, empty once the body has been polled.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let data = self.get_mut().data.take().filter(|d| !d.is_empty());
        Poll::Ready(data.map(|d| Ok(Frame::data(d))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.as_ref().map_or(true, Bytes::is_empty)
    }

    fn size_hint(&self) -> SizeHint {
        if self.sized {
            SizeHint::with_exact(self.len as u64)
        } else {
            SizeHint::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Ping,
    Compress,
    Decompress,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.trim_end_matches('/').to_ascii_lowercase();
        let name = path.strip_prefix("/api").unwrap_or(&path);
        match name {
            "/ping" => Some(Route::Ping),
            "/compress" => Some(Route::Compress),
            "/decompress" => Some(Route::Decompress),
            _ => None,
        }
    }

    fn allows(self, method: &Method) -> bool {
        match self {
            Route::Ping => *method == Method::GET || *method == Method::POST,
            Route::Compress | Route::Decompress => *method == Method::POST,
        }
    }

    fn allow_header(self) -> &'static str {
        match self {
            Route::Ping => "GET, POST",
            Route::Compress | Route::Decompress => "POST",
        }
    }
}

/// First value of `name` in a query string. Keys match case-insensitively.
pub fn query_param<'q>(query: Option<&'q str>, name: &str) -> Option<&'q str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

/// COMPRESS query parameters after defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressParams {
    pub coder: Coder,
    pub block_size_mb: usize,
}

impl CompressParams {
    /// Missing, unparseable or out-of-range values fall back to the configured
    /// defaults rather than failing the request.
    pub fn from_query(query: Option<&str>, config: &ServiceConfig) -> Self {
        let coder = query_param(query, "coder")
            .and_then(|v| v.trim().parse::<i32>().ok())
            .and_then(|v| Coder::try_from(v).ok())
            .unwrap_or(config.default_coder);

        let block_size_mb = query_param(query, "blockSize")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|mb| (1..=config.max_block_size_mb).contains(mb))
            .unwrap_or(config.default_block_size_mb);

        Self { coder, block_size_mb }
    }
}

pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_ID)
}

/// Inflate a gzip body. Output past `limit` bytes is refused.
fn gunzip(data: &[u8], limit: usize) -> Result<Vec<u8>, ServiceError> {
    let mut out = Vec::new();
    MultiGzDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|_| ServiceError::InvalidGzip)?;
    if out.len() > limit {
        return Err(ServiceError::PayloadTooLarge(limit));
    }
    Ok(out)
}

fn gzip(data: &[u8], level: u32) -> Result<Vec<u8>, ServiceError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    encoder.finish().map_err(|e| ServiceError::Internal(e.to_string()))
}

/// True when `Accept-Encoding` allows gzip: listed as gzip or x-gzip with a
/// non-zero quality, or covered by `*` when gzip itself is not listed.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    let mut gzip: Option<f32> = None;
    let mut wildcard: Option<f32> = None;
    for item in headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
    {
        let mut parts = item.split(';');
        let coding = parts.next().unwrap_or("").trim();
        // Unparseable quality counts as refusal.
        let quality = parts
            .filter_map(|p| p.trim().split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("q"))
            .map_or(Some(1.0), |(_, q)| q.trim().parse::<f32>().ok())
            .unwrap_or(0.0);
        if coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip") {
            gzip = Some(gzip.map_or(quality, |q| q.max(quality)));
        } else if coding == "*" {
            wildcard = Some(wildcard.map_or(quality, |q| q.max(quality)));
        }
    }
    gzip.or(wildcard).map_or(false, |q| q > 0.0)
}

fn text(status: StatusCode, message: impl Into<String>) -> Response<ResponseBody> {
    let body = Bytes::from(message.into());
    let mut resp = Response::new(ResponseBody::sized(body.clone()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    resp.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
    resp
}

fn attachment(data: Vec<u8>, filename: &'static str, gzip_encoded: bool) -> Response<ResponseBody> {
    let len = data.len() as u64;
    let body = if gzip_encoded {
        ResponseBody::chunked(data)
    } else {
        ResponseBody::sized(data)
    };
    let mut resp = Response::new(body);
    let headers = resp.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
    let disposition = format!("attachment; filename=\"{}\"", filename);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if gzip_encoded {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
    } else {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    resp
}

pub fn error_response(err: &ServiceError) -> Response<ResponseBody> {
    let status = err.status_code();
    if status.is_server_error() {
        warn!(%status, error = %err, "request failed");
    } else {
        info!(%status, error = %err, "request rejected");
    }
    text(status, err.to_string())
}

fn compress(config: &ServiceConfig, req: &Request<Bytes>) -> Result<Response<ResponseBody>, ServiceError> {
    info!("compress requested");
    let params = CompressParams::from_query(req.uri().query(), config);

    let body = req.body();
    if body.is_empty() {
        return Err(ServiceError::EmptyBody);
    }
    let input: Cow<'_, [u8]> = if is_gzip(body) {
        Cow::Owned(gunzip(body, config.max_body_bytes)?)
    } else {
        Cow::Borrowed(&body[..])
    };
    if input.is_empty() {
        return Err(ServiceError::EmptyBody);
    }
    if container::has_magic(&input) {
        return Err(ServiceError::AlreadyCompressed);
    }

    info!(
        input = input.len(),
        coder = params.coder.level(),
        block_size = params.block_size_mb * MB,
        "compressing"
    );
    let opts = config.compress_options(params.coder, params.block_size_mb);
    let out = binding::compress(Input::Buffer(&input), &opts).map_err(ServiceError::Compression)?;
    info!(output = out.len(), "compression succeeded");

    Ok(attachment(out, "compressed-data.bsc", false))
}

fn decompress(config: &ServiceConfig, req: &Request<Bytes>) -> Result<Response<ResponseBody>, ServiceError> {
    info!("decompress requested");
    let body = req.body();
    if body.is_empty() {
        return Err(ServiceError::EmptyBody);
    }
    if !container::has_magic(body) {
        return Err(ServiceError::MissingMagic);
    }

    info!(input = body.len(), "decompressing");
    let opts = DecompressOptions {
        num_threads: config.num_threads,
    };
    let out = binding::decompress(Input::Buffer(body), &opts).map_err(ServiceError::Decompression)?;
    info!(output = out.len(), "decompression succeeded");

    if accepts_gzip(req.headers()) {
        let encoded = gzip(&out, config.gzip_level)?;
        Ok(attachment(encoded, "decompressed-data.gz", true))
    } else {
        Ok(attachment(out, "decompressed-data", false))
    }
}

/// Handle one buffered request.
pub fn handle(config: &ServiceConfig, req: Request<Bytes>) -> Response<ResponseBody> {
    let Some(route) = Route::from_path(req.uri().path()) else {
        return text(StatusCode::NOT_FOUND, "Not found.");
    };
    if !route.allows(req.method()) {
        let mut resp = text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.");
        resp.headers_mut()
            .insert(ALLOW, HeaderValue::from_static(route.allow_header()));
        return resp;
    }

    let result = match route {
        Route::Ping => {
            info!("ping requested");
            Ok(text(StatusCode::OK, config.ping_message.clone()))
        }
        Route::Compress => compress(config, &req),
        Route::Decompress => decompress(config, &req),
    };
    result.unwrap_or_else(|err| error_response(&err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_matching() {
        assert_eq!(Route::from_path("/PING"), Some(Route::Ping));
        assert_eq!(Route::from_path("/api/ping"), Some(Route::Ping));
        assert_eq!(Route::from_path("/api/Compress/"), Some(Route::Compress));
        assert_eq!(Route::from_path("/DECOMPRESS"), Some(Route::Decompress));
        assert_eq!(Route::from_path("/apicompress"), None);
        assert_eq!(Route::from_path("/"), None);
    }

    #[test]
    fn test_query_param() {
        let q = Some("coder=2&BLOCKSIZE=10&flag");
        assert_eq!(query_param(q, "coder"), Some("2"));
        assert_eq!(query_param(q, "blockSize"), Some("10"));
        assert_eq!(query_param(q, "flag"), Some(""));
        assert_eq!(query_param(q, "missing"), None);
        assert_eq!(query_param(None, "coder"), None);
    }

    #[test]
    fn test_compress_params_fall_back() {
        let config = ServiceConfig::default();
        let p = CompressParams::from_query(Some("coder=3&blockSize=10"), &config);
        assert_eq!(p, CompressParams { coder: Coder::Fast, block_size_mb: 10 });

        for query in [None, Some("coder=0&blockSize=0"), Some("coder=x&blockSize=151"), Some("coder=-1&blockSize=-5")] {
            let p = CompressParams::from_query(query, &config);
            assert_eq!(p.coder, Coder::Static, "{:?}", query);
            assert_eq!(p.block_size_mb, 25, "{:?}", query);
        }

        let p = CompressParams::from_query(Some("blockSize=150"), &config);
        assert_eq!(p.block_size_mb, 150);
    }

    #[test]
    fn test_accepts_gzip() {
        let check = |value: &str| {
            let mut headers = HeaderMap::new();
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_str(value).unwrap());
            accepts_gzip(&headers)
        };
        assert!(check("gzip"));
        assert!(check("deflate, GZIP;q=0.5"));
        assert!(check("x-gzip"));
        assert!(check("br, gzip ; q=1"));
        assert!(!check("gzip;q=0"));
        assert!(!check("deflate, br"));
        assert!(!check("gzip;q=abc"));
        assert!(!accepts_gzip(&HeaderMap::new()));
    }

    #[test]
    fn test_accepts_gzip_wildcard() {
        let check = |value: &str| {
            let mut headers = HeaderMap::new();
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_str(value).unwrap());
            accepts_gzip(&headers)
        };
        assert!(check("*"));
        assert!(check("br, *;q=0.1"));
        assert!(!check("*;q=0"));
        assert!(!check("gzip;q=0, *"));
        assert!(!check("*, gzip;q=0"));
        assert!(check("gzip, *;q=0"));
    }

    #[test]
    fn test_gunzip_limit() {
        let packed = gzip(&vec![0u8; 10_000], 1).unwrap();
        assert_eq!(gunzip(&packed, 10_000).unwrap().len(), 10_000);
        assert!(matches!(gunzip(&packed, 9_999), Err(ServiceError::PayloadTooLarge(_))));
        assert!(matches!(gunzip(&[0x1f, 0x8b, 0, 1, 2], 100), Err(ServiceError::InvalidGzip)));
    }

    #[test]
    fn test_response_body_size_hint() {
        let sized = ResponseBody::sized(vec![1, 2, 3]);
        assert_eq!(sized.size_hint().exact(), Some(3));
        let chunked = ResponseBody::chunked(vec![1, 2, 3]);
        assert_eq!(chunked.size_hint().exact(), None);
        assert_eq!(chunked.as_bytes(), &[1, 2, 3]);
        assert!(!chunked.is_end_stream());
    }
}
