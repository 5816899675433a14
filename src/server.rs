//! HTTP/1.1 server on hyper
//!
//! Each connection runs on its own task. Request bodies are buffered up to
//! `max_body_bytes`, then [`service::handle`] runs on the blocking pool so
//! engine work never stalls the async workers.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use http::{Request, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::service::{self, error_response, ResponseBody};

async fn respond(config: Arc<ServiceConfig>, req: Request<Incoming>) -> Result<Response<ResponseBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let limit = config.max_body_bytes;

    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            return Ok(error_response(&ServiceError::PayloadTooLarge(limit)));
        }
        Err(err) => return Ok(error_response(&ServiceError::Internal(err.to_string()))),
    };

    let req = Request::from_parts(parts, body);
    let resp = tokio::task::spawn_blocking(move || service::handle(&config, req))
        .await
        .unwrap_or_else(|err| error_response(&ServiceError::Internal(err.to_string())));
    Ok(resp)
}

/// Serve connections from `listener` until `shutdown` resolves.
///
/// Connections already accepted keep running on their own tasks.
pub async fn serve<F>(listener: TcpListener, config: Arc<ServiceConfig>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                debug!(%peer, "connection accepted");

                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    let svc = service_fn(move |req| respond(Arc::clone(&config), req));
                    if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), svc).await {
                        debug!(%peer, error = %err, "connection ended with error");
                    }
                });
            }
        }
    }
}

/// Bind `config.bind_addr` and serve until ctrl-c.
pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "bsc-server listening");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    serve(listener, Arc::new(config), shutdown).await?;
    Ok(())
}
