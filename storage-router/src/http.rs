//! HTTPFront (C7): the external contract `spec.md` §4.7 describes but treats
//! as out of scope beyond the interface it demands. Built from `hyper` +
//! `http` + `matchit` — the same crates `volo-http` itself is layered on —
//! rather than pulling in an unrelated web framework, per the Non-goal in
//! `spec.md` §1.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use matchit::Router as MatchRouter;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::RouterError;
use crate::metastore::{FragmentKey, FragmentLocation, MetaStore, RegistryVersion};
use crate::router::Router;

type Body = Full<Bytes>;

#[derive(Clone, Copy)]
enum Route {
    File,
    FileInfo,
    ListDirectory,
    ListDescendant,
    Move,
    Ping,
}

fn route_table() -> MatchRouter<Route> {
    let mut routes = MatchRouter::new();
    routes.insert("/api/v1/file", Route::File).unwrap();
    routes.insert("/api/v1/fileinfo", Route::FileInfo).unwrap();
    routes
        .insert("/api/v1/list_directory", Route::ListDirectory)
        .unwrap();
    routes
        .insert("/api/v1/list_descendant", Route::ListDescendant)
        .unwrap();
    routes.insert("/api/v1/move", Route::Move).unwrap();
    routes.insert("/api/v1/_ping", Route::Ping).unwrap();
    routes
}

/// Binds `addr` and serves requests against `router` until the process
/// exits. Every accepted connection is handled on its own task, matching the
/// one-task-per-request scheduling model in `spec.md` §5.
pub async fn serve<M: MetaStore + 'static>(
    addr: SocketAddr,
    router: Arc<Router<M>>,
) -> Result<(), RouterError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RouterError::BadRequest(format!("failed to bind {addr}: {e}")))?;
    info!(%addr, "router http front listening");

    let routes = Arc::new(route_table());

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let router = router.clone();
        let routes = routes.clone();

        tokio::spawn(async move {
            let service = hyper::service::service_fn(move |req| {
                let router = router.clone();
                let routes = routes.clone();
                async move { Ok::<_, Infallible>(dispatch(router, routes, req).await) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                warn!(%peer, error = %e, "connection error");
            }
        });
    }
}

async fn dispatch<M: MetaStore>(
    router: Arc<Router<M>>,
    routes: Arc<MatchRouter<Route>>,
    req: Request<Incoming>,
) -> Response<Body> {
    let Ok(matched) = routes.at(req.uri().path()) else {
        return plain_response(StatusCode::NOT_FOUND, "route not found");
    };

    let result = match (req.method().clone(), *matched.value) {
        (Method::POST, Route::File) => handle_upload(&router, req).await,
        (Method::GET, Route::File) => handle_download(&router, req).await,
        (Method::DELETE, Route::File) => handle_delete(&router, req).await,
        (Method::GET, Route::FileInfo) => handle_fileinfo(&router, req).await,
        (Method::GET, Route::ListDirectory) => handle_list_directory(&router, req).await,
        (Method::GET, Route::ListDescendant) => handle_list_descendant(&router, req).await,
        (Method::POST, Route::Move) => handle_move(&router, req).await,
        (Method::POST, Route::Ping) => return plain_response(StatusCode::OK, "{OK}"),
        _ => return plain_response(StatusCode::NOT_FOUND, "route not found"),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "request failed");
            plain_response(e.status_code(), &e.to_string())
        }
    }
}

fn header<'a>(req: &'a Request<Incoming>, name: &str) -> Option<&'a str> {
    req.headers().get(name)?.to_str().ok()
}

fn require_header<'a>(req: &'a Request<Incoming>, name: &'static str) -> Result<&'a str, RouterError> {
    header(req, name).ok_or_else(|| RouterError::BadRequest(format!("missing header {name}")))
}

fn parse_bytes_range(raw: &str) -> Result<(u64, u64), RouterError> {
    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| RouterError::BadRequest(format!("malformed Bytes-Range {raw:?}")))?;
    let start: u64 = start
        .parse()
        .map_err(|_| RouterError::BadRequest(format!("malformed Bytes-Range {raw:?}")))?;
    let end: u64 = end
        .parse()
        .map_err(|_| RouterError::BadRequest(format!("malformed Bytes-Range {raw:?}")))?;
    if start >= end {
        return Err(RouterError::BadRequest(format!(
            "Bytes-Range start must be < end, got {raw:?}"
        )));
    }
    Ok((start, end))
}

fn plain_response(status: StatusCode, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::copy_from_slice(body.as_bytes())))
        .expect("building a plain response never fails")
}

fn json_response(status: StatusCode, value: serde_json::Value) -> Response<Body> {
    let bytes = serde_json::to_vec(&value).expect("serializing a json::Value never fails");
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .expect("building a json response never fails")
}

async fn handle_upload<M: MetaStore>(
    router: &Router<M>,
    req: Request<Incoming>,
) -> Result<Response<Body>, RouterError> {
    let path = require_header(&req, "Path")?.to_string();
    let index: u64 = require_header(&req, "Fragment-Index")?
        .parse()
        .map_err(|_| RouterError::BadRequest("Fragment-Index must be a decimal integer".into()))?;
    let (start, end) = parse_bytes_range(require_header(&req, "Bytes-Range")?)?;
    let is_last = header(&req, "Is-Last")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let registry_version = RegistryVersion::parse(header(&req, "Registry-Version"));

    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| RouterError::BadRequest(format!("failed to read body: {e}")))?
        .to_bytes();

    if body.len() as u64 != end - start {
        return Err(RouterError::BadRequest(format!(
            "body length {} does not match Bytes-Range length {}",
            body.len(),
            end - start
        )));
    }

    let key = FragmentKey { path, index, start, end };
    router
        .upload(key, is_last, registry_version, body.to_vec())
        .await?;
    Ok(plain_response(StatusCode::OK, ""))
}

async fn handle_download<M: MetaStore>(
    router: &Router<M>,
    req: Request<Incoming>,
) -> Result<Response<Body>, RouterError> {
    let path = require_header(&req, "Path")?;
    let index: u64 = require_header(&req, "Fragment-Index")?
        .parse()
        .map_err(|_| RouterError::BadRequest("Fragment-Index must be a decimal integer".into()))?;
    // The actual read range comes from whatever MetaStore has on file for
    // this fragment; the header is only checked for consistency with what
    // the caller believes it is downloading.
    parse_bytes_range(require_header(&req, "Bytes-Range")?)?;

    let body = router.download(path, index).await?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "octet-stream")
        .body(Full::new(Bytes::from(body)))
        .expect("building a download response never fails"))
}

async fn handle_delete<M: MetaStore>(
    router: &Router<M>,
    req: Request<Incoming>,
) -> Result<Response<Body>, RouterError> {
    let path = require_header(&req, "Path")?.to_string();
    let registry_version = RegistryVersion::parse(header(&req, "Registry-Version"));
    router.delete(&path, registry_version).await?;
    Ok(plain_response(StatusCode::NO_CONTENT, ""))
}

async fn handle_fileinfo<M: MetaStore>(
    router: &Router<M>,
    req: Request<Incoming>,
) -> Result<Response<Body>, RouterError> {
    let path = require_header(&req, "Path")?.to_string();
    let fragments = router.fileinfo(&path).await?;
    Ok(envelope_response("fragment-info", fragments))
}

async fn handle_list_directory<M: MetaStore>(
    router: &Router<M>,
    req: Request<Incoming>,
) -> Result<Response<Body>, RouterError> {
    let path = require_header(&req, "Path")?.to_string();
    let entries = router.list_directory(&path).await?;
    Ok(envelope_response("file-list", entries))
}

async fn handle_list_descendant<M: MetaStore>(
    router: &Router<M>,
    req: Request<Incoming>,
) -> Result<Response<Body>, RouterError> {
    let path = require_header(&req, "Path")?.to_string();
    let entries = router.list_descendant(&path).await?;
    Ok(envelope_response("path-descendant", entries))
}

async fn handle_move<M: MetaStore>(
    router: &Router<M>,
    req: Request<Incoming>,
) -> Result<Response<Body>, RouterError> {
    let src = require_header(&req, "Source-Path")?.to_string();
    let dst = require_header(&req, "Dest-Path")?.to_string();
    router.move_path(&src, &dst).await?;
    Ok(plain_response(StatusCode::OK, ""))
}

fn envelope_response(key: &str, entries: Vec<FragmentLocation>) -> Response<Body> {
    json_response(StatusCode::OK, json!({ key: entries }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_range_rejects_inverted_range() {
        assert!(parse_bytes_range("10-5").is_err());
        assert!(parse_bytes_range("not-a-range").is_err());
        assert_eq!(parse_bytes_range("0-5").unwrap(), (0, 5));
    }
}
