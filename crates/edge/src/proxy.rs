// crates/edge/src/proxy.rs
//! Forward a request to one backend and stream the response back.

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    response::Response,
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::backend::Backend;
use crate::error::RouteError;

pub type HttpClient = Client<HttpConnector, Body>;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Rewrite `req` for `backend` and forward it. The response body is passed
/// through unbuffered so event streams flow frame by frame.
pub async fn forward(
    client: &HttpClient,
    backend: &Backend,
    mut req: Request<Body>,
) -> Result<Response, RouteError> {
    let upstream = |message: String| RouteError::Upstream {
        backend: backend.to_string(),
        message,
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = backend.target(path_and_query);
    *req.uri_mut() = target
        .parse()
        .map_err(|e| upstream(format!("invalid target {target}: {e}")))?;

    if let Ok(host) = HeaderValue::from_str(&backend.authority) {
        req.headers_mut().insert(header::HOST, host);
    }

    let response = client
        .request(req)
        .await
        .map_err(|e| upstream(e.to_string()))?;
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}
