//! Request dispatch for the county statistics endpoint
//!
//! Query parameters:
//! - `action=warmcache` starts a background warm cycle; its outcome is not
//!   part of the response
//! - `q=<region>` resolves one region through the cache and returns the
//!   record as a flat JSON object
//!
//! A request without `q` gets an empty `204 No Content`.

use crate::error::{Result, StatsError};
use crate::metrics::StatsMetrics;
use crate::models::RegionKey;
use crate::resolver::CacheAsideResolver;
use crate::warmer::BulkWarmer;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Query parameter carrying the command
pub const ACTION_PARAM: &str = "action";

/// Command value that triggers a warm cycle
pub const WARM_ACTION: &str = "warmcache";

/// Query parameter carrying the region key
pub const REGION_PARAM: &str = "q";

/// Decoded inbound query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsQuery {
    /// Whether the warm command was given
    pub warm: bool,
    /// Region to resolve, if any; `Err` when the `q` value cannot be decoded
    pub region: Option<Result<RegionKey>>,
}

impl StatsQuery {
    /// Decode a raw URL query string
    ///
    /// Only `action` and `q` are decoded, each on its own, so a bad value in
    /// one never hides the other. Other parameters are skipped without
    /// looking at their encoding. Values are percent-decoded and otherwise
    /// passed through untouched. An empty `q` is treated as absent. The first
    /// occurrence of a parameter wins.
    pub fn parse(query: Option<&str>) -> Self {
        let mut parsed = StatsQuery::default();
        let mut seen_action = false;

        for pair in query
            .unwrap_or_default()
            .split('&')
            .filter(|p| !p.is_empty())
        {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let Ok(name) = decode_component(name) else {
                continue;
            };

            match name.as_str() {
                ACTION_PARAM if !seen_action => {
                    seen_action = true;
                    parsed.warm = matches!(decode_component(value), Ok(v) if v == WARM_ACTION);
                }
                REGION_PARAM if parsed.region.is_none() => match decode_component(value) {
                    Ok(value) if value.is_empty() => {}
                    Ok(value) => parsed.region = Some(Ok(RegionKey::new(value))),
                    Err(e) => parsed.region = Some(Err(e)),
                },
                _ => {}
            }
        }

        parsed
    }
}

fn decode_component(raw: &str) -> Result<String> {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| StatsError::InvalidRequest(format!("invalid query encoding: {}", e)))
}

/// Dispatches inbound requests to the resolver and the warmer
pub struct StatsService {
    resolver: Arc<CacheAsideResolver>,
    warmer: Arc<BulkWarmer>,
    metrics: Arc<StatsMetrics>,
    endpoint_path: String,
}

impl StatsService {
    pub fn new(
        resolver: Arc<CacheAsideResolver>,
        warmer: Arc<BulkWarmer>,
        metrics: Arc<StatsMetrics>,
        endpoint_path: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            warmer,
            metrics,
            endpoint_path: endpoint_path.into(),
        }
    }

    /// Handle one request
    ///
    /// The warm command is submitted to a background task and never awaited
    /// here, so the response does not wait on the warm cycle.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        if req.uri().path() != self.endpoint_path {
            return json_response(
                StatusCode::NOT_FOUND,
                json!({"error": "not found"}).to_string(),
            );
        }

        let query = StatsQuery::parse(req.uri().query());
        self.metrics.record_request(query.warm);

        if query.warm {
            info!("Cache warm requested");
            drop(self.warmer.spawn_warm_all());
        }

        let region = match query.region {
            Some(Ok(region)) => region,
            Some(Err(e)) => return self.error_response(&e),
            None => {
                debug!("No region requested, nothing to resolve");
                return empty_response(StatusCode::NO_CONTENT);
            }
        };

        match self.resolver.resolve(&region).await {
            Ok(record) => match serde_json::to_string(&record) {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(e) => self.error_response(&StatsError::from(e)),
            },
            Err(e) => {
                warn!("Failed to resolve {}: {}", region, e);
                self.error_response(&e)
            }
        }
    }

    fn error_response(&self, err: &StatsError) -> Response<Full<Bytes>> {
        self.metrics.record_failed_request();
        let status = StatusCode::from_u16(err.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        json_response(status, json!({"error": err.to_string()}).to_string())
    }

    /// Bind `addr` and serve until the process is terminated
    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    /// Serve connections accepted from `listener`, one task per connection
    pub async fn serve_listener(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!(
            "Statistics endpoint listening on http://{}{}",
            listener.local_addr()?,
            self.endpoint_path
        );

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let service = Arc::clone(&self);

            tokio::task::spawn(async move {
                let handler = service_fn(move |req| {
                    let service = Arc::clone(&service);
                    async move { Ok::<_, Infallible>(service.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, handler).await {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
