//! Metrics HTTP Endpoint
//!
//! Serves the service counters and the warm-cycle registry in Prometheus text
//! format on a separate port.

use crate::metrics::{MetricsSnapshot, StatsMetrics};
use crate::warm_metrics::WarmMetrics;
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: Arc<StatsMetrics>,
    warm_metrics: Option<Arc<WarmMetrics>>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    ///
    /// # Example
    /// ```no_run
    /// use county_stats::metrics::StatsMetrics;
    /// use county_stats::metrics_endpoint::MetricsEndpoint;
    /// use std::sync::Arc;
    ///
    /// let metrics = Arc::new(StatsMetrics::new());
    /// let endpoint = MetricsEndpoint::new(metrics, "127.0.0.1:9090".parse().unwrap());
    /// ```
    pub fn new(metrics: Arc<StatsMetrics>, addr: SocketAddr) -> Self {
        Self {
            metrics,
            warm_metrics: None,
            addr,
        }
    }

    /// Also expose the warm-cycle registry
    pub fn with_warm_metrics(mut self, warm_metrics: Arc<WarmMetrics>) -> Self {
        self.warm_metrics = Some(warm_metrics);
        self
    }

    /// Start the metrics endpoint server
    ///
    /// Serves `/metrics` and `/health` until the process is terminated.
    pub async fn start(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics endpoint listening on http://{}", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&self.metrics);
            let warm_metrics = self.warm_metrics.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = Arc::clone(&metrics);
                    let warm_metrics = warm_metrics.clone();
                    async move { handle_request(req, metrics, warm_metrics).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

async fn handle_request<B>(
    req: Request<B>,
    metrics: Arc<StatsMetrics>,
    warm_metrics: Option<Arc<WarmMetrics>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/metrics" => {
            let mut body = format_prometheus_metrics(&metrics.get_stats());
            if let Some(warm_metrics) = warm_metrics {
                body.push_str(&warm_metrics.render());
            }
            text_response(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                body,
            )
        }
        "/health" => text_response(StatusCode::OK, "text/plain", "OK".to_string()),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(response)
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn push_metric(
    output: &mut String,
    name: &str,
    help: &str,
    kind: &str,
    value: impl std::fmt::Display,
) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} {}", name, kind);
    let _ = writeln!(output, "{} {}", name, value);
    output.push('\n');
}

/// Format metrics in Prometheus exposition format
pub fn format_prometheus_metrics(snapshot: &MetricsSnapshot) -> String {
    let mut output = String::new();

    push_metric(
        &mut output,
        "county_stats_requests_total",
        "Total number of requests processed",
        "counter",
        snapshot.total_requests,
    );
    push_metric(
        &mut output,
        "county_stats_warm_requests_total",
        "Number of requests that triggered a warm cycle",
        "counter",
        snapshot.warm_requests,
    );
    push_metric(
        &mut output,
        "county_stats_failed_requests_total",
        "Number of requests answered with an error",
        "counter",
        snapshot.failed_requests,
    );

    push_metric(
        &mut output,
        "county_stats_cache_hits_total",
        "Number of cache hits",
        "counter",
        snapshot.cache_hits,
    );
    push_metric(
        &mut output,
        "county_stats_cache_misses_total",
        "Number of cache misses",
        "counter",
        snapshot.cache_misses,
    );
    push_metric(
        &mut output,
        "county_stats_cache_errors_total",
        "Number of failed cache reads and writes",
        "counter",
        snapshot.cache_errors,
    );
    push_metric(
        &mut output,
        "county_stats_cache_fills_total",
        "Number of records back-filled after a miss",
        "counter",
        snapshot.cache_fills,
    );
    push_metric(
        &mut output,
        "county_stats_cache_hit_rate",
        "Cache hit rate as a percentage",
        "gauge",
        format!("{:.2}", snapshot.cache_hit_rate()),
    );

    push_metric(
        &mut output,
        "county_stats_fetches_total",
        "Number of region fetches",
        "counter",
        snapshot.total_fetches,
    );
    push_metric(
        &mut output,
        "county_stats_failed_fetches_total",
        "Number of region fetches where every section failed",
        "counter",
        snapshot.failed_fetches,
    );
    push_metric(
        &mut output,
        "county_stats_sub_fetch_failures_total",
        "Number of failed section fetches",
        "counter",
        snapshot.sub_fetch_failures,
    );
    push_metric(
        &mut output,
        "county_stats_degraded_records_total",
        "Number of fetched records missing a section",
        "counter",
        snapshot.degraded_records,
    );
    push_metric(
        &mut output,
        "county_stats_fetch_duration_ms_avg",
        "Average region fetch duration in milliseconds",
        "gauge",
        format!("{:.2}", snapshot.avg_fetch_duration_ms()),
    );

    push_metric(
        &mut output,
        "county_stats_warm_cycles_started_total",
        "Number of warm cycles started",
        "counter",
        snapshot.warm_cycles_started,
    );
    push_metric(
        &mut output,
        "county_stats_warm_cycles_completed_total",
        "Number of warm cycles that attempted every region",
        "counter",
        snapshot.warm_cycles_completed,
    );
    push_metric(
        &mut output,
        "county_stats_warm_cycles_failed_total",
        "Number of warm cycles aborted on catalog read",
        "counter",
        snapshot.warm_cycles_failed,
    );
    push_metric(
        &mut output,
        "county_stats_warm_keys_stored_total",
        "Number of regions stored while warming",
        "counter",
        snapshot.warm_keys_stored,
    );
    push_metric(
        &mut output,
        "county_stats_warm_keys_failed_total",
        "Number of regions that failed while warming",
        "counter",
        snapshot.warm_keys_failed,
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = StatsMetrics::new();
        metrics.record_request(false);
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        let output = format_prometheus_metrics(&metrics.get_stats());

        assert!(output.contains("# TYPE county_stats_requests_total counter"));
        assert!(output.contains("county_stats_requests_total 1\n"));
        assert!(output.contains("county_stats_cache_hits_total 1\n"));
        assert!(output.contains("county_stats_cache_hit_rate 50.00\n"));
    }

    #[tokio::test]
    async fn test_metrics_route_includes_warm_registry() {
        let metrics = Arc::new(StatsMetrics::new());
        let warm_metrics = Arc::new(WarmMetrics::new().unwrap());
        warm_metrics.record_key(true, false);

        let req = Request::builder().uri("/metrics").body(()).unwrap();
        let response = handle_request(req, metrics, Some(warm_metrics))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("county_stats_cache_hits_total"));
        assert!(text.contains("county_stats_warm_keys_total"));
    }

    #[tokio::test]
    async fn test_health_and_unknown_routes() {
        let metrics = Arc::new(StatsMetrics::new());

        let req = Request::builder().uri("/health").body(()).unwrap();
        let response = handle_request(req, metrics.clone(), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let req = Request::builder().uri("/nope").body(()).unwrap();
        let response = handle_request(req, metrics, None).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
