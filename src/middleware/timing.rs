use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};

/// Stamps every dashboard response with how long the handler took:
///
///   X-Response-Time-Us: wall time in microseconds
///   Server-Timing: same value as `total;dur=<ms>`
///
/// Snapshot requests are logged at debug level; the SSE route is not,
/// since its timing only covers the headers.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();

    stamp_timing(response.headers_mut(), elapsed);

    if !path.ends_with("/stream") {
        tracing::debug!(
            status = response.status().as_u16(),
            %method,
            %path,
            us = elapsed.as_micros() as u64,
            "dashboard request"
        );
    }

    response
}

fn stamp_timing(headers: &mut HeaderMap, elapsed: Duration) {
    headers.insert("X-Response-Time-Us", HeaderValue::from(elapsed.as_micros() as u64));

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = HeaderValue::from_str(&server_timing) {
        headers.insert("Server-Timing", val);
    }
}
