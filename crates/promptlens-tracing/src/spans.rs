//! Span builder helpers for proxy instrumentation.

/// Create a tracing span for the top-level proxied request.
///
/// Usage: `let span = proxy_request_span!(trace_id, method, path);`
///
/// Fields recorded later, once the upstream exchange completes:
/// - `status`: HTTP status returned to the client
/// - `latency_ms`: request arrival to final upstream byte
#[macro_export]
macro_rules! proxy_request_span {
    ($trace_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "proxy_request",
            trace_id = %$trace_id,
            method = %$method,
            path = %$path,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for the upstream forward leg.
#[macro_export]
macro_rules! upstream_forward_span {
    ($trace_id:expr, $target:expr) => {
        tracing::info_span!(
            "upstream_forward",
            trace_id = %$trace_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
