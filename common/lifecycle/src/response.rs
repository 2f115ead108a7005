use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
const NO_STORE: &str = "no-store, no-cache, must-revalidate";

/// Plain text probe response. Probes must never be cached or content-sniffed.
pub(crate) fn probe_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN_UTF8)),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE)),
        ],
        body,
    )
        .into_response()
}
